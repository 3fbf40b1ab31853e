//! MDX parse-tree types and their evaluator.

mod ast;
mod eval;

pub use ast::{AxisSpec, MdxExpr, SelectStatement, WithMember};
pub use eval::{to_axis, Evaluator, Value};
