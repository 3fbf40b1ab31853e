//! The MDX parse-tree boundary.
//!
//! An external parser produces these nodes; the evaluator consumes them.
//! Identifier segments arrive unbracketed.

#[derive(Debug, Clone)]
pub enum MdxExpr {
    /// A dotted identifier, one entry per bracketed segment.
    Ident(Vec<String>),
    /// A function or operator call, e.g. `CrossJoin`, `Members`, `+`.
    Call { name: String, args: Vec<MdxExpr> },
    /// A `{...}` set literal.
    Set(Vec<MdxExpr>),
    /// A `(...)` tuple.
    Tuple(Vec<MdxExpr>),
    Number(f64),
    String(String),
}

impl MdxExpr {
    pub fn call(name: impl Into<String>, args: Vec<MdxExpr>) -> Self {
        MdxExpr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn ident<S: Into<String>>(segments: Vec<S>) -> Self {
        MdxExpr::Ident(segments.into_iter().map(Into::into).collect())
    }
}

/// A `WITH MEMBER <name> AS <expr>` definition.
#[derive(Debug, Clone)]
pub struct WithMember {
    pub name: Vec<String>,
    pub expr: MdxExpr,
}

/// One display axis of a select statement.
#[derive(Debug, Clone)]
pub struct AxisSpec {
    pub expr: MdxExpr,
}

/// A parsed MDX select statement.
#[derive(Debug, Clone)]
pub struct SelectStatement {
    pub with_members: Vec<WithMember>,
    /// Display axes in axis order (COLUMNS, ROWS, ...).
    pub axes: Vec<AxisSpec>,
    /// The FROM cube, as identifier segments.
    pub cube: Vec<String>,
    /// The WHERE slicer, if any.
    pub filter: Option<MdxExpr>,
}
