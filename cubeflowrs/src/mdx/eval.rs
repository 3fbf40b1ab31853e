//! Typed recursive evaluation of MDX parse trees.
//!
//! Scoped to resolving one statement's axes; full MDX coverage is a
//! non-goal, and any operator outside the supported set fails fast naming
//! itself.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{CubeflowError, Result};
use crate::metadata::CachingMetadataReader;
use crate::model::{
    Aggregator, ArithOp, Axis, CalculatedFormula, Cube, CubeMember, Dimension, Hierarchy, Level,
    Measure, Member, MemberType, Position, MEASURES_DIMENSION, MEASURES_LEVEL,
};
use crate::uri;

use super::ast::{MdxExpr, SelectStatement, WithMember};

/// An evaluation result: a metadata object, a list, or a scalar.
#[derive(Debug, Clone)]
pub enum Value {
    Cube(Cube),
    Dimension(Dimension),
    Hierarchy(Hierarchy),
    Level(Level),
    Member(CubeMember),
    Tuple(Vec<CubeMember>),
    List(Vec<Value>),
    Number(f64),
    Text(String),
    Bool(bool),
}

pub struct Evaluator {
    cube: Cube,
    reader: Arc<CachingMetadataReader>,
    /// WITH-defined calculated measures, checked before any metadata walk.
    calculated: HashMap<String, Measure>,
    current_member: Option<CubeMember>,
}

impl Evaluator {
    pub fn new(cube: Cube, reader: Arc<CachingMetadataReader>) -> Self {
        Self {
            cube,
            reader,
            calculated: HashMap::new(),
            current_member: None,
        }
    }

    /// Evaluate a statement's display axes and slicer into position lists.
    pub fn evaluate_axes(&mut self, statement: &SelectStatement) -> Result<(Vec<Axis>, Axis)> {
        for with_member in &statement.with_members {
            self.register_calculated(with_member)?;
        }
        let mut axes = Vec::with_capacity(statement.axes.len());
        for axis in &statement.axes {
            let value = self.eval(&axis.expr)?;
            axes.push(to_axis(value)?);
        }
        let filter = match &statement.filter {
            Some(expr) => {
                let value = self.eval(expr)?;
                to_axis(value)?
            }
            None => Axis::default(),
        };
        Ok((axes, filter))
    }

    /// Define a calculated measure: a binary arithmetic call over exactly
    /// two existing measures. Visible only within this statement.
    pub fn register_calculated(&mut self, with_member: &WithMember) -> Result<()> {
        let unique_name = uri::join_segments(&with_member.name);
        if self.calculated.contains_key(&unique_name) {
            return Err(CubeflowError::Metadata(format!(
                "ambiguous calculated member name {unique_name}"
            )));
        }
        let (op, left, right) = match &with_member.expr {
            MdxExpr::Call { name, args } if args.len() == 2 => {
                let op = match name.as_str() {
                    "+" => ArithOp::Add,
                    "-" => ArithOp::Subtract,
                    "*" => ArithOp::Multiply,
                    "/" => ArithOp::Divide,
                    other => {
                        return Err(CubeflowError::Query(format!(
                            "calculated member {unique_name} must use a binary arithmetic operator, got {other}"
                        )))
                    }
                };
                (op, self.operand_measure(&args[0])?, self.operand_measure(&args[1])?)
            }
            _ => {
                return Err(CubeflowError::Query(format!(
                    "calculated member {unique_name} must be a binary arithmetic expression over two measures"
                )))
            }
        };

        let ordinal = self.cube.measures()?.len() + self.calculated.len();
        let measure = Measure {
            member: Member {
                unique_name: unique_name.clone(),
                parent_unique_name: None,
                member_type: MemberType::Formula,
                ordinal: ordinal as u32,
                properties: Default::default(),
                hierarchy_unique_name: MEASURES_DIMENSION.to_string(),
                level_unique_name: MEASURES_LEVEL.to_string(),
                term: None,
            },
            aggregator: Aggregator::Calculated,
            datatype: None,
            formula: Some(CalculatedFormula {
                op,
                left: Arc::new(left),
                right: Arc::new(right),
            }),
        };
        self.calculated.insert(unique_name, measure);
        Ok(())
    }

    fn operand_measure(&mut self, expr: &MdxExpr) -> Result<Measure> {
        match self.eval(expr)? {
            Value::Member(CubeMember::Measure(m)) => Ok(m),
            _ => Err(CubeflowError::Query(
                "calculated member operands must be measures".into(),
            )),
        }
    }

    pub fn eval(&mut self, expr: &MdxExpr) -> Result<Value> {
        match expr {
            MdxExpr::Number(n) => Ok(Value::Number(*n)),
            MdxExpr::String(s) => Ok(Value::Text(s.clone())),
            MdxExpr::Ident(segments) => self.resolve_ident(segments),
            MdxExpr::Set(items) => self.eval_set(items),
            MdxExpr::Tuple(items) => self.eval_tuple(items),
            MdxExpr::Call { name, args } => self.eval_call(name, args),
        }
    }

    /// Resolve an identifier: the per-query calculated-member table first,
    /// then cube, dimension, hierarchy, level, member by successive
    /// segments, stopping at the first match.
    fn resolve_ident(&mut self, segments: &[String]) -> Result<Value> {
        let unique_name = uri::join_segments(segments);
        if let Some(measure) = self.calculated.get(&unique_name) {
            return Ok(Value::Member(CubeMember::Measure(measure.clone())));
        }
        if unique_name == self.cube.unique_name {
            return Ok(Value::Cube(self.cube.clone()));
        }
        let cube = self.cube.clone();
        for dim in cube.dimensions()?.iter() {
            if unique_name == dim.unique_name {
                return Ok(Value::Dimension(dim.clone()));
            }
            if !unique_name.starts_with(&format!("{}.", dim.unique_name)) {
                continue;
            }
            for hierarchy in dim.hierarchies()?.iter() {
                if unique_name == hierarchy.unique_name {
                    return Ok(Value::Hierarchy(hierarchy.clone()));
                }
                if hierarchy.unique_name != dim.unique_name
                    && !unique_name.starts_with(&format!("{}.", hierarchy.unique_name))
                {
                    continue;
                }
                for level in hierarchy.levels()?.iter() {
                    if unique_name == level.unique_name {
                        return Ok(Value::Level(level.clone()));
                    }
                }
            }
        }
        let member = self.reader.member_by_unique_name(&self.cube, &unique_name)?;
        Ok(Value::Member(member))
    }

    /// `{}` flattens one nesting level only: a nested list is spliced in
    /// place, a bare element appended.
    fn eval_set(&mut self, items: &[MdxExpr]) -> Result<Value> {
        let mut out = Vec::new();
        for item in items {
            match self.eval(item)? {
                Value::List(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        Ok(Value::List(out))
    }

    fn eval_tuple(&mut self, items: &[MdxExpr]) -> Result<Value> {
        let mut members = Vec::with_capacity(items.len());
        for item in items {
            members.push(as_cube_member(self.eval(item)?)?);
        }
        Ok(Value::Tuple(members))
    }

    fn eval_call(&mut self, name: &str, args: &[MdxExpr]) -> Result<Value> {
        match name {
            "CrossJoin" => self.eval_crossjoin(args),
            "Members" => self.eval_members(args),
            "Filter" => self.eval_filter(args),
            "Hierarchize" => self.eval_hierarchize(args),
            "CurrentMember" => self.current_member.clone().map(Value::Member).ok_or_else(|| {
                CubeflowError::Query("CurrentMember outside a Filter predicate".into())
            }),
            "Name" => self.eval_name(args),
            "Cast" => self.eval_cast(args),
            "+" | "-" | "*" | "/" => self.eval_arithmetic(name, args),
            "<" | "<=" | ">" | ">=" => self.eval_comparison(name, args),
            "AND" => self.eval_and(args),
            other => Err(CubeflowError::Unsupported(format!("MDX operator {other}"))),
        }
    }

    /// Cartesian product with the first argument slower-varying: the
    /// second set cycles completely for each element of the first.
    fn eval_crossjoin(&mut self, args: &[MdxExpr]) -> Result<Value> {
        let (a, b) = two_args("CrossJoin", args)?;
        let a = self.eval_to_list(a)?;
        let b = self.eval_to_list(b)?;
        let mut out = Vec::with_capacity(a.len() * b.len());
        for left in &a {
            let left_members = tuple_members(left)?;
            for right in &b {
                let mut members = left_members.clone();
                members.extend(tuple_members(right)?);
                out.push(Value::Tuple(members));
            }
        }
        Ok(Value::List(out))
    }

    /// Members of a level, or of every level of a hierarchy or dimension
    /// in level-then-member order.
    fn eval_members(&mut self, args: &[MdxExpr]) -> Result<Value> {
        let arg = one_arg("Members", args)?;
        let levels: Vec<Level> = match self.eval(arg)? {
            Value::Level(level) => vec![level],
            Value::Hierarchy(hierarchy) => hierarchy.levels()?.to_vec(),
            Value::Dimension(dimension) => {
                let mut levels = Vec::new();
                for hierarchy in dimension.hierarchies()?.iter() {
                    levels.extend(hierarchy.levels()?.iter().cloned());
                }
                levels
            }
            _ => {
                return Err(CubeflowError::Query(
                    "Members expects a dimension, hierarchy, or level".into(),
                ))
            }
        };
        let mut out = Vec::new();
        for level in levels {
            out.extend(
                self.reader
                    .level_members(&level)?
                    .iter()
                    .cloned()
                    .map(Value::Member),
            );
        }
        Ok(Value::List(out))
    }

    /// Evaluate the predicate once per element with a single current-member
    /// binding; survivors keep their input order.
    fn eval_filter(&mut self, args: &[MdxExpr]) -> Result<Value> {
        let (set, predicate) = two_args("Filter", args)?;
        let items = self.eval_to_list(set)?;
        let mut out = Vec::new();
        for item in items {
            let member = match &item {
                Value::Member(m) => m.clone(),
                _ => {
                    return Err(CubeflowError::Unsupported(
                        "Filter over tuple sets".into(),
                    ))
                }
            };
            let previous = self.current_member.replace(member);
            let keep = self.eval(predicate);
            self.current_member = previous;
            match keep? {
                Value::Bool(true) => out.push(item),
                Value::Bool(false) => {}
                _ => {
                    return Err(CubeflowError::Query(
                        "Filter predicate must evaluate to a boolean".into(),
                    ))
                }
            }
        }
        Ok(Value::List(out))
    }

    /// No ordering comparator is defined for Hierarchize yet; the set
    /// passes through unchanged rather than guessing an order.
    fn eval_hierarchize(&mut self, args: &[MdxExpr]) -> Result<Value> {
        let arg = one_arg("Hierarchize", args)?;
        let items = self.eval_to_list(arg)?;
        tracing::warn!("Hierarchize ordering is not defined; returning the set unchanged");
        Ok(Value::List(items))
    }

    fn eval_name(&mut self, args: &[MdxExpr]) -> Result<Value> {
        let arg = one_arg("Name", args)?;
        match self.eval(arg)? {
            Value::Member(m) => Ok(Value::Text(
                uri::last_segment(m.unique_name()).to_string(),
            )),
            _ => Err(CubeflowError::Query("Name expects a member".into())),
        }
    }

    /// `Cast(expr AS NUMERIC)`; the target type arrives as the second
    /// argument from the parser.
    fn eval_cast(&mut self, args: &[MdxExpr]) -> Result<Value> {
        let (value_expr, target) = two_args("Cast", args)?;
        let target_name = match target {
            MdxExpr::Ident(segments) => segments.join("."),
            MdxExpr::String(s) => s.clone(),
            _ => String::new(),
        };
        if !target_name.eq_ignore_ascii_case("NUMERIC") {
            return Err(CubeflowError::Unsupported(format!(
                "Cast target {target_name}"
            )));
        }
        match self.eval(value_expr)? {
            Value::Number(n) => Ok(Value::Number(n)),
            Value::Text(s) => s
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|_| CubeflowError::Query(format!("cannot cast '{s}' to NUMERIC"))),
            _ => Err(CubeflowError::Query(
                "Cast expects a scalar expression".into(),
            )),
        }
    }

    fn eval_arithmetic(&mut self, op: &str, args: &[MdxExpr]) -> Result<Value> {
        let (a, b) = two_args(op, args)?;
        let a = self.eval_number(a)?;
        let b = self.eval_number(b)?;
        let result = match op {
            "+" => a + b,
            "-" => a - b,
            "*" => a * b,
            _ => a / b,
        };
        Ok(Value::Number(result))
    }

    fn eval_comparison(&mut self, op: &str, args: &[MdxExpr]) -> Result<Value> {
        let (a, b) = two_args(op, args)?;
        let a = self.eval_number(a)?;
        let b = self.eval_number(b)?;
        let result = match op {
            "<" => a < b,
            "<=" => a <= b,
            ">" => a > b,
            _ => a >= b,
        };
        Ok(Value::Bool(result))
    }

    fn eval_and(&mut self, args: &[MdxExpr]) -> Result<Value> {
        let (a, b) = two_args("AND", args)?;
        match (self.eval(a)?, self.eval(b)?) {
            (Value::Bool(x), Value::Bool(y)) => Ok(Value::Bool(x && y)),
            _ => Err(CubeflowError::Query("AND expects boolean operands".into())),
        }
    }

    fn eval_number(&mut self, expr: &MdxExpr) -> Result<f64> {
        match self.eval(expr)? {
            Value::Number(n) => Ok(n),
            Value::Text(s) => s
                .parse()
                .map_err(|_| CubeflowError::Query(format!("'{s}' is not numeric"))),
            _ => Err(CubeflowError::Query("expected a numeric operand".into())),
        }
    }

    fn eval_to_list(&mut self, expr: &MdxExpr) -> Result<Vec<Value>> {
        match self.eval(expr)? {
            Value::List(items) => Ok(items),
            other => Ok(vec![other]),
        }
    }
}

fn one_arg<'a>(name: &str, args: &'a [MdxExpr]) -> Result<&'a MdxExpr> {
    match args {
        [arg] => Ok(arg),
        _ => Err(CubeflowError::Query(format!(
            "{name} expects exactly one argument"
        ))),
    }
}

fn two_args<'a>(name: &str, args: &'a [MdxExpr]) -> Result<(&'a MdxExpr, &'a MdxExpr)> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(CubeflowError::Query(format!(
            "{name} expects exactly two arguments"
        ))),
    }
}

fn as_cube_member(value: Value) -> Result<CubeMember> {
    match value {
        Value::Member(m) => Ok(m),
        _ => Err(CubeflowError::Query(
            "expected a member-valued expression".into(),
        )),
    }
}

fn tuple_members(value: &Value) -> Result<Vec<CubeMember>> {
    match value {
        Value::Member(m) => Ok(vec![m.clone()]),
        Value::Tuple(members) => Ok(members.clone()),
        _ => Err(CubeflowError::Query(
            "expected a member or tuple element".into(),
        )),
    }
}

/// Shape an evaluated axis expression into positions.
pub fn to_axis(value: Value) -> Result<Axis> {
    let items = match value {
        Value::List(items) => items,
        other => vec![other],
    };
    let mut positions = Vec::with_capacity(items.len());
    for item in items {
        let members = tuple_members(&item)?;
        positions.push(Position { members });
    }
    Ok(Axis::new(positions))
}
