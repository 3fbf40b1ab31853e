//! The logical query-plan operator family.
//!
//! A small closed set of operators connects the cellset assembler to the
//! query generator. Plans fold into a [`LogicalQuery`] by exhaustive
//! pattern matching; operators with no fact-retrieval counterpart fail
//! fast by name.

use std::collections::HashSet;

use crate::error::{CubeflowError, Result};
use crate::model::{Cube, Hierarchy, Level, Measure, Member};

/// Per-hierarchy distinct-member selection.
#[derive(Debug, Clone)]
pub struct SelectionPredicate {
    pub hierarchy: Hierarchy,
    pub members: Vec<Member>,
}

/// The reduced, per-statement fact query: grouping levels (never the
/// Measures level), measures, and per-hierarchy selections.
#[derive(Debug, Clone)]
pub struct LogicalQuery {
    pub cube: Cube,
    pub groupby: Vec<Level>,
    pub measures: Vec<Measure>,
    pub predicates: Vec<SelectionPredicate>,
}

#[derive(Debug, Clone)]
pub enum OlapPlan {
    BaseCube {
        cube: Cube,
    },
    Projection {
        measures: Vec<Measure>,
        input: Box<OlapPlan>,
    },
    Dice {
        predicates: Vec<SelectionPredicate>,
        input: Box<OlapPlan>,
    },
    Slice {
        dimension_unique_names: Vec<String>,
        input: Box<OlapPlan>,
    },
    Rollup {
        levels: Vec<Level>,
        input: Box<OlapPlan>,
    },
    ConvertCube {
        target_cube_unique_name: String,
        input: Box<OlapPlan>,
    },
    DrillAcross {
        left: Box<OlapPlan>,
        right: Box<OlapPlan>,
    },
}

impl OlapPlan {
    /// Fold the plan into a logical query. Duplicate levels, measures, and
    /// members collapse on unique name, preserving first-seen order.
    pub fn into_logical_query(self) -> Result<LogicalQuery> {
        match self {
            OlapPlan::BaseCube { cube } => Ok(LogicalQuery {
                cube,
                groupby: Vec::new(),
                measures: Vec::new(),
                predicates: Vec::new(),
            }),
            OlapPlan::Projection { measures, input } => {
                let mut query = input.into_logical_query()?;
                let mut seen: HashSet<String> = query
                    .measures
                    .iter()
                    .map(|m| m.unique_name().to_string())
                    .collect();
                for measure in measures {
                    if seen.insert(measure.unique_name().to_string()) {
                        query.measures.push(measure);
                    }
                }
                Ok(query)
            }
            OlapPlan::Dice { predicates, input } => {
                let mut query = input.into_logical_query()?;
                for pred in predicates {
                    match query
                        .predicates
                        .iter_mut()
                        .find(|p| p.hierarchy.unique_name == pred.hierarchy.unique_name)
                    {
                        Some(existing) => {
                            for member in pred.members {
                                if !existing.members.contains(&member) {
                                    existing.members.push(member);
                                }
                            }
                        }
                        None => query.predicates.push(pred),
                    }
                }
                Ok(query)
            }
            OlapPlan::Slice {
                dimension_unique_names,
                input,
            } => {
                let mut query = input.into_logical_query()?;
                query
                    .groupby
                    .retain(|l| !dimension_unique_names.contains(&l.dimension_unique_name));
                query
                    .predicates
                    .retain(|p| !dimension_unique_names.contains(&p.hierarchy.dimension_unique_name));
                Ok(query)
            }
            OlapPlan::Rollup { levels, input } => {
                let mut query = input.into_logical_query()?;
                let mut seen: HashSet<String> = query
                    .groupby
                    .iter()
                    .map(|l| l.unique_name.clone())
                    .collect();
                for level in levels {
                    if seen.insert(level.unique_name.clone()) {
                        query.groupby.push(level);
                    }
                }
                Ok(query)
            }
            OlapPlan::ConvertCube { .. } => {
                Err(CubeflowError::Unsupported("plan operator convert-cube".into()))
            }
            OlapPlan::DrillAcross { .. } => {
                Err(CubeflowError::Unsupported("plan operator drill-across".into()))
            }
        }
    }
}
