//! The multidimensional metadata model.
//!
//! Cubes, dimensions, hierarchies, levels, and members mirror the RDF Data
//! Cube structure of the dataset. Collections are deferred: they populate
//! through the query generator on first access and live for the owning
//! connection. Member identity is unique-name equality; every unique name
//! is reversible to an RDF URI through the codec.

use std::collections::BTreeMap;
use std::sync::Arc;

use oxrdf::Term;

use crate::deferred::DeferredList;
use crate::error::{CubeflowError, Result};
use crate::transport::term_key;

/// Unique name of the synthetic Measures dimension and hierarchy.
pub const MEASURES_DIMENSION: &str = "[Measures]";
/// Unique name of the synthetic Measures level.
pub const MEASURES_LEVEL: &str = "[Measures].[Measures]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionType {
    Regular,
    Measures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberType {
    Regular,
    Measure,
    Formula,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    Calculated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub unique_name: String,
    pub parent_unique_name: Option<String>,
    pub member_type: MemberType,
    pub ordinal: u32,
    pub properties: BTreeMap<String, String>,
    pub hierarchy_unique_name: String,
    pub level_unique_name: String,
    /// The RDF term addressing this member in fact rows. Formula members
    /// have none; they exist only inside their defining statement.
    pub term: Option<Term>,
}

impl Member {
    /// The string fact rows are matched on.
    pub fn key(&self) -> Result<String> {
        self.term.as_ref().map(term_key).ok_or_else(|| {
            CubeflowError::Metadata(format!("member {} has no RDF term", self.unique_name))
        })
    }
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.unique_name == other.unique_name
    }
}

impl Eq for Member {}

/// A calculated measure's expression: a binary operator over exactly two
/// other measures.
#[derive(Debug, Clone)]
pub struct CalculatedFormula {
    pub op: ArithOp,
    pub left: Arc<Measure>,
    pub right: Arc<Measure>,
}

#[derive(Debug, Clone)]
pub struct Measure {
    pub member: Member,
    pub aggregator: Aggregator,
    pub datatype: Option<String>,
    /// Present only when `aggregator` is `Calculated`.
    pub formula: Option<CalculatedFormula>,
}

impl Measure {
    pub fn unique_name(&self) -> &str {
        &self.member.unique_name
    }
}

impl PartialEq for Measure {
    fn eq(&self, other: &Self) -> bool {
        self.member == other.member
    }
}

impl Eq for Measure {}

/// A member as it appears in an axis tuple: a regular member or a measure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CubeMember {
    Member(Member),
    Measure(Measure),
}

impl CubeMember {
    pub fn unique_name(&self) -> &str {
        match self {
            CubeMember::Member(m) => &m.unique_name,
            CubeMember::Measure(m) => m.unique_name(),
        }
    }

    pub fn member(&self) -> &Member {
        match self {
            CubeMember::Member(m) => m,
            CubeMember::Measure(m) => &m.member,
        }
    }

    pub fn as_measure(&self) -> Option<&Measure> {
        match self {
            CubeMember::Member(_) => None,
            CubeMember::Measure(m) => Some(m),
        }
    }

    pub fn hierarchy_unique_name(&self) -> &str {
        &self.member().hierarchy_unique_name
    }

    pub fn level_unique_name(&self) -> &str {
        &self.member().level_unique_name
    }
}

#[derive(Debug, Clone)]
pub struct Level {
    pub unique_name: String,
    /// 0 at the hierarchy root, increasing toward leaves.
    pub depth: u32,
    /// The code list's depth tag: hierarchy-narrowing hops between an
    /// observed raw dimension value and this level.
    pub leaf_distance: u32,
    pub cardinality: u32,
    pub dimension_unique_name: String,
    pub hierarchy_unique_name: String,
    pub members: Arc<DeferredList<CubeMember>>,
}

impl Level {
    pub fn members(&self) -> Result<Arc<Vec<CubeMember>>> {
        self.members.get()
    }
}

#[derive(Debug, Clone)]
pub struct Hierarchy {
    pub unique_name: String,
    pub dimension_unique_name: String,
    /// The SKOS concept scheme backing this hierarchy; `None` marks a
    /// degenerate hierarchy whose members come from observed fact values.
    pub scheme_iri: Option<String>,
    pub has_all: bool,
    pub default_member_unique_name: Option<String>,
    pub levels: Arc<DeferredList<Level>>,
}

impl Hierarchy {
    pub fn levels(&self) -> Result<Arc<Vec<Level>>> {
        self.levels.get()
    }

    pub fn level_by_unique_name(&self, unique_name: &str) -> Result<Level> {
        self.levels()?
            .iter()
            .find(|l| l.unique_name == unique_name)
            .cloned()
            .ok_or_else(|| CubeflowError::Metadata(format!("unknown level {unique_name}")))
    }
}

#[derive(Debug, Clone)]
pub struct Dimension {
    pub unique_name: String,
    pub dimension_type: DimensionType,
    pub ordinal: u32,
    pub hierarchies: Arc<DeferredList<Hierarchy>>,
}

impl Dimension {
    pub fn hierarchies(&self) -> Result<Arc<Vec<Hierarchy>>> {
        self.hierarchies.get()
    }
}

#[derive(Debug, Clone)]
pub struct Cube {
    pub unique_name: String,
    pub dataset_iri: String,
    pub caption: Option<String>,
    pub dimensions: Arc<DeferredList<Dimension>>,
    pub measures: Arc<DeferredList<Measure>>,
}

impl Cube {
    pub fn dimensions(&self) -> Result<Arc<Vec<Dimension>>> {
        self.dimensions.get()
    }

    pub fn measures(&self) -> Result<Arc<Vec<Measure>>> {
        self.measures.get()
    }

    pub fn first_measure(&self) -> Result<Option<Measure>> {
        Ok(self.measures()?.first().cloned())
    }

    /// Flattened view over all dimensions' hierarchies.
    pub fn hierarchies(&self) -> Result<Vec<Hierarchy>> {
        let mut out = Vec::new();
        for dim in self.dimensions()?.iter() {
            out.extend(dim.hierarchies()?.iter().cloned());
        }
        Ok(out)
    }

    pub fn dimension_by_unique_name(&self, unique_name: &str) -> Result<Dimension> {
        self.dimensions()?
            .iter()
            .find(|d| d.unique_name == unique_name)
            .cloned()
            .ok_or_else(|| CubeflowError::Metadata(format!("unknown dimension {unique_name}")))
    }

    /// Resolve a hierarchy by unique name, force-populating dimensions on
    /// the way: a name referring to metadata not yet loaded must populate
    /// it, never come back empty.
    pub fn hierarchy_by_unique_name(&self, unique_name: &str) -> Result<Hierarchy> {
        for dim in self.dimensions()?.iter() {
            for hier in dim.hierarchies()?.iter() {
                if hier.unique_name == unique_name {
                    return Ok(hier.clone());
                }
            }
        }
        Err(CubeflowError::Metadata(format!(
            "unknown hierarchy {unique_name}"
        )))
    }

    pub fn level_by_unique_name(&self, unique_name: &str) -> Result<Level> {
        for hier in self.hierarchies()? {
            for level in hier.levels()?.iter() {
                if level.unique_name == unique_name {
                    return Ok(level.clone());
                }
            }
        }
        Err(CubeflowError::Metadata(format!(
            "unknown level {unique_name}"
        )))
    }
}

/// One coordinate point on an axis: one member per hierarchy on that axis.
#[derive(Debug, Clone)]
pub struct Position {
    pub members: Vec<CubeMember>,
}

/// An evaluated axis: an ordered list of positions.
#[derive(Debug, Clone, Default)]
pub struct Axis {
    pub positions: Vec<Position>,
}

impl Axis {
    pub fn new(positions: Vec<Position>) -> Self {
        Self { positions }
    }
}
