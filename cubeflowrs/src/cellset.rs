//! Reducing evaluated axes into a fact query and addressing the results.
//!
//! The assembler extracts grouping levels, measures, and per-hierarchy
//! selections from the axes, folds them through the plan operators, runs
//! one fact query, and indexes the returned rows by the concatenation of
//! their group-level values. Cell lookups recompute the same key.

use std::collections::{HashMap, HashSet};

use crate::error::{CubeflowError, Result};
use crate::model::{Axis, Cube, CubeMember, Level, Measure, MEASURES_DIMENSION};
use crate::plan::{OlapPlan, SelectionPredicate};
use crate::sparql::QueryGenerator;
use crate::transport::term_key;

const KEY_SEPARATOR: char = '\u{1}';

/// One addressable cell. A miss yields an empty value, not an error.
#[derive(Debug, Clone)]
pub struct Cell {
    pub value: Option<String>,
    pub formatted_value: String,
    pub coordinates: Vec<usize>,
}

pub struct CellSet {
    axes: Vec<Axis>,
    filter_axis: Axis,
    groupby: Vec<Level>,
    measures: Vec<Measure>,
    values: HashMap<String, Vec<Option<String>>>,
}

impl CellSet {
    /// Reduce evaluated axes to a logical query, fetch facts, and index
    /// them. With nothing to group or no measures the cellset keeps its
    /// metadata but holds zero data rows.
    pub fn execute(
        cube: &Cube,
        generator: &QueryGenerator,
        axes: Vec<Axis>,
        filter_axis: Axis,
    ) -> Result<CellSet> {
        let groupby = collect_groupby(cube, &axes)?;
        let measures = collect_measures(cube, &axes, &filter_axis)?;
        let predicates = collect_predicates(cube, &axes, &filter_axis)?;

        let mut values = HashMap::new();
        if !groupby.is_empty() && !measures.is_empty() {
            let plan = OlapPlan::Projection {
                measures: measures.clone(),
                input: Box::new(OlapPlan::Rollup {
                    levels: groupby.clone(),
                    input: Box::new(OlapPlan::Dice {
                        predicates,
                        input: Box::new(OlapPlan::BaseCube { cube: cube.clone() }),
                    }),
                }),
            };
            let logical = plan.into_logical_query()?;
            let rows = generator.fact_rows(&logical)?;
            let group_count = groupby.len();
            // First row is the variable-name header.
            for row in rows.iter().skip(1) {
                let key = row
                    .iter()
                    .take(group_count)
                    .map(|cell| cell.as_ref().map(term_key).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(&KEY_SEPARATOR.to_string());
                let row_values: Vec<Option<String>> = (0..measures.len())
                    .map(|j| {
                        row.get(group_count + j)
                            .and_then(|cell| cell.as_ref())
                            .map(term_key)
                    })
                    .collect();
                values.insert(key, row_values);
            }
        }

        Ok(CellSet {
            axes,
            filter_axis,
            groupby,
            measures,
            values,
        })
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn filter_axis(&self) -> &Axis {
        &self.filter_axis
    }

    /// Look up the cell at the given axis coordinates. Exactly one measure
    /// may appear across the coordinate's positions; none selects the
    /// query's first measure.
    pub fn cell(&self, coordinates: &[usize]) -> Result<Cell> {
        if coordinates.len() != self.axes.len() {
            return Err(CubeflowError::Bounds(format!(
                "expected {} coordinates, got {}",
                self.axes.len(),
                coordinates.len()
            )));
        }
        let mut members: Vec<&CubeMember> = Vec::new();
        let mut measure: Option<&Measure> = None;
        for (axis, &coord) in self.axes.iter().zip(coordinates) {
            let position = axis.positions.get(coord).ok_or_else(|| {
                CubeflowError::Bounds(format!(
                    "coordinate {coord} outside 0..{}",
                    axis.positions.len()
                ))
            })?;
            for member in &position.members {
                match member.as_measure() {
                    Some(m) => {
                        if measure.is_some() {
                            return Err(CubeflowError::Query(
                                "two measures bound in one cell".into(),
                            ));
                        }
                        measure = Some(m);
                    }
                    None => members.push(member),
                }
            }
        }
        let measure = match measure.or(self.measures.first()) {
            Some(m) => m,
            None => return Ok(self.empty_cell(coordinates)),
        };
        let measure_idx = self
            .measures
            .iter()
            .position(|m| m.unique_name() == measure.unique_name())
            .ok_or_else(|| {
                CubeflowError::Query(format!(
                    "measure {} is not part of this query",
                    measure.unique_name()
                ))
            })?;

        let mut key_parts = Vec::with_capacity(self.groupby.len());
        for level in &self.groupby {
            let member = members
                .iter()
                .find(|m| m.level_unique_name() == level.unique_name);
            match member {
                Some(m) => key_parts.push(m.member().key()?),
                None => return Ok(self.empty_cell(coordinates)),
            }
        }
        let key = key_parts.join(&KEY_SEPARATOR.to_string());
        let value = self
            .values
            .get(&key)
            .and_then(|row| row.get(measure_idx).cloned())
            .flatten();
        Ok(Cell {
            formatted_value: value.clone().unwrap_or_default(),
            value,
            coordinates: coordinates.to_vec(),
        })
    }

    pub fn cell_at(&self, ordinal: u64) -> Result<Cell> {
        let coordinates = self.ordinal_to_coordinates(ordinal)?;
        self.cell(&coordinates)
    }

    fn empty_cell(&self, coordinates: &[usize]) -> Cell {
        Cell {
            value: None,
            formatted_value: String::new(),
            coordinates: coordinates.to_vec(),
        }
    }

    fn cell_count(&self) -> u64 {
        self.axes
            .iter()
            .map(|a| a.positions.len() as u64)
            .product()
    }

    /// Mixed-radix conversion; axis 0 is the fastest-varying digit.
    pub fn ordinal_to_coordinates(&self, ordinal: u64) -> Result<Vec<usize>> {
        let count = self.cell_count();
        if ordinal >= count {
            return Err(CubeflowError::Bounds(format!(
                "ordinal {ordinal} outside 0..{count}"
            )));
        }
        let mut rest = ordinal;
        let mut coordinates = Vec::with_capacity(self.axes.len());
        for axis in &self.axes {
            let radix = axis.positions.len() as u64;
            coordinates.push((rest % radix) as usize);
            rest /= radix;
        }
        Ok(coordinates)
    }

    pub fn coordinates_to_ordinal(&self, coordinates: &[usize]) -> Result<u64> {
        if coordinates.len() != self.axes.len() {
            return Err(CubeflowError::Bounds(format!(
                "expected {} coordinates, got {}",
                self.axes.len(),
                coordinates.len()
            )));
        }
        let mut ordinal: u64 = 0;
        for (axis, &coord) in self.axes.iter().zip(coordinates).rev() {
            let radix = axis.positions.len();
            if coord >= radix {
                return Err(CubeflowError::Bounds(format!(
                    "coordinate {coord} outside 0..{radix}"
                )));
            }
            ordinal = ordinal * radix as u64 + coord as u64;
        }
        Ok(ordinal)
    }
}

/// Every distinct non-Measures level referenced by the display axes, in
/// axis order.
fn collect_groupby(cube: &Cube, axes: &[Axis]) -> Result<Vec<Level>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut levels = Vec::new();
    for axis in axes {
        for position in &axis.positions {
            for member in &position.members {
                if member.as_measure().is_some() {
                    continue;
                }
                let level_name = member.level_unique_name().to_string();
                if seen.insert(level_name.clone()) {
                    levels.push(cube.level_by_unique_name(&level_name)?);
                }
            }
        }
    }
    Ok(levels)
}

/// Every distinct measure referenced: display axes first, then the filter
/// axis, then the cube's first measure as fallback.
fn collect_measures(cube: &Cube, axes: &[Axis], filter_axis: &Axis) -> Result<Vec<Measure>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut measures = Vec::new();
    for axis in axes.iter().chain(std::iter::once(filter_axis)) {
        for position in &axis.positions {
            for member in &position.members {
                if let Some(measure) = member.as_measure() {
                    if seen.insert(measure.unique_name().to_string()) {
                        measures.push(measure.clone());
                    }
                }
            }
        }
    }
    if measures.is_empty() {
        if let Some(first) = cube.first_measure()? {
            measures.push(first);
        }
    }
    Ok(measures)
}

/// Per distinct hierarchy on any axis, the distinct members occurring in
/// that hierarchy's slot across the axis's positions. The Measures
/// hierarchy is projected, never filtered.
fn collect_predicates(
    cube: &Cube,
    axes: &[Axis],
    filter_axis: &Axis,
) -> Result<Vec<SelectionPredicate>> {
    let mut predicates: Vec<SelectionPredicate> = Vec::new();
    for axis in axes.iter().chain(std::iter::once(filter_axis)) {
        for position in &axis.positions {
            for member in &position.members {
                if member.hierarchy_unique_name() == MEASURES_DIMENSION {
                    continue;
                }
                let plain = member.member().clone();
                match predicates
                    .iter_mut()
                    .find(|p| p.hierarchy.unique_name == plain.hierarchy_unique_name)
                {
                    Some(predicate) => {
                        if !predicate.members.contains(&plain) {
                            predicate.members.push(plain);
                        }
                    }
                    None => {
                        let hierarchy =
                            cube.hierarchy_by_unique_name(&plain.hierarchy_unique_name)?;
                        predicates.push(SelectionPredicate {
                            hierarchy,
                            members: vec![plain],
                        });
                    }
                }
            }
        }
    }
    Ok(predicates)
}
