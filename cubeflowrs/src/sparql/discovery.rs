//! Schema discovery over the RDF Data Cube graph.
//!
//! Each method returns rows shaped to its metadata kind's fixed column
//! schema. Dimensions with a depth-tagged code list become leveled
//! hierarchies; dimensions without one become single-level degenerate
//! hierarchies whose members are observed fact values. The Measures
//! dimension/hierarchy/level is synthesized for every cube from its
//! `qb:measure` components. SPARQL carries only exact/structural filters;
//! wildcard restrictions are applied client-side after retrieval.

use std::collections::BTreeMap;
use std::collections::HashSet;

use oxrdf::Term;

use crate::error::{CubeflowError, Result};
use crate::model::{
    Aggregator, CubeMember, DimensionType, Hierarchy, Member, MemberType, Measure,
    MEASURES_DIMENSION, MEASURES_LEVEL,
};
use crate::uri;
use crate::vocab;

use super::ast::{iri, triple, var, SelectItem, SelectQuery, SparqlExpr, SparqlRenderer, SparqlTerm, ValuesClause};
use super::{cell_key, cell_term, cell_u32, QueryGenerator};

/// Exact-match or wildcard filters on catalog object names. All values are
/// unique names; a value containing `*` is a pattern and never reaches the
/// SPARQL text.
#[derive(Debug, Clone, Default)]
pub struct Restrictions {
    pub cube: Option<String>,
    pub dimension: Option<String>,
    pub hierarchy: Option<String>,
    pub level: Option<String>,
    pub member: Option<String>,
}

impl Restrictions {
    pub fn for_cube(cube: impl Into<String>) -> Self {
        Self {
            cube: Some(cube.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct CubeRow {
    pub unique_name: String,
    pub dataset_iri: String,
    pub caption: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DimensionRow {
    pub cube_unique_name: String,
    pub unique_name: String,
    pub dimension_iri: Option<String>,
    pub dimension_type: DimensionType,
    pub ordinal: u32,
    pub caption: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HierarchyRow {
    pub cube_unique_name: String,
    pub dimension_unique_name: String,
    pub unique_name: String,
    pub scheme_iri: Option<String>,
    pub has_all: bool,
    pub default_member_unique_name: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LevelRow {
    pub cube_unique_name: String,
    pub dimension_unique_name: String,
    pub hierarchy_unique_name: String,
    pub unique_name: String,
    pub depth: u32,
    pub leaf_distance: u32,
    pub cardinality: u32,
}

/// `*` is the only wildcard: `%` appears in percent-escaped unique names
/// and must stay literal.
pub(crate) fn is_pattern(value: &str) -> bool {
    value.contains('*')
}

pub(crate) fn wildcard_match(text: &str, pattern: &str) -> bool {
    if !is_pattern(pattern) {
        return text == pattern;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let last = parts.len() - 1;
    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == last {
            if rest.len() < part.len() || !rest.ends_with(part) {
                return false;
            }
            rest = "";
        } else {
            match rest.find(part) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
    }
    true
}

fn matches(name: &str, restriction: &Option<String>) -> bool {
    match restriction {
        None => true,
        Some(r) => wildcard_match(name, r),
    }
}

fn parse_aggregator(term: &Option<Term>) -> Aggregator {
    let Some(key) = term.as_ref().map(crate::transport::term_key) else {
        return Aggregator::Sum;
    };
    let tag = key
        .rsplit(['#', '/'])
        .next()
        .unwrap_or(key.as_str())
        .to_ascii_lowercase();
    match tag.as_str() {
        "sum" => Aggregator::Sum,
        "avg" => Aggregator::Avg,
        "min" => Aggregator::Min,
        "max" => Aggregator::Max,
        "count" => Aggregator::Count,
        other => {
            tracing::debug!(aggregator = other, "unknown aggregator tag, defaulting to SUM");
            Aggregator::Sum
        }
    }
}

impl QueryGenerator {
    /// All datasets carrying a data structure definition.
    pub fn cubes(&self, restrictions: &Restrictions) -> Result<Vec<CubeRow>> {
        let mut query = SelectQuery {
            distinct: true,
            select: vec![
                SelectItem { expr: SparqlExpr::Var("ds".into()), alias: None },
                SelectItem { expr: SparqlExpr::Var("label".into()), alias: None },
                SelectItem { expr: SparqlExpr::Var("comment".into()), alias: None },
            ],
            ..Default::default()
        };
        query.patterns.push(triple(var("ds"), iri(vocab::qb::STRUCTURE), var("dsd")));
        query.patterns.push(triple(
            var("dsd"),
            iri(vocab::rdf::TYPE),
            iri(vocab::qb::DATA_STRUCTURE_DEFINITION),
        ));
        query.optionals.push(vec![triple(var("ds"), iri(vocab::rdfs::LABEL), var("label"))]);
        query.optionals.push(vec![triple(var("ds"), iri(vocab::rdfs::COMMENT), var("comment"))]);
        if let Some(cube) = restrictions.cube.as_deref().filter(|c| !is_pattern(c)) {
            let ds = self.codec().decode(uri::strip_brackets(cube));
            query.filters.push(SparqlExpr::BinaryOp {
                op: super::SparqlBinaryOperator::Eq,
                left: Box::new(SparqlExpr::Var("ds".into())),
                right: Box::new(SparqlExpr::Iri(ds)),
            });
        }
        query.order_by.push("ds".into());

        let rows = self.run_data(&SparqlRenderer.render_select(&query))?;
        let mut out = Vec::new();
        for row in &rows {
            let Some(ds) = cell_key(row, 0) else { continue };
            let unique_name = uri::bracket(&self.codec().encode(&ds));
            if !matches(&unique_name, &restrictions.cube) {
                continue;
            }
            out.push(CubeRow {
                unique_name,
                dataset_iri: ds,
                caption: cell_key(row, 1),
                description: cell_key(row, 2),
            });
        }
        Ok(out)
    }

    /// Regular dimensions of each matching cube, plus the synthesized
    /// Measures dimension.
    pub fn dimensions(&self, restrictions: &Restrictions) -> Result<Vec<DimensionRow>> {
        let mut out = Vec::new();
        for cube in self.cubes(restrictions)? {
            let mut query = SelectQuery {
                distinct: true,
                select: vec![
                    SelectItem { expr: SparqlExpr::Var("dim".into()), alias: None },
                    SelectItem { expr: SparqlExpr::Var("label".into()), alias: None },
                ],
                ..Default::default()
            };
            query.patterns.push(triple(iri(cube.dataset_iri.clone()), iri(vocab::qb::STRUCTURE), var("dsd")));
            query.patterns.push(triple(var("dsd"), iri(vocab::qb::COMPONENT), var("comp")));
            query.patterns.push(triple(var("comp"), iri(vocab::qb::DIMENSION), var("dim")));
            query.optionals.push(vec![triple(var("dim"), iri(vocab::rdfs::LABEL), var("label"))]);
            query.order_by.push("dim".into());

            let rows = self.run_data(&SparqlRenderer.render_select(&query))?;
            let mut ordinal = 0;
            for row in &rows {
                let Some(dim) = cell_key(row, 0) else { continue };
                let unique_name = uri::bracket(&self.codec().encode(&dim));
                if matches(&unique_name, &restrictions.dimension) {
                    out.push(DimensionRow {
                        cube_unique_name: cube.unique_name.clone(),
                        unique_name,
                        dimension_iri: Some(dim),
                        dimension_type: DimensionType::Regular,
                        ordinal,
                        caption: cell_key(row, 1),
                    });
                }
                ordinal += 1;
            }
            if matches(MEASURES_DIMENSION, &restrictions.dimension) {
                out.push(DimensionRow {
                    cube_unique_name: cube.unique_name.clone(),
                    unique_name: MEASURES_DIMENSION.to_string(),
                    dimension_iri: None,
                    dimension_type: DimensionType::Measures,
                    ordinal,
                    caption: None,
                });
            }
        }
        Ok(out)
    }

    /// Measures of each matching cube, from its `qb:measure` components.
    pub fn measures(&self, restrictions: &Restrictions) -> Result<Vec<Measure>> {
        let mut out = Vec::new();
        for cube in self.cubes(restrictions)? {
            let mut query = SelectQuery {
                distinct: true,
                select: vec![
                    SelectItem { expr: SparqlExpr::Var("m".into()), alias: None },
                    SelectItem { expr: SparqlExpr::Var("agg".into()), alias: None },
                    SelectItem { expr: SparqlExpr::Var("label".into()), alias: None },
                ],
                ..Default::default()
            };
            query.patterns.push(triple(iri(cube.dataset_iri.clone()), iri(vocab::qb::STRUCTURE), var("dsd")));
            query.patterns.push(triple(var("dsd"), iri(vocab::qb::COMPONENT), var("comp")));
            query.patterns.push(triple(var("comp"), iri(vocab::qb::MEASURE), var("m")));
            query.optionals.push(vec![triple(var("comp"), iri(vocab::qb::AGGREGATOR), var("agg"))]);
            query.optionals.push(vec![triple(var("m"), iri(vocab::rdfs::LABEL), var("label"))]);
            query.order_by.push("m".into());

            let rows = self.run_data(&SparqlRenderer.render_select(&query))?;
            for (ordinal, row) in rows.iter().enumerate() {
                let Some(m_iri) = cell_key(row, 0) else { continue };
                let unique_name = format!(
                    "{MEASURES_DIMENSION}.{}",
                    uri::bracket(&self.codec().encode(&m_iri))
                );
                if !matches(&unique_name, &restrictions.member) {
                    continue;
                }
                let mut properties = BTreeMap::new();
                if let Some(label) = cell_key(row, 2) {
                    properties.insert("CAPTION".to_string(), label);
                }
                out.push(Measure {
                    member: Member {
                        unique_name,
                        parent_unique_name: None,
                        member_type: MemberType::Measure,
                        ordinal: ordinal as u32,
                        properties,
                        hierarchy_unique_name: MEASURES_DIMENSION.to_string(),
                        level_unique_name: MEASURES_LEVEL.to_string(),
                        term: cell_term(row, 0),
                    },
                    aggregator: parse_aggregator(&cell_term(row, 1)),
                    datatype: None,
                    formula: None,
                });
            }
        }
        Ok(out)
    }

    /// Hierarchies of each matching dimension: one per code list, a
    /// degenerate hierarchy when the dimension has none, and the synthetic
    /// Measures hierarchy for the Measures dimension.
    pub fn hierarchies(&self, restrictions: &Restrictions) -> Result<Vec<HierarchyRow>> {
        let mut out = Vec::new();
        for dim in self.dimensions(restrictions)? {
            if dim.dimension_type == DimensionType::Measures {
                if matches(MEASURES_DIMENSION, &restrictions.hierarchy) {
                    out.push(HierarchyRow {
                        cube_unique_name: dim.cube_unique_name.clone(),
                        dimension_unique_name: dim.unique_name.clone(),
                        unique_name: MEASURES_DIMENSION.to_string(),
                        scheme_iri: None,
                        has_all: false,
                        default_member_unique_name: None,
                        caption: None,
                    });
                }
                continue;
            }
            let dim_iri = dim
                .dimension_iri
                .clone()
                .ok_or_else(|| CubeflowError::Metadata(format!("dimension {} has no IRI", dim.unique_name)))?;

            let mut query = SelectQuery {
                distinct: true,
                select: vec![
                    SelectItem { expr: SparqlExpr::Var("cl".into()), alias: None },
                    SelectItem { expr: SparqlExpr::Var("label".into()), alias: None },
                ],
                ..Default::default()
            };
            query.patterns.push(triple(iri(dim_iri.clone()), iri(vocab::qb::CODE_LIST), var("cl")));
            query.optionals.push(vec![triple(var("cl"), iri(vocab::rdfs::LABEL), var("label"))]);
            query.order_by.push("cl".into());

            let rows = self.run_data(&SparqlRenderer.render_select(&query))?;
            if rows.is_empty() {
                // No code list: the dimension is its own single-level
                // hierarchy over observed fact values.
                let unique_name = format!("{}.{}", dim.unique_name, dim.unique_name);
                if matches(&unique_name, &restrictions.hierarchy) {
                    out.push(HierarchyRow {
                        cube_unique_name: dim.cube_unique_name.clone(),
                        dimension_unique_name: dim.unique_name.clone(),
                        unique_name,
                        scheme_iri: None,
                        has_all: false,
                        default_member_unique_name: None,
                        caption: dim.caption.clone(),
                    });
                }
                continue;
            }
            for row in &rows {
                let Some(cl) = cell_key(row, 0) else { continue };
                let unique_name = format!(
                    "{}.{}",
                    dim.unique_name,
                    uri::bracket(&self.codec().encode(&cl))
                );
                if matches(&unique_name, &restrictions.hierarchy) {
                    out.push(HierarchyRow {
                        cube_unique_name: dim.cube_unique_name.clone(),
                        dimension_unique_name: dim.unique_name.clone(),
                        unique_name,
                        scheme_iri: Some(cl),
                        has_all: false,
                        default_member_unique_name: None,
                        caption: cell_key(row, 1),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Levels of each matching hierarchy. Depth tags count from the finest
    /// concept; root-based depth is derived from the largest tag.
    pub fn levels(&self, restrictions: &Restrictions) -> Result<Vec<LevelRow>> {
        let mut out = Vec::new();
        for hier in self.hierarchies(restrictions)? {
            if hier.unique_name == MEASURES_DIMENSION {
                let cardinality = self
                    .measures(&Restrictions::for_cube(hier.cube_unique_name.clone()))?
                    .len() as u32;
                if matches(MEASURES_LEVEL, &restrictions.level) {
                    out.push(LevelRow {
                        cube_unique_name: hier.cube_unique_name.clone(),
                        dimension_unique_name: hier.dimension_unique_name.clone(),
                        hierarchy_unique_name: hier.unique_name.clone(),
                        unique_name: MEASURES_LEVEL.to_string(),
                        depth: 0,
                        leaf_distance: 0,
                        cardinality,
                    });
                }
                continue;
            }
            let levels = match &hier.scheme_iri {
                Some(scheme) => self.scheme_levels(&hier, scheme)?,
                None => vec![self.degenerate_level(&hier)?],
            };
            out.extend(
                levels
                    .into_iter()
                    .filter(|l| matches(&l.unique_name, &restrictions.level)),
            );
        }
        Ok(out)
    }

    fn scheme_levels(&self, hier: &HierarchyRow, scheme: &str) -> Result<Vec<LevelRow>> {
        let mut query = SelectQuery {
            select: vec![
                SelectItem { expr: SparqlExpr::Var("d".into()), alias: None },
                SelectItem {
                    expr: SparqlExpr::Aggregate {
                        agg: Aggregator::Count,
                        distinct: false,
                        expr: Box::new(SparqlExpr::Var("c".into())),
                    },
                    alias: Some("n".into()),
                },
            ],
            ..Default::default()
        };
        query.patterns.push(triple(var("c"), iri(vocab::skos::IN_SCHEME), iri(scheme)));
        query.patterns.push(triple(var("c"), iri(vocab::olap::DEPTH), var("d")));
        query.group_by.push("d".into());
        query.order_by.push("d".into());

        let rows = self.run_data(&SparqlRenderer.render_select(&query))?;
        if rows.is_empty() {
            // Untagged scheme: all concepts form one level.
            return Ok(vec![LevelRow {
                cube_unique_name: hier.cube_unique_name.clone(),
                dimension_unique_name: hier.dimension_unique_name.clone(),
                hierarchy_unique_name: hier.unique_name.clone(),
                unique_name: format!("{}.[0]", hier.unique_name),
                depth: 0,
                leaf_distance: 0,
                cardinality: self.scheme_cardinality(scheme)?,
            }]);
        }
        let tagged: Vec<(u32, u32)> = rows
            .iter()
            .filter_map(|row| Some((cell_u32(row, 0)?, cell_u32(row, 1)?)))
            .collect();
        let max_tag = tagged.iter().map(|(tag, _)| *tag).max().unwrap_or(0);
        let mut levels: Vec<LevelRow> = tagged
            .into_iter()
            .map(|(tag, cardinality)| {
                let depth = max_tag - tag;
                LevelRow {
                    cube_unique_name: hier.cube_unique_name.clone(),
                    dimension_unique_name: hier.dimension_unique_name.clone(),
                    hierarchy_unique_name: hier.unique_name.clone(),
                    unique_name: format!("{}.[{depth}]", hier.unique_name),
                    depth,
                    leaf_distance: tag,
                    cardinality,
                }
            })
            .collect();
        levels.sort_by_key(|l| l.depth);
        Ok(levels)
    }

    fn scheme_cardinality(&self, scheme: &str) -> Result<u32> {
        let mut query = SelectQuery {
            select: vec![SelectItem {
                expr: SparqlExpr::Aggregate {
                    agg: Aggregator::Count,
                    distinct: false,
                    expr: Box::new(SparqlExpr::Var("c".into())),
                },
                alias: Some("n".into()),
            }],
            ..Default::default()
        };
        query.patterns.push(triple(var("c"), iri(vocab::skos::IN_SCHEME), iri(scheme)));
        let rows = self.run_data(&SparqlRenderer.render_select(&query))?;
        Ok(rows.first().and_then(|r| cell_u32(r, 0)).unwrap_or(0))
    }

    fn degenerate_level(&self, hier: &HierarchyRow) -> Result<LevelRow> {
        let ds = self.codec().decode(uri::strip_brackets(&hier.cube_unique_name));
        let dim_iri = self
            .codec()
            .decode(uri::strip_brackets(&hier.dimension_unique_name));
        let mut query = SelectQuery {
            select: vec![SelectItem {
                expr: SparqlExpr::Aggregate {
                    agg: Aggregator::Count,
                    distinct: true,
                    expr: Box::new(SparqlExpr::Var("v".into())),
                },
                alias: Some("n".into()),
            }],
            ..Default::default()
        };
        query.patterns.push(triple(var("obs"), iri(vocab::qb::DATA_SET), iri(ds)));
        query.patterns.push(triple(var("obs"), iri(dim_iri), var("v")));
        let rows = self.run_data(&SparqlRenderer.render_select(&query))?;
        Ok(LevelRow {
            cube_unique_name: hier.cube_unique_name.clone(),
            dimension_unique_name: hier.dimension_unique_name.clone(),
            hierarchy_unique_name: hier.unique_name.clone(),
            unique_name: format!("{}.[0]", hier.unique_name),
            depth: 0,
            leaf_distance: 0,
            cardinality: rows.first().and_then(|r| cell_u32(r, 0)).unwrap_or(0),
        })
    }

    /// Members of each matching level. Measures levels mirror the cube's
    /// measure list; degenerate levels read observed fact values in two
    /// disjoint sub-cases (SKOS-notated, then raw literals).
    pub fn members(&self, restrictions: &Restrictions) -> Result<Vec<Member>> {
        let mut out = Vec::new();
        for level in self.levels(restrictions)? {
            if level.unique_name == MEASURES_LEVEL {
                let measures =
                    self.measures(&Restrictions::for_cube(level.cube_unique_name.clone()))?;
                out.extend(
                    measures
                        .into_iter()
                        .map(|m| m.member)
                        .filter(|m| matches(&m.unique_name, &restrictions.member)),
                );
                continue;
            }
            let hier = self
                .hierarchies(&Restrictions {
                    cube: Some(level.cube_unique_name.clone()),
                    dimension: Some(level.dimension_unique_name.clone()),
                    hierarchy: Some(level.hierarchy_unique_name.clone()),
                    ..Default::default()
                })?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    CubeflowError::Metadata(format!(
                        "unknown hierarchy {}",
                        level.hierarchy_unique_name
                    ))
                })?;
            let members = match &hier.scheme_iri {
                Some(scheme) => self.scheme_level_members(&level, scheme)?,
                None => self.degenerate_members(&level)?,
            };
            out.extend(
                members
                    .into_iter()
                    .filter(|m| matches(&m.unique_name, &restrictions.member)),
            );
        }
        Ok(out)
    }

    fn scheme_level_members(&self, level: &LevelRow, scheme: &str) -> Result<Vec<Member>> {
        let mut query = SelectQuery {
            distinct: true,
            select: vec![
                SelectItem { expr: SparqlExpr::Var("c".into()), alias: None },
                SelectItem { expr: SparqlExpr::Var("label".into()), alias: None },
                SelectItem { expr: SparqlExpr::Var("notation".into()), alias: None },
                SelectItem { expr: SparqlExpr::Var("parent".into()), alias: None },
            ],
            ..Default::default()
        };
        query.patterns.push(triple(var("c"), iri(vocab::skos::IN_SCHEME), iri(scheme)));
        query.patterns.push(triple(var("c"), iri(vocab::olap::DEPTH), var("d")));
        query.filters.push(SparqlExpr::BinaryOp {
            op: super::SparqlBinaryOperator::Eq,
            left: Box::new(SparqlExpr::Var("d".into())),
            right: Box::new(SparqlExpr::Literal(serde_json::json!(level.leaf_distance))),
        });
        query.optionals.push(vec![triple(var("c"), iri(vocab::rdfs::LABEL), var("label"))]);
        query.optionals.push(vec![triple(var("c"), iri(vocab::skos::NOTATION), var("notation"))]);
        query.optionals.push(vec![triple(var("parent"), iri(vocab::skos::NARROWER), var("c"))]);
        query.order_by.push("c".into());

        let rows = self.run_data(&SparqlRenderer.render_select(&query))?;
        let mut out = Vec::new();
        for (ordinal, row) in rows.iter().enumerate() {
            let Some(concept) = cell_key(row, 0) else { continue };
            let mut properties = BTreeMap::new();
            if let Some(label) = cell_key(row, 1) {
                properties.insert("CAPTION".to_string(), label);
            }
            if let Some(notation) = cell_key(row, 2) {
                properties.insert("NOTATION".to_string(), notation);
            }
            let parent_unique_name = cell_key(row, 3).map(|p| {
                format!(
                    "{}.{}",
                    level.hierarchy_unique_name,
                    uri::bracket(&self.codec().encode(&p))
                )
            });
            out.push(Member {
                unique_name: format!(
                    "{}.{}",
                    level.hierarchy_unique_name,
                    uri::bracket(&self.codec().encode(&concept))
                ),
                parent_unique_name,
                member_type: MemberType::Regular,
                ordinal: ordinal as u32,
                properties,
                hierarchy_unique_name: level.hierarchy_unique_name.clone(),
                level_unique_name: level.unique_name.clone(),
                term: cell_term(row, 0),
            });
        }
        Ok(out)
    }

    fn degenerate_members(&self, level: &LevelRow) -> Result<Vec<Member>> {
        let ds = self.codec().decode(uri::strip_brackets(&level.cube_unique_name));
        let dim_iri = self
            .codec()
            .decode(uri::strip_brackets(&level.dimension_unique_name));

        // Sub-case 1: values carrying a SKOS notation.
        let mut notated = SelectQuery {
            distinct: true,
            select: vec![
                SelectItem { expr: SparqlExpr::Var("v".into()), alias: None },
                SelectItem { expr: SparqlExpr::Var("notation".into()), alias: None },
            ],
            ..Default::default()
        };
        notated.patterns.push(triple(var("obs"), iri(vocab::qb::DATA_SET), iri(ds.clone())));
        notated.patterns.push(triple(var("obs"), iri(dim_iri.clone()), var("v")));
        notated.patterns.push(triple(var("v"), iri(vocab::skos::NOTATION), var("notation")));
        notated.order_by.push("v".into());

        // Sub-case 2: raw literal values.
        let mut raw = SelectQuery {
            distinct: true,
            select: vec![SelectItem { expr: SparqlExpr::Var("v".into()), alias: None }],
            ..Default::default()
        };
        raw.patterns.push(triple(var("obs"), iri(vocab::qb::DATA_SET), iri(ds)));
        raw.patterns.push(triple(var("obs"), iri(dim_iri), var("v")));
        raw.filters.push(SparqlExpr::Function {
            name: "isLiteral".into(),
            args: vec![SparqlExpr::Var("v".into())],
        });
        raw.order_by.push("v".into());

        let mut out = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for (query, notation_col) in [(notated, true), (raw, false)] {
            let rows = self.run_data(&SparqlRenderer.render_select(&query))?;
            for row in &rows {
                let Some(term) = cell_term(row, 0) else { continue };
                let key = crate::transport::term_key(&term);
                if !seen.insert(key.clone()) {
                    continue;
                }
                let mut properties = BTreeMap::new();
                if notation_col {
                    if let Some(notation) = cell_key(row, 1) {
                        properties.insert("NOTATION".to_string(), notation);
                    }
                }
                let segment = match &term {
                    Term::NamedNode(_) => self.codec().encode(&key),
                    _ => uri::escape(&key),
                };
                let ordinal = out.len() as u32;
                out.push(Member {
                    unique_name: format!(
                        "{}.{}",
                        level.hierarchy_unique_name,
                        uri::bracket(&segment)
                    ),
                    parent_unique_name: None,
                    member_type: MemberType::Regular,
                    ordinal,
                    properties,
                    hierarchy_unique_name: level.hierarchy_unique_name.clone(),
                    level_unique_name: level.unique_name.clone(),
                    term: Some(term),
                });
            }
        }
        Ok(out)
    }

    /// Batched lookup of scheme concepts by IRI: one round trip for any
    /// number of names in the same hierarchy.
    pub(crate) fn members_in_scheme(
        &self,
        hierarchy: &Hierarchy,
        iris: &[String],
    ) -> Result<Vec<Member>> {
        let scheme = hierarchy.scheme_iri.clone().ok_or_else(|| {
            CubeflowError::Metadata(format!(
                "hierarchy {} has no concept scheme",
                hierarchy.unique_name
            ))
        })?;
        let levels = hierarchy.levels()?;
        let mut query = SelectQuery {
            distinct: true,
            select: vec![
                SelectItem { expr: SparqlExpr::Var("c".into()), alias: None },
                SelectItem { expr: SparqlExpr::Var("d".into()), alias: None },
                SelectItem { expr: SparqlExpr::Var("label".into()), alias: None },
                SelectItem { expr: SparqlExpr::Var("parent".into()), alias: None },
            ],
            ..Default::default()
        };
        query.patterns.push(triple(var("c"), iri(vocab::skos::IN_SCHEME), iri(scheme)));
        query.optionals.push(vec![triple(var("c"), iri(vocab::olap::DEPTH), var("d"))]);
        query.optionals.push(vec![triple(var("c"), iri(vocab::rdfs::LABEL), var("label"))]);
        query.optionals.push(vec![triple(var("parent"), iri(vocab::skos::NARROWER), var("c"))]);
        query.values = Some(ValuesClause {
            variable: "c".into(),
            terms: iris.iter().map(|i| SparqlTerm::Iri(i.clone())).collect(),
        });
        query.order_by.push("c".into());

        let rows = self.run_data(&SparqlRenderer.render_select(&query))?;
        let mut out = Vec::new();
        for row in &rows {
            let Some(concept) = cell_key(row, 0) else { continue };
            let leaf_distance = cell_u32(row, 1).unwrap_or(0);
            let level = levels
                .iter()
                .find(|l| l.leaf_distance == leaf_distance)
                .or_else(|| levels.first())
                .ok_or_else(|| {
                    CubeflowError::Metadata(format!(
                        "hierarchy {} has no levels",
                        hierarchy.unique_name
                    ))
                })?;
            let mut properties = BTreeMap::new();
            if let Some(label) = cell_key(row, 2) {
                properties.insert("CAPTION".to_string(), label);
            }
            let parent_unique_name = cell_key(row, 3).map(|p| {
                format!(
                    "{}.{}",
                    hierarchy.unique_name,
                    uri::bracket(&self.codec().encode(&p))
                )
            });
            out.push(Member {
                unique_name: format!(
                    "{}.{}",
                    hierarchy.unique_name,
                    uri::bracket(&self.codec().encode(&concept))
                ),
                parent_unique_name,
                member_type: MemberType::Regular,
                ordinal: 0,
                properties,
                hierarchy_unique_name: hierarchy.unique_name.clone(),
                level_unique_name: level.unique_name.clone(),
                term: cell_term(row, 0),
            });
        }
        Ok(out)
    }

    /// Members of one already-resolved level, for deferred population.
    pub(crate) fn level_members(&self, level_row: &LevelRow) -> Result<Vec<CubeMember>> {
        let restrictions = Restrictions {
            cube: Some(level_row.cube_unique_name.clone()),
            dimension: Some(level_row.dimension_unique_name.clone()),
            hierarchy: Some(level_row.hierarchy_unique_name.clone()),
            level: Some(level_row.unique_name.clone()),
            member: None,
        };
        Ok(self
            .members(&restrictions)?
            .into_iter()
            .map(CubeMember::Member)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matching() {
        assert!(wildcard_match("[Measures]", "[Measures]"));
        assert!(wildcard_match("[geo:area]", "[geo*"));
        assert!(wildcard_match("[geo:area]", "*area]"));
        assert!(wildcard_match("[geo:area]", "*:*"));
        assert!(!wildcard_match("[geo:area]", "[time*"));
        assert!(!wildcard_match("[geo:area]", "*population]"));
        // escaped names keep % literal
        assert!(wildcard_match("[ex:a%2Db]", "[ex:a%2Db]"));
        assert!(!wildcard_match("[ex:aXb]", "[ex:a%2Db]"));
    }
}
