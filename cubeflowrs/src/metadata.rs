//! Metadata readers and their caches.
//!
//! The raw reader resolves member unique names by delegating to the query
//! generator; the caching reader answers measures from the cube's own
//! measure list (never a round trip), then a reclaimable unique-name
//! cache, and only then the raw reader. Cached entries are advisory:
//! evictable at any time and reconstructible by a fresh round trip.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::MemberCacheConfig;
use crate::deferred::DeferredList;
use crate::error::{CubeflowError, Result};
use crate::model::{
    Cube, CubeMember, Dimension, DimensionType, Hierarchy, Level, Measure, Member,
    MEASURES_DIMENSION, MEASURES_LEVEL,
};
use crate::sparql::{CubeRow, DimensionRow, HierarchyRow, QueryGenerator, Restrictions};
use crate::uri;

/// Member tree operations. Only `Self_` is implemented; the rest fail
/// fast by name instead of silently returning nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeOp {
    Self_,
    Children,
    Parent,
    Siblings,
    Descendants,
    Ancestors,
}

/// Cache entry with timestamp for TTL tracking.
#[derive(Debug, Clone)]
struct CacheEntry {
    member: Member,
    inserted_at: Instant,
}

/// Unique-name member cache with TTL and size limits.
#[derive(Debug)]
struct MemberCache {
    members: HashMap<(String, String), CacheEntry>,
    ttl: Duration,
    max_size: usize,
}

impl MemberCache {
    fn with_config(config: &MemberCacheConfig) -> Self {
        Self {
            members: HashMap::new(),
            ttl: Duration::from_secs(config.ttl_secs),
            max_size: config.max_size,
        }
    }

    fn insert(&mut self, cube: String, unique_name: String, member: Member) {
        if self.members.len() >= self.max_size {
            self.evict_oldest();
        }
        self.members.insert(
            (cube, unique_name),
            CacheEntry {
                member,
                inserted_at: Instant::now(),
            },
        );
    }

    fn get(&self, cube: &str, unique_name: &str) -> Option<Member> {
        let key = (cube.to_string(), unique_name.to_string());
        self.members.get(&key).and_then(|entry| {
            if entry.inserted_at.elapsed() < self.ttl {
                Some(entry.member.clone())
            } else {
                None
            }
        })
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest_key) = self
            .members
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(k, _)| k.clone())
        {
            tracing::debug!(
                cube = %oldest_key.0,
                member = %oldest_key.1,
                "evicting oldest member from cache"
            );
            self.members.remove(&oldest_key);
        }
    }

    fn clear(&mut self) {
        self.members.clear();
    }
}

/// Uncached lookups straight through the query generator.
pub struct RawMetadataReader {
    generator: Arc<QueryGenerator>,
}

impl RawMetadataReader {
    pub fn new(generator: Arc<QueryGenerator>) -> Self {
        Self { generator }
    }

    /// Resolve many unique names with as few round trips as possible: one
    /// query per distinct scheme-backed hierarchy, a cached member-list
    /// scan per degenerate hierarchy.
    pub fn members_by_unique_name(
        &self,
        cube: &Cube,
        unique_names: &[String],
    ) -> Result<Vec<CubeMember>> {
        // Group names by owning hierarchy, preserving input order for the
        // final result.
        let mut by_hierarchy: Vec<(Hierarchy, Vec<String>)> = Vec::new();
        for name in unique_names {
            let hierarchy = self.owning_hierarchy(cube, name)?;
            match by_hierarchy
                .iter_mut()
                .find(|(h, _)| h.unique_name == hierarchy.unique_name)
            {
                Some((_, names)) => names.push(name.clone()),
                None => by_hierarchy.push((hierarchy, vec![name.clone()])),
            }
        }

        let mut found: HashMap<String, CubeMember> = HashMap::new();
        for (hierarchy, names) in &by_hierarchy {
            if hierarchy.scheme_iri.is_some() {
                let iris: Vec<String> = names
                    .iter()
                    .map(|n| self.generator.codec().decode(uri::last_segment(n)))
                    .collect();
                for member in self.generator.members_in_scheme(hierarchy, &iris)? {
                    found.insert(member.unique_name.clone(), CubeMember::Member(member));
                }
            } else {
                // Degenerate hierarchies verify names against the observed
                // value list.
                for level in hierarchy.levels()?.iter() {
                    for member in level.members()?.iter() {
                        if names.iter().any(|n| n == member.unique_name()) {
                            found.insert(member.unique_name().to_string(), member.clone());
                        }
                    }
                }
            }
        }

        let mut out = Vec::with_capacity(unique_names.len());
        for name in unique_names {
            let member = found.get(name).cloned().ok_or_else(|| {
                CubeflowError::Metadata(format!("unresolvable unique name {name}"))
            })?;
            out.push(member);
        }
        Ok(out)
    }

    pub fn member_by_unique_name(&self, cube: &Cube, unique_name: &str) -> Result<CubeMember> {
        let mut members = self.members_by_unique_name(cube, &[unique_name.to_string()])?;
        members.pop().ok_or_else(|| {
            CubeflowError::Metadata(format!("unresolvable unique name {unique_name}"))
        })
    }

    pub fn level_members(&self, level: &Level) -> Result<Arc<Vec<CubeMember>>> {
        level.members()
    }

    /// Find the hierarchy a member unique name belongs to, force-populating
    /// dimensions and hierarchies along the way.
    fn owning_hierarchy(&self, cube: &Cube, unique_name: &str) -> Result<Hierarchy> {
        for dim in cube.dimensions()?.iter() {
            if dim.dimension_type == DimensionType::Measures {
                continue;
            }
            if !unique_name.starts_with(&format!("{}.", dim.unique_name)) {
                continue;
            }
            for hierarchy in dim.hierarchies()?.iter() {
                if unique_name.starts_with(&format!("{}.", hierarchy.unique_name)) {
                    return Ok(hierarchy.clone());
                }
            }
        }
        Err(CubeflowError::Metadata(format!(
            "unresolvable unique name {unique_name}"
        )))
    }
}

/// The caching reader used by evaluation. Resolution order: the cube's
/// measure list, the member cache, then the raw reader. Measures are never
/// cached here; the cube's measure list owns them.
pub struct CachingMetadataReader {
    raw: RawMetadataReader,
    cache: Mutex<MemberCache>,
}

impl CachingMetadataReader {
    pub fn new(generator: Arc<QueryGenerator>, config: &MemberCacheConfig) -> Self {
        Self {
            raw: RawMetadataReader::new(generator),
            cache: Mutex::new(MemberCache::with_config(config)),
        }
    }

    pub fn member_by_unique_name(&self, cube: &Cube, unique_name: &str) -> Result<CubeMember> {
        let mut members = self.members_by_unique_name(cube, &[unique_name.to_string()])?;
        members.pop().ok_or_else(|| {
            CubeflowError::Metadata(format!("unresolvable unique name {unique_name}"))
        })
    }

    pub fn members_by_unique_name(
        &self,
        cube: &Cube,
        unique_names: &[String],
    ) -> Result<Vec<CubeMember>> {
        let mut resolved: HashMap<String, CubeMember> = HashMap::new();
        let mut misses: Vec<String> = Vec::new();
        for name in unique_names {
            if let Some(measure) = measure_from_cube(cube, name)? {
                resolved.insert(name.clone(), CubeMember::Measure(measure));
                continue;
            }
            if let Some(member) = self.cache.lock().unwrap().get(&cube.unique_name, name) {
                resolved.insert(name.clone(), CubeMember::Member(member));
                continue;
            }
            misses.push(name.clone());
        }
        if !misses.is_empty() {
            let fetched = self.raw.members_by_unique_name(cube, &misses)?;
            let mut cache = self.cache.lock().unwrap();
            for member in fetched {
                if let CubeMember::Member(m) = &member {
                    cache.insert(cube.unique_name.clone(), m.unique_name.clone(), m.clone());
                }
                resolved.insert(member.unique_name().to_string(), member);
            }
        }
        unique_names
            .iter()
            .map(|name| {
                resolved.get(name).cloned().ok_or_else(|| {
                    CubeflowError::Metadata(format!("unresolvable unique name {name}"))
                })
            })
            .collect()
    }

    /// Tree navigation around a member. Only SELF is implemented.
    pub fn member_relatives(
        &self,
        tree_op: TreeOp,
        cube: &Cube,
        unique_name: &str,
    ) -> Result<Vec<CubeMember>> {
        match tree_op {
            TreeOp::Self_ => Ok(vec![self.member_by_unique_name(cube, unique_name)?]),
            other => Err(CubeflowError::Unsupported(format!(
                "member tree operation {other:?}"
            ))),
        }
    }

    pub fn level_members(&self, level: &Level) -> Result<Arc<Vec<CubeMember>>> {
        self.raw.level_members(level)
    }

    /// Drop all cached members; every entry is reconstructible.
    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }
}

/// Measures resolve from the cube's already-loaded measure list, matching
/// on unique name or caption; they must never trigger a second round trip.
fn measure_from_cube(cube: &Cube, unique_name: &str) -> Result<Option<Measure>> {
    if !unique_name.starts_with(MEASURES_DIMENSION) {
        return Ok(None);
    }
    let measures = cube.measures()?;
    if let Some(measure) = measures.iter().find(|m| m.unique_name() == unique_name) {
        return Ok(Some(measure.clone()));
    }
    let segment = uri::last_segment(unique_name);
    Ok(measures
        .iter()
        .find(|m| m.member.properties.get("CAPTION").map(String::as_str) == Some(segment))
        .cloned())
}

// ---------------------------------------------------------------------------
// Deferred model construction
// ---------------------------------------------------------------------------

/// Wire a cube's deferred collections to the query generator. Nothing is
/// fetched until first access.
pub(crate) fn build_cube(generator: &Arc<QueryGenerator>, row: CubeRow) -> Cube {
    let measures = {
        let generator = generator.clone();
        let cube_name = row.unique_name.clone();
        Arc::new(DeferredList::named(
            format!("measures of {}", row.unique_name),
            move || generator.measures(&Restrictions::for_cube(cube_name.clone())),
        ))
    };

    let dimensions = {
        let generator = generator.clone();
        let cube_name = row.unique_name.clone();
        let measures = measures.clone();
        Arc::new(DeferredList::named(
            format!("dimensions of {}", row.unique_name),
            move || {
                let rows = generator.dimensions(&Restrictions::for_cube(cube_name.clone()))?;
                Ok(rows
                    .into_iter()
                    .map(|r| build_dimension(&generator, r, &measures))
                    .collect())
            },
        ))
    };

    Cube {
        unique_name: row.unique_name,
        dataset_iri: row.dataset_iri,
        caption: row.caption,
        dimensions,
        measures,
    }
}

fn build_dimension(
    generator: &Arc<QueryGenerator>,
    row: DimensionRow,
    measures: &Arc<DeferredList<Measure>>,
) -> Dimension {
    let hierarchies = match row.dimension_type {
        DimensionType::Measures => {
            let measures = measures.clone();
            Arc::new(DeferredList::named(
                format!("hierarchies of {}", row.unique_name),
                move || Ok(vec![build_measures_hierarchy(&measures)]),
            ))
        }
        DimensionType::Regular => {
            let generator = generator.clone();
            let cube_name = row.cube_unique_name.clone();
            let dim_name = row.unique_name.clone();
            Arc::new(DeferredList::named(
                format!("hierarchies of {}", row.unique_name),
                move || {
                    let restrictions = Restrictions {
                        cube: Some(cube_name.clone()),
                        dimension: Some(dim_name.clone()),
                        ..Default::default()
                    };
                    let rows = generator.hierarchies(&restrictions)?;
                    Ok(rows
                        .into_iter()
                        .map(|r| build_hierarchy(&generator, r))
                        .collect())
                },
            ))
        }
    };
    Dimension {
        unique_name: row.unique_name,
        dimension_type: row.dimension_type,
        ordinal: row.ordinal,
        hierarchies,
    }
}

fn build_hierarchy(generator: &Arc<QueryGenerator>, row: HierarchyRow) -> Hierarchy {
    let levels = {
        let generator = generator.clone();
        let restrictions = Restrictions {
            cube: Some(row.cube_unique_name.clone()),
            dimension: Some(row.dimension_unique_name.clone()),
            hierarchy: Some(row.unique_name.clone()),
            ..Default::default()
        };
        Arc::new(DeferredList::named(
            format!("levels of {}", row.unique_name),
            move || {
                let rows = generator.levels(&restrictions)?;
                Ok(rows
                    .into_iter()
                    .map(|r| {
                        let members = {
                            let generator = generator.clone();
                            let level_row = r.clone();
                            Arc::new(DeferredList::named(
                                format!("members of {}", r.unique_name),
                                move || generator.level_members(&level_row),
                            ))
                        };
                        Level {
                            unique_name: r.unique_name,
                            depth: r.depth,
                            leaf_distance: r.leaf_distance,
                            cardinality: r.cardinality,
                            dimension_unique_name: r.dimension_unique_name,
                            hierarchy_unique_name: r.hierarchy_unique_name,
                            members,
                        }
                    })
                    .collect())
            },
        ))
    };
    Hierarchy {
        unique_name: row.unique_name,
        dimension_unique_name: row.dimension_unique_name,
        scheme_iri: row.scheme_iri,
        has_all: row.has_all,
        default_member_unique_name: row.default_member_unique_name,
        levels,
    }
}

/// The synthetic Measures hierarchy: one level whose members mirror the
/// cube's measure list.
fn build_measures_hierarchy(measures: &Arc<DeferredList<Measure>>) -> Hierarchy {
    let levels = {
        let measures = measures.clone();
        Arc::new(DeferredList::named("levels of [Measures]", move || {
            let cardinality = measures.get()?.len() as u32;
            let members = {
                let measures = measures.clone();
                Arc::new(DeferredList::named("members of [Measures]", move || {
                    Ok(measures
                        .get()?
                        .iter()
                        .cloned()
                        .map(CubeMember::Measure)
                        .collect())
                }))
            };
            Ok(vec![Level {
                unique_name: MEASURES_LEVEL.to_string(),
                depth: 0,
                leaf_distance: 0,
                cardinality,
                dimension_unique_name: MEASURES_DIMENSION.to_string(),
                hierarchy_unique_name: MEASURES_DIMENSION.to_string(),
                members,
            }])
        }))
    };
    Hierarchy {
        unique_name: MEASURES_DIMENSION.to_string(),
        dimension_unique_name: MEASURES_DIMENSION.to_string(),
        scheme_iri: None,
        has_all: false,
        default_member_unique_name: None,
        levels,
    }
}
