//! Integration tests for the logical plan operator family.
//!
//! Plans fold into a LogicalQuery by exhaustive matching; duplicates
//! collapse on unique name and the two operators with no fact-retrieval
//! counterpart fail fast by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use oxrdf::{Literal, NamedNode, Term};

use cubeflow::deferred::DeferredList;
use cubeflow::error::CubeflowError;
use cubeflow::model::{
    Aggregator, Cube, CubeMember, Hierarchy, Level, Measure, Member, MemberType,
};
use cubeflow::plan::{OlapPlan, SelectionPredicate};
use cubeflow::uri::UriCodec;

const DS: &str = "http://example.org/sales";
const YEAR_DIM: &str = "http://example.org/dims/year";
const VALUE_MEASURE: &str = "http://example.org/measure/value";

mod fixtures {
    use super::*;

    pub struct Fixture {
        pub cube: Cube,
        pub year_level: Level,
        pub year_hierarchy: Hierarchy,
        pub value: Measure,
    }

    pub fn sales() -> Fixture {
        let codec = UriCodec::default();
        let dim_name = format!("[{}]", codec.encode(YEAR_DIM));
        let hier_name = format!("{dim_name}.{dim_name}");
        let level_name = format!("{hier_name}.[0]");

        let members: Vec<CubeMember> = (2010..=2012)
            .map(|y| CubeMember::Member(year_member(&hier_name, &level_name, y)))
            .collect();
        let year_level = Level {
            unique_name: level_name,
            depth: 0,
            leaf_distance: 0,
            cardinality: members.len() as u32,
            dimension_unique_name: dim_name.clone(),
            hierarchy_unique_name: hier_name.clone(),
            members: Arc::new(DeferredList::preloaded("year members", members)),
        };
        let year_hierarchy = Hierarchy {
            unique_name: hier_name,
            dimension_unique_name: dim_name.clone(),
            scheme_iri: None,
            has_all: false,
            default_member_unique_name: None,
            levels: Arc::new(DeferredList::preloaded(
                "year levels",
                vec![year_level.clone()],
            )),
        };
        let value = Measure {
            member: Member {
                unique_name: format!("[Measures].[{}]", codec.encode(VALUE_MEASURE)),
                parent_unique_name: None,
                member_type: MemberType::Measure,
                ordinal: 0,
                properties: BTreeMap::new(),
                hierarchy_unique_name: "[Measures]".to_string(),
                level_unique_name: "[Measures].[Measures]".to_string(),
                term: Some(Term::NamedNode(NamedNode::new_unchecked(VALUE_MEASURE))),
            },
            aggregator: Aggregator::Sum,
            datatype: None,
            formula: None,
        };
        let cube = Cube {
            unique_name: format!("[{}]", codec.encode(DS)),
            dataset_iri: DS.to_string(),
            caption: None,
            dimensions: Arc::new(DeferredList::preloaded("dimensions", vec![])),
            measures: Arc::new(DeferredList::preloaded("measures", vec![value.clone()])),
        };
        Fixture {
            cube,
            year_level,
            year_hierarchy,
            value,
        }
    }

    pub fn year_member(hierarchy: &str, level: &str, year: i64) -> Member {
        Member {
            unique_name: format!("{hierarchy}.[{year}]"),
            parent_unique_name: None,
            member_type: MemberType::Regular,
            ordinal: 0,
            properties: BTreeMap::new(),
            hierarchy_unique_name: hierarchy.to_string(),
            level_unique_name: level.to_string(),
            term: Some(Term::Literal(Literal::new_simple_literal(year.to_string()))),
        }
    }
}

#[test]
fn rollup_and_projection_collapse_duplicates_on_unique_name() {
    let fixture = fixtures::sales();
    let plan = OlapPlan::Projection {
        measures: vec![fixture.value.clone(), fixture.value.clone()],
        input: Box::new(OlapPlan::Rollup {
            levels: vec![fixture.year_level.clone(), fixture.year_level.clone()],
            input: Box::new(OlapPlan::BaseCube {
                cube: fixture.cube,
            }),
        }),
    };

    let logical = plan.into_logical_query().unwrap();
    assert_eq!(logical.groupby.len(), 1);
    assert_eq!(logical.groupby[0].unique_name, fixture.year_level.unique_name);
    assert_eq!(logical.measures.len(), 1);
    assert_eq!(logical.predicates.len(), 0);
}

#[test]
fn stacked_dice_operators_merge_per_hierarchy_member_sets() {
    let fixture = fixtures::sales();
    let hier = fixture.year_hierarchy.clone();
    let level_name = fixture.year_level.unique_name.clone();
    let member = |y| fixtures::year_member(&hier.unique_name, &level_name, y);

    let plan = OlapPlan::Dice {
        predicates: vec![SelectionPredicate {
            hierarchy: hier.clone(),
            members: vec![member(2011), member(2012)],
        }],
        input: Box::new(OlapPlan::Dice {
            predicates: vec![SelectionPredicate {
                hierarchy: hier.clone(),
                members: vec![member(2010), member(2011)],
            }],
            input: Box::new(OlapPlan::BaseCube {
                cube: fixture.cube,
            }),
        }),
    };

    let logical = plan.into_logical_query().unwrap();
    assert_eq!(logical.predicates.len(), 1);
    let names: Vec<&str> = logical.predicates[0]
        .members
        .iter()
        .map(|m| m.unique_name.as_str())
        .collect();
    assert_eq!(names.len(), 3);
    assert!(names[0].ends_with("[2010]"));
    assert!(names[2].ends_with("[2012]"));
}

#[test]
fn slice_drops_grouping_and_predicates_of_named_dimensions() {
    let fixture = fixtures::sales();
    let hier = fixture.year_hierarchy.clone();
    let level_name = fixture.year_level.unique_name.clone();
    let plan = OlapPlan::Slice {
        dimension_unique_names: vec![fixture.year_level.dimension_unique_name.clone()],
        input: Box::new(OlapPlan::Rollup {
            levels: vec![fixture.year_level.clone()],
            input: Box::new(OlapPlan::Dice {
                predicates: vec![SelectionPredicate {
                    hierarchy: hier.clone(),
                    members: vec![fixtures::year_member(&hier.unique_name, &level_name, 2010)],
                }],
                input: Box::new(OlapPlan::BaseCube {
                    cube: fixture.cube,
                }),
            }),
        }),
    };

    let logical = plan.into_logical_query().unwrap();
    assert!(logical.groupby.is_empty());
    assert!(logical.predicates.is_empty());
}

#[test]
fn operators_without_a_fact_counterpart_fail_fast_by_name() {
    let fixture = fixtures::sales();
    let convert = OlapPlan::ConvertCube {
        target_cube_unique_name: "[other]".to_string(),
        input: Box::new(OlapPlan::BaseCube {
            cube: fixture.cube.clone(),
        }),
    };
    match convert.into_logical_query() {
        Err(CubeflowError::Unsupported(message)) => assert!(message.contains("convert-cube")),
        other => panic!("expected unsupported-operator error, got {other:?}"),
    }

    let drill = OlapPlan::DrillAcross {
        left: Box::new(OlapPlan::BaseCube {
            cube: fixture.cube.clone(),
        }),
        right: Box::new(OlapPlan::BaseCube {
            cube: fixture.cube,
        }),
    };
    match drill.into_logical_query() {
        Err(CubeflowError::Unsupported(message)) => assert!(message.contains("drill-across")),
        other => panic!("expected unsupported-operator error, got {other:?}"),
    }
}
