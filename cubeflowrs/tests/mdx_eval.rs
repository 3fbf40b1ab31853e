//! Integration tests for the MDX tree evaluator.
//!
//! Fixtures preload all metadata, so any SPARQL round trip here is a bug.

use std::collections::BTreeMap;
use std::sync::Arc;

use oxrdf::{Literal, NamedNode, Term};

use cubeflow::config::MemberCacheConfig;
use cubeflow::deferred::DeferredList;
use cubeflow::error::{CubeflowError, Result};
use cubeflow::mdx::{Evaluator, MdxExpr, SelectStatement, Value, WithMember};
use cubeflow::metadata::{CachingMetadataReader, TreeOp};
use cubeflow::model::{
    Aggregator, Cube, CubeMember, Dimension, DimensionType, Hierarchy, Level, Measure, Member,
    MemberType,
};
use cubeflow::plan::LogicalQuery;
use cubeflow::sparql::QueryGenerator;
use cubeflow::transport::{SparqlRow, SparqlTransport};
use cubeflow::uri::UriCodec;

const DS: &str = "http://example.org/sales";
const YEAR_DIM: &str = "http://example.org/dims/year";
const VALUE_MEASURE: &str = "http://example.org/measure/value";
const COST_MEASURE: &str = "http://example.org/measure/cost";

struct NoTransport;

impl SparqlTransport for NoTransport {
    fn execute(&self, query: &str) -> Result<Vec<SparqlRow>> {
        panic!("unexpected round trip: {query}");
    }
}

mod fixtures {
    use super::*;

    pub fn measure(iri: &str, aggregator: Aggregator) -> Measure {
        let codec = UriCodec::default();
        Measure {
            member: Member {
                unique_name: format!("[Measures].[{}]", codec.encode(iri)),
                parent_unique_name: None,
                member_type: MemberType::Measure,
                ordinal: 0,
                properties: BTreeMap::new(),
                hierarchy_unique_name: "[Measures]".to_string(),
                level_unique_name: "[Measures].[Measures]".to_string(),
                term: Some(Term::NamedNode(NamedNode::new_unchecked(iri))),
            },
            aggregator,
            datatype: None,
            formula: None,
        }
    }

    pub fn year_member(hierarchy: &str, level: &str, year: i64) -> CubeMember {
        CubeMember::Member(Member {
            unique_name: format!("{hierarchy}.[{year}]"),
            parent_unique_name: None,
            member_type: MemberType::Regular,
            ordinal: 0,
            properties: BTreeMap::new(),
            hierarchy_unique_name: hierarchy.to_string(),
            level_unique_name: level.to_string(),
            term: Some(Term::Literal(Literal::new_simple_literal(year.to_string()))),
        })
    }

    pub struct Fixture {
        pub cube: Cube,
        pub reader: Arc<CachingMetadataReader>,
        pub generator: Arc<QueryGenerator>,
        pub dim_name: String,
        pub hier_name: String,
        pub level_name: String,
    }

    pub fn sales() -> Fixture {
        let codec = UriCodec::default();
        let dim_name = format!("[{}]", codec.encode(YEAR_DIM));
        let hier_name = format!("{dim_name}.{dim_name}");
        let level_name = format!("{hier_name}.[0]");

        let members: Vec<CubeMember> = (2010..=2012)
            .map(|y| year_member(&hier_name, &level_name, y))
            .collect();
        let level = Level {
            unique_name: level_name.clone(),
            depth: 0,
            leaf_distance: 0,
            cardinality: members.len() as u32,
            dimension_unique_name: dim_name.clone(),
            hierarchy_unique_name: hier_name.clone(),
            members: Arc::new(DeferredList::preloaded("year members", members)),
        };
        let hierarchy = Hierarchy {
            unique_name: hier_name.clone(),
            dimension_unique_name: dim_name.clone(),
            scheme_iri: None,
            has_all: false,
            default_member_unique_name: None,
            levels: Arc::new(DeferredList::preloaded("year levels", vec![level])),
        };
        let dimension = Dimension {
            unique_name: dim_name.clone(),
            dimension_type: DimensionType::Regular,
            ordinal: 0,
            hierarchies: Arc::new(DeferredList::preloaded("year hierarchies", vec![hierarchy])),
        };
        let cube = Cube {
            unique_name: format!("[{}]", codec.encode(DS)),
            dataset_iri: DS.to_string(),
            caption: None,
            dimensions: Arc::new(DeferredList::preloaded("dimensions", vec![dimension])),
            measures: Arc::new(DeferredList::preloaded(
                "measures",
                vec![
                    measure(VALUE_MEASURE, Aggregator::Sum),
                    measure(COST_MEASURE, Aggregator::Sum),
                ],
            )),
        };
        let generator = Arc::new(QueryGenerator::new(Arc::new(NoTransport), UriCodec::default()));
        let reader = Arc::new(CachingMetadataReader::new(
            generator.clone(),
            &MemberCacheConfig::default(),
        ));
        Fixture {
            cube,
            reader,
            generator,
            dim_name,
            hier_name,
            level_name,
        }
    }

    pub fn year_ident(fixture: &Fixture, year: i64) -> MdxExpr {
        MdxExpr::ident(vec![
            cubeflow::uri::strip_brackets(&fixture.dim_name).to_string(),
            cubeflow::uri::strip_brackets(&fixture.dim_name).to_string(),
            year.to_string(),
        ])
    }

    pub fn measure_ident(iri: &str) -> MdxExpr {
        MdxExpr::ident(vec![
            "Measures".to_string(),
            UriCodec::default().encode(iri),
        ])
    }
}

fn member_names(value: &Value) -> Vec<String> {
    match value {
        Value::List(items) => items
            .iter()
            .flat_map(|item| match item {
                Value::Member(m) => vec![m.unique_name().to_string()],
                Value::Tuple(ms) => ms.iter().map(|m| m.unique_name().to_string()).collect(),
                other => panic!("unexpected element {other:?}"),
            })
            .collect(),
        other => panic!("expected a list, got {other:?}"),
    }
}

#[test]
fn members_of_level_resolve_in_order() {
    let fixture = fixtures::sales();
    let mut eval = Evaluator::new(fixture.cube.clone(), fixture.reader.clone());
    let result = eval
        .eval(&MdxExpr::call(
            "Members",
            vec![MdxExpr::ident(vec![
                cubeflow::uri::strip_brackets(&fixture.dim_name).to_string(),
                cubeflow::uri::strip_brackets(&fixture.dim_name).to_string(),
                "0".to_string(),
            ])],
        ))
        .unwrap();
    let names = member_names(&result);
    assert_eq!(names.len(), 3);
    assert!(names[0].ends_with("[2010]"));
    assert!(names[2].ends_with("[2012]"));
}

#[test]
fn crossjoin_keeps_first_argument_slower_varying() {
    let fixture = fixtures::sales();
    let mut eval = Evaluator::new(fixture.cube.clone(), fixture.reader.clone());
    let a = MdxExpr::Set(vec![
        fixtures::year_ident(&fixture, 2010),
        fixtures::year_ident(&fixture, 2011),
    ]);
    let b = MdxExpr::Set(vec![
        fixtures::measure_ident(VALUE_MEASURE),
        fixtures::measure_ident(COST_MEASURE),
    ]);
    let result = eval.eval(&MdxExpr::call("CrossJoin", vec![a, b])).unwrap();

    let Value::List(tuples) = result else {
        panic!("expected a list")
    };
    assert_eq!(tuples.len(), 4);
    let flat: Vec<(String, String)> = tuples
        .iter()
        .map(|t| match t {
            Value::Tuple(ms) => (
                ms[0].unique_name().to_string(),
                ms[1].unique_name().to_string(),
            ),
            other => panic!("expected tuples, got {other:?}"),
        })
        .collect();
    assert!(flat[0].0.ends_with("[2010]"));
    assert!(flat[1].0.ends_with("[2010]"));
    assert!(flat[2].0.ends_with("[2011]"));
    assert!(flat[3].0.ends_with("[2011]"));
    assert!(flat[0].1.contains("value"));
    assert!(flat[1].1.contains("cost"));
}

#[test]
fn set_literal_flattens_one_nesting_level() {
    let fixture = fixtures::sales();
    let mut eval = Evaluator::new(fixture.cube.clone(), fixture.reader.clone());
    let inner = MdxExpr::Set(vec![
        fixtures::year_ident(&fixture, 2011),
        fixtures::year_ident(&fixture, 2012),
    ]);
    let result = eval
        .eval(&MdxExpr::Set(vec![
            fixtures::year_ident(&fixture, 2010),
            inner,
        ]))
        .unwrap();
    let names = member_names(&result);
    assert_eq!(names.len(), 3);
    assert!(names[0].ends_with("[2010]"));
    assert!(names[1].ends_with("[2011]"));
}

#[test]
fn filter_binds_current_member_and_preserves_order() {
    let fixture = fixtures::sales();
    let mut eval = Evaluator::new(fixture.cube.clone(), fixture.reader.clone());
    let set = MdxExpr::call(
        "Members",
        vec![MdxExpr::ident(vec![
            cubeflow::uri::strip_brackets(&fixture.hier_name).to_string(),
        ])],
    );
    // keep members whose name casts above 2010
    let predicate = MdxExpr::call(
        ">",
        vec![
            MdxExpr::call(
                "Cast",
                vec![
                    MdxExpr::call("Name", vec![MdxExpr::call("CurrentMember", vec![])]),
                    MdxExpr::ident(vec!["NUMERIC".to_string()]),
                ],
            ),
            MdxExpr::Number(2010.0),
        ],
    );
    let result = eval
        .eval(&MdxExpr::call("Filter", vec![set, predicate]))
        .unwrap();
    let names = member_names(&result);
    assert_eq!(names.len(), 2);
    assert!(names[0].ends_with("[2011]"));
    assert!(names[1].ends_with("[2012]"));
}

#[test]
fn hierarchize_passes_the_set_through_unchanged() {
    let fixture = fixtures::sales();
    let mut eval = Evaluator::new(fixture.cube.clone(), fixture.reader.clone());
    let set = MdxExpr::Set(vec![
        fixtures::year_ident(&fixture, 2012),
        fixtures::year_ident(&fixture, 2010),
    ]);
    let result = eval.eval(&MdxExpr::call("Hierarchize", vec![set])).unwrap();
    let names = member_names(&result);
    assert!(names[0].ends_with("[2012]"));
    assert!(names[1].ends_with("[2010]"));
}

#[test]
fn unsupported_operator_fails_fast_by_name() {
    let fixture = fixtures::sales();
    let mut eval = Evaluator::new(fixture.cube.clone(), fixture.reader.clone());
    match eval.eval(&MdxExpr::call("TopCount", vec![])) {
        Err(CubeflowError::Unsupported(message)) => assert!(message.contains("TopCount")),
        other => panic!("expected unsupported-operator error, got {other:?}"),
    }
}

#[test]
fn unsupported_tree_op_fails_fast_by_name() {
    let fixture = fixtures::sales();
    let name = format!(
        "[Measures].[{}]",
        UriCodec::default().encode(VALUE_MEASURE)
    );
    match fixture
        .reader
        .member_relatives(TreeOp::Children, &fixture.cube, &name)
    {
        Err(CubeflowError::Unsupported(message)) => assert!(message.contains("Children")),
        other => panic!("expected unsupported tree-op error, got {other:?}"),
    }
    let found = fixture
        .reader
        .member_relatives(TreeOp::Self_, &fixture.cube, &name)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].unique_name(), name);
}

#[test]
fn with_member_defines_a_calculated_measure() {
    let fixture = fixtures::sales();
    let mut eval = Evaluator::new(fixture.cube.clone(), fixture.reader.clone());
    let with_member = WithMember {
        name: vec!["Measures".to_string(), "margin".to_string()],
        expr: MdxExpr::call(
            "/",
            vec![
                fixtures::measure_ident(VALUE_MEASURE),
                fixtures::measure_ident(COST_MEASURE),
            ],
        ),
    };
    eval.register_calculated(&with_member).unwrap();

    let resolved = eval
        .eval(&MdxExpr::ident(vec![
            "Measures".to_string(),
            "margin".to_string(),
        ]))
        .unwrap();
    let Value::Member(CubeMember::Measure(margin)) = resolved else {
        panic!("expected the calculated measure");
    };
    assert_eq!(margin.aggregator, Aggregator::Calculated);
    // ordinal = base measure count + prior calculated members
    assert_eq!(margin.member.ordinal, 2);

    // the calculated measure flows into fact retrieval
    let query = LogicalQuery {
        cube: fixture.cube.clone(),
        groupby: vec![fixture
            .cube
            .level_by_unique_name(&fixture.level_name)
            .unwrap()],
        measures: vec![margin],
        predicates: vec![],
    };
    let text = fixture.generator.fact_query(&query).unwrap();
    assert!(text.contains("((?m0 / ?m1) AS ?a0)"));
}

#[test]
fn with_member_rejects_non_measure_operands_and_duplicates() {
    let fixture = fixtures::sales();
    let mut eval = Evaluator::new(fixture.cube.clone(), fixture.reader.clone());
    let bad = WithMember {
        name: vec!["Measures".to_string(), "broken".to_string()],
        expr: MdxExpr::call(
            "/",
            vec![
                fixtures::year_ident(&fixture, 2010),
                fixtures::measure_ident(COST_MEASURE),
            ],
        ),
    };
    assert!(eval.register_calculated(&bad).is_err());

    let good = WithMember {
        name: vec!["Measures".to_string(), "margin".to_string()],
        expr: MdxExpr::call(
            "+",
            vec![
                fixtures::measure_ident(VALUE_MEASURE),
                fixtures::measure_ident(COST_MEASURE),
            ],
        ),
    };
    eval.register_calculated(&good).unwrap();
    match eval.register_calculated(&good) {
        Err(CubeflowError::Metadata(message)) => assert!(message.contains("margin")),
        other => panic!("expected ambiguous-name error, got {other:?}"),
    }
}

#[test]
fn statement_axes_evaluate_to_positions() {
    let fixture = fixtures::sales();
    let mut eval = Evaluator::new(fixture.cube.clone(), fixture.reader.clone());
    let statement = SelectStatement {
        with_members: vec![],
        axes: vec![
            cubeflow::mdx::AxisSpec {
                expr: MdxExpr::Set(vec![fixtures::measure_ident(VALUE_MEASURE)]),
            },
            cubeflow::mdx::AxisSpec {
                expr: MdxExpr::call(
                    "Members",
                    vec![MdxExpr::ident(vec![
                        cubeflow::uri::strip_brackets(&fixture.hier_name).to_string(),
                    ])],
                ),
            },
        ],
        cube: vec![cubeflow::uri::strip_brackets(&fixture.cube.unique_name).to_string()],
        filter: None,
    };
    let (axes, filter) = eval.evaluate_axes(&statement).unwrap();
    assert_eq!(axes.len(), 2);
    assert_eq!(axes[0].positions.len(), 1);
    assert_eq!(axes[1].positions.len(), 3);
    assert!(filter.positions.is_empty());
}
