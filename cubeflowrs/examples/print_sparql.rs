//! Render the SPARQL for a small grouped query without touching an
//! endpoint. Useful for eyeballing generator output:
//!
//!   cargo run --example print_sparql

use std::collections::BTreeMap;
use std::sync::Arc;

use oxrdf::{Literal, NamedNode, Term};

use cubeflow::deferred::DeferredList;
use cubeflow::error::Result;
use cubeflow::model::{
    Aggregator, Cube, CubeMember, Hierarchy, Level, Measure, Member, MemberType,
};
use cubeflow::plan::{LogicalQuery, SelectionPredicate};
use cubeflow::sparql::QueryGenerator;
use cubeflow::transport::{SparqlRow, SparqlTransport};
use cubeflow::uri::UriCodec;

struct NoTransport;

impl SparqlTransport for NoTransport {
    fn execute(&self, _query: &str) -> Result<Vec<SparqlRow>> {
        Ok(vec![])
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let codec = UriCodec::default();
    let dataset = "http://example.org/sales";
    let year_dim = "http://example.org/dims/year";
    let value_measure = "http://example.org/measure/value";

    let dim_name = format!("[{}]", codec.encode(year_dim));
    let hier_name = format!("{dim_name}.{dim_name}");
    let level_name = format!("{hier_name}.[0]");

    let members: Vec<CubeMember> = (2010..=2014)
        .map(|year| {
            CubeMember::Member(Member {
                unique_name: format!("{hier_name}.[{year}]"),
                parent_unique_name: None,
                member_type: MemberType::Regular,
                ordinal: 0,
                properties: BTreeMap::new(),
                hierarchy_unique_name: hier_name.clone(),
                level_unique_name: level_name.clone(),
                term: Some(Term::Literal(Literal::new_simple_literal(year.to_string()))),
            })
        })
        .collect();
    let level = Level {
        unique_name: level_name,
        depth: 0,
        leaf_distance: 0,
        cardinality: members.len() as u32,
        dimension_unique_name: dim_name.clone(),
        hierarchy_unique_name: hier_name.clone(),
        members: Arc::new(DeferredList::preloaded("year members", members)),
    };
    let hierarchy = Hierarchy {
        unique_name: hier_name,
        dimension_unique_name: dim_name,
        scheme_iri: None,
        has_all: false,
        default_member_unique_name: None,
        levels: Arc::new(DeferredList::preloaded("year levels", vec![level.clone()])),
    };
    let measure = Measure {
        member: Member {
            unique_name: format!("[Measures].[{}]", codec.encode(value_measure)),
            parent_unique_name: None,
            member_type: MemberType::Measure,
            ordinal: 0,
            properties: BTreeMap::new(),
            hierarchy_unique_name: "[Measures]".to_string(),
            level_unique_name: "[Measures].[Measures]".to_string(),
            term: Some(Term::NamedNode(NamedNode::new_unchecked(value_measure))),
        },
        aggregator: Aggregator::Sum,
        datatype: None,
        formula: None,
    };
    let cube = Cube {
        unique_name: format!("[{}]", codec.encode(dataset)),
        dataset_iri: dataset.to_string(),
        caption: None,
        dimensions: Arc::new(DeferredList::preloaded("dimensions", vec![])),
        measures: Arc::new(DeferredList::preloaded("measures", vec![measure.clone()])),
    };

    let query = LogicalQuery {
        cube,
        groupby: vec![level.clone()],
        measures: vec![measure],
        predicates: vec![SelectionPredicate {
            hierarchy,
            members: vec![],
        }],
    };

    let generator = QueryGenerator::new(Arc::new(NoTransport), codec);
    println!("{}", generator.fact_query(&query)?);
    Ok(())
}
