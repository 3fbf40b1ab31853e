//! The SPARQL query generator.
//!
//! Translates schema-discovery restrictions and logical fact queries into
//! SPARQL text, executes it over the transport, and maps the flat rows
//! back to metadata objects. Both metadata discovery and fact retrieval go
//! through this one component.

use std::sync::Arc;

use oxrdf::Term;

use crate::error::{CubeflowError, Result};
use crate::transport::{SparqlRow, SparqlTransport};
use crate::uri::UriCodec;

mod ast;
mod discovery;
mod facts;

pub use ast::{
    iri, triple, var, SelectItem, SelectQuery, SparqlBinaryOperator, SparqlExpr, SparqlRenderer,
    SparqlTerm, TriplePattern, ValuesClause,
};
pub use discovery::{CubeRow, DimensionRow, HierarchyRow, LevelRow, Restrictions};

pub struct QueryGenerator {
    transport: Arc<dyn SparqlTransport>,
    codec: UriCodec,
}

impl QueryGenerator {
    pub fn new(transport: Arc<dyn SparqlTransport>, codec: UriCodec) -> Self {
        Self { transport, codec }
    }

    pub fn codec(&self) -> &UriCodec {
        &self.codec
    }

    /// Execute rendered SPARQL, tagging any failure with the query text.
    pub(crate) fn run(&self, query: &str) -> Result<Vec<SparqlRow>> {
        tracing::debug!(%query, "executing sparql");
        self.transport
            .execute(query)
            .map_err(|e| CubeflowError::Transport {
                message: e.to_string(),
                query: query.to_string(),
            })
    }

    /// Execute and drop the header row.
    pub(crate) fn run_data(&self, query: &str) -> Result<Vec<SparqlRow>> {
        let mut rows = self.run(query)?;
        if !rows.is_empty() {
            rows.remove(0);
        }
        Ok(rows)
    }
}

pub(crate) fn cell_term(row: &SparqlRow, idx: usize) -> Option<Term> {
    row.get(idx).and_then(|c| c.clone())
}

pub(crate) fn cell_key(row: &SparqlRow, idx: usize) -> Option<String> {
    row.get(idx)
        .and_then(|c| c.as_ref())
        .map(crate::transport::term_key)
}

pub(crate) fn cell_u32(row: &SparqlRow, idx: usize) -> Option<u32> {
    cell_key(row, idx).and_then(|v| v.parse().ok())
}
