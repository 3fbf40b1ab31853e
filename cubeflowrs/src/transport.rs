//! SPARQL transport boundary.
//!
//! The engine depends only on this contract: a transport executes SPARQL
//! text and returns ordered rows of RDF terms, the first row naming the
//! bound variables. HTTP, auth, and endpoint negotiation live behind it.

use oxrdf::Term;

use crate::error::Result;

/// One result row. `None` marks an unbound variable.
pub type SparqlRow = Vec<Option<Term>>;

pub trait SparqlTransport: Send + Sync {
    /// Execute a SPARQL select query. The first returned row is the header:
    /// one simple literal per bound variable, in projection order.
    fn execute(&self, query: &str) -> Result<Vec<SparqlRow>>;
}

/// The addressing key of a term: IRI text for named nodes, lexical value
/// for literals, identifier for blank nodes. Fact rows and members are
/// matched on this string.
pub fn term_key(term: &Term) -> String {
    match term {
        Term::NamedNode(n) => n.as_str().to_string(),
        Term::BlankNode(b) => b.as_str().to_string(),
        Term::Literal(l) => l.value().to_string(),
    }
}

/// Variable names from a header row; unbound cells yield empty names.
pub fn header_names(row: &SparqlRow) -> Vec<String> {
    row.iter()
        .map(|cell| cell.as_ref().map(term_key).unwrap_or_default())
        .collect()
}
