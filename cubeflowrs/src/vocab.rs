//! RDF vocabulary constants used by the query generator.
//!
//! Constants are organized by vocabulary:
//! - `qb` - RDF Data Cube (http://purl.org/linked-data/cube#)
//! - `skos` - SKOS concept schemes encoding dimension hierarchies
//! - `rdf` / `rdfs` - core RDF terms, labels, comments
//! - `xsd` - XSD datatypes
//! - `olap` - depth tags on code-list concepts

/// RDF Data Cube vocabulary.
pub mod qb {
    pub const DATA_STRUCTURE_DEFINITION: &str =
        "http://purl.org/linked-data/cube#DataStructureDefinition";
    pub const COMPONENT: &str = "http://purl.org/linked-data/cube#component";
    pub const DIMENSION: &str = "http://purl.org/linked-data/cube#dimension";
    pub const MEASURE: &str = "http://purl.org/linked-data/cube#measure";
    pub const AGGREGATOR: &str = "http://purl.org/linked-data/cube#aggregator";
    pub const CODE_LIST: &str = "http://purl.org/linked-data/cube#codeList";
    pub const DATA_SET: &str = "http://purl.org/linked-data/cube#dataSet";
    pub const STRUCTURE: &str = "http://purl.org/linked-data/cube#structure";
}

/// RDF vocabulary.
pub mod rdf {
    pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
}

/// SKOS vocabulary for hierarchical code lists.
pub mod skos {
    pub const IN_SCHEME: &str = "http://www.w3.org/2004/02/skos/core#inScheme";
    pub const MEMBER: &str = "http://www.w3.org/2004/02/skos/core#member";
    pub const NARROWER: &str = "http://www.w3.org/2004/02/skos/core#narrower";
    pub const HAS_TOP_CONCEPT: &str = "http://www.w3.org/2004/02/skos/core#hasTopConcept";
    pub const NOTATION: &str = "http://www.w3.org/2004/02/skos/core#notation";
}

/// RDFS vocabulary.
pub mod rdfs {
    pub const LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
    pub const COMMENT: &str = "http://www.w3.org/2000/01/rdf-schema#comment";
}

/// XSD datatypes.
pub mod xsd {
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
}

/// Depth tags on code-list concepts: a concept's 0-based distance from the
/// finest-grained concept in its scheme.
pub mod olap {
    pub const DEPTH: &str = "http://purl.org/olap#depth";
}
