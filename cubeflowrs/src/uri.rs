//! Mapping between RDF URIs and MDX-legal identifiers.
//!
//! Unique names are built from URIs by compressing a known namespace to a
//! short prefix and percent-escaping the characters the MDX identifier
//! grammar treats specially (`%`, `.`, `-`). Every escape is exactly
//! invertible; `decode(encode(uri)) == uri` for any absolute URI.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

/// Default namespace table used when no prefixes are configured.
pub static DEFAULT_PREFIXES: Lazy<BTreeMap<String, String>> = Lazy::new(|| {
    [
        ("qb", "http://purl.org/linked-data/cube#"),
        ("skos", "http://www.w3.org/2004/02/skos/core#"),
        ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
        ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
        ("xsd", "http://www.w3.org/2001/XMLSchema#"),
        ("olap", "http://purl.org/olap#"),
        ("sdmx-measure", "http://purl.org/linked-data/sdmx/2009/measure#"),
        ("sdmx-dimension", "http://purl.org/linked-data/sdmx/2009/dimension#"),
    ]
    .into_iter()
    .map(|(p, ns)| (p.to_string(), ns.to_string()))
    .collect()
});

/// Escape the MDX-special characters. `%` must go first so the escape
/// sequences themselves survive the round trip.
pub fn escape(raw: &str) -> String {
    raw.replace('%', "%25").replace('.', "%2E").replace('-', "%2D")
}

/// Inverse of [`escape`]. `%25` must go last.
pub fn unescape(encoded: &str) -> String {
    encoded
        .replace("%2D", "-")
        .replace("%2E", ".")
        .replace("%25", "%")
}

/// Bidirectional URI/name codec over a prefix table.
#[derive(Debug, Clone)]
pub struct UriCodec {
    /// (prefix, namespace), longest namespace first.
    prefixes: Vec<(String, String)>,
}

impl Default for UriCodec {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIXES.clone())
    }
}

impl UriCodec {
    pub fn new(prefixes: BTreeMap<String, String>) -> Self {
        let mut prefixes: Vec<(String, String)> = prefixes.into_iter().collect();
        prefixes.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        Self { prefixes }
    }

    /// Compress a URI to an MDX-legal identifier segment.
    pub fn encode(&self, uri: &str) -> String {
        for (prefix, ns) in &self.prefixes {
            if let Some(local) = uri.strip_prefix(ns.as_str()) {
                return format!("{prefix}:{}", escape(local));
            }
        }
        escape(uri)
    }

    /// Expand an identifier segment back to its URI. Prefixed forms expand
    /// through the table; anything else is an escaped full URI. URI schemes
    /// (`http`, `urn`, ...) must not be registered as prefixes.
    pub fn decode(&self, name: &str) -> String {
        for (prefix, ns) in &self.prefixes {
            if let Some(local) = name.strip_prefix(&format!("{prefix}:")) {
                return format!("{ns}{}", unescape(local));
            }
        }
        unescape(name)
    }
}

/// Wrap a segment in MDX brackets.
pub fn bracket(segment: &str) -> String {
    format!("[{segment}]")
}

/// Strip one layer of MDX brackets, if present.
pub fn strip_brackets(segment: &str) -> &str {
    segment
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(segment)
}

/// The text inside the final bracketed segment of a unique name.
pub fn last_segment(unique_name: &str) -> &str {
    match unique_name.rfind("].[") {
        Some(idx) => strip_brackets(&unique_name[idx + 2..]),
        None => strip_brackets(unique_name),
    }
}

/// Split a unique name into its unbracketed segments.
pub fn split_segments(unique_name: &str) -> Vec<String> {
    unique_name
        .split("].[")
        .map(|s| strip_brackets(s).to_string())
        .collect()
}

/// Join unbracketed segments into a unique name.
pub fn join_segments<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| bracket(s.as_ref()))
        .collect::<Vec<_>>()
        .join(".")
}
