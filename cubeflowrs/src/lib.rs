pub mod cellset;
pub mod config;
pub mod deferred;
pub mod engine;
pub mod error;
pub mod mdx;
pub mod metadata;
pub mod model;
pub mod plan;
pub mod sparql;
pub mod transport;
pub mod uri;
pub mod vocab;

use std::sync::Arc;

/// Open an engine over a SPARQL transport with the given configuration.
pub fn connect(
    transport: Arc<dyn crate::transport::SparqlTransport>,
    config: crate::config::EngineConfig,
) -> Arc<crate::engine::Engine> {
    crate::engine::Engine::new(transport, config)
}

pub use crate::cellset::{Cell, CellSet};
pub use crate::config::EngineConfig;
pub use crate::deferred::DeferredList;
pub use crate::engine::Engine;
pub use crate::error::{CubeflowError, Result};
pub use crate::mdx::{Evaluator, MdxExpr, SelectStatement};
pub use crate::model::{Cube, Dimension, Hierarchy, Level, Measure, Member};
pub use crate::sparql::{QueryGenerator, Restrictions};
pub use crate::transport::{SparqlRow, SparqlTransport};
pub use crate::uri::UriCodec;
