//! The connection-scoped engine: cube catalog plus statement execution.

use std::sync::Arc;

use crate::cellset::CellSet;
use crate::config::EngineConfig;
use crate::deferred::DeferredList;
use crate::error::{CubeflowError, Result};
use crate::mdx::{Evaluator, SelectStatement};
use crate::metadata::{build_cube, CachingMetadataReader};
use crate::model::Cube;
use crate::sparql::{QueryGenerator, Restrictions};
use crate::transport::SparqlTransport;
use crate::uri::{self, UriCodec};

pub struct Engine {
    generator: Arc<QueryGenerator>,
    reader: Arc<CachingMetadataReader>,
    cubes: DeferredList<Cube>,
}

impl Engine {
    pub fn new(transport: Arc<dyn SparqlTransport>, config: EngineConfig) -> Arc<Self> {
        let codec = UriCodec::new(config.prefixes.clone());
        let generator = Arc::new(QueryGenerator::new(transport, codec));
        let reader = Arc::new(CachingMetadataReader::new(
            generator.clone(),
            &config.member_cache,
        ));
        let cubes = {
            let generator = generator.clone();
            DeferredList::named("cubes", move || {
                let rows = generator.cubes(&Restrictions::default())?;
                Ok(rows
                    .into_iter()
                    .map(|row| build_cube(&generator, row))
                    .collect())
            })
        };
        Arc::new(Self {
            generator,
            reader,
            cubes,
        })
    }

    pub fn cubes(&self) -> Result<Arc<Vec<Cube>>> {
        self.cubes.get()
    }

    pub fn cube(&self, unique_name: &str) -> Result<Cube> {
        self.cubes()?
            .iter()
            .find(|c| c.unique_name == unique_name)
            .cloned()
            .ok_or_else(|| CubeflowError::Metadata(format!("unknown cube {unique_name}")))
    }

    pub fn generator(&self) -> &Arc<QueryGenerator> {
        &self.generator
    }

    pub fn reader(&self) -> &Arc<CachingMetadataReader> {
        &self.reader
    }

    /// Evaluate a select statement's axes and assemble the cellset.
    pub fn execute(&self, statement: &SelectStatement) -> Result<CellSet> {
        let cube = self.cube(&uri::join_segments(&statement.cube))?;
        let mut evaluator = Evaluator::new(cube.clone(), self.reader.clone());
        let (axes, filter_axis) = evaluator.evaluate_axes(statement)?;
        CellSet::execute(&cube, &self.generator, axes, filter_axis)
    }

    /// Discard all lazily-loaded metadata, e.g. after a locale change.
    /// The next access rebuilds it from the endpoint.
    pub fn reset_metadata(&self) {
        self.cubes.reset();
        self.reader.clear_cache();
    }
}
