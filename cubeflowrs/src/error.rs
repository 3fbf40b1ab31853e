use thiserror::Error;

pub type Result<T> = std::result::Result<T, CubeflowError>;

#[derive(Debug, Error)]
pub enum CubeflowError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sparql transport error: {message}; query was:\n{query}")]
    Transport { message: String, query: String },
    #[error("metadata error: {0}")]
    Metadata(String),
    #[error("recursive population of deferred list '{0}'")]
    RecursivePopulation(String),
    #[error("unsupported operator: {0}")]
    Unsupported(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("coordinates out of bounds: {0}")]
    Bounds(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
