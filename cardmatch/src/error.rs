use std::time::Duration;

use cardvault_cardindex::{BuildError, IndexError};
use cardvault_imgembed::ExtractionError;
use thiserror::Error;

/// Failure to obtain an artifact from a remote store. Always recovered by
/// the provisioner, which moves on to the local artifact.
#[derive(Error, Debug)]
pub enum RemoteFetchError {
    #[error("remote: no artifact store configured")]
    NotConfigured,

    #[error("remote: {0} not found")]
    NotFound(String),

    #[error("remote: HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("remote: request failed: {0}")]
    Request(String),

    #[error("remote: timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote: {0}")]
    Io(String),
}

impl From<reqwest::Error> for RemoteFetchError {
    fn from(e: reqwest::Error) -> Self {
        RemoteFetchError::Request(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("provision: rebuild failed: {0}")]
    Build(#[from] BuildError),

    #[error("provision: no usable artifact and no corpus configured for rebuild")]
    NoCorpus,

    #[error("provision: artifact dimension {artifact} does not match extractor dimension {extractor}")]
    DimensionMismatch { artifact: usize, extractor: usize },

    #[error("provision: refusing to serve an empty index")]
    EmptyIndex,

    #[error("provision: background task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("index unavailable: {reason}")]
    IndexUnavailable { reason: String },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("query: vector has dimension {query}, index has {index}")]
    DimensionMismatch { query: usize, index: usize },

    #[error("query: vector has norm {norm}, expected a unit vector")]
    NotNormalized { norm: f64 },

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config: {0}")]
    Io(String),

    #[error("config: parse error: {0}")]
    Parse(String),

    #[error("config: invalid: {0}")]
    Invalid(String),
}
