use thiserror::Error;
use uuid::Uuid;

use crate::builder::BuildReport;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("cardindex: invalid dimension {0}")]
    InvalidDimension(usize),

    #[error("cardindex: dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("cardindex: label table has {labels} entries but index has {vectors} vectors")]
    LengthMismatch { labels: usize, vectors: usize },

    #[error("cardindex: artifact files come from different builds (index {index}, labels {labels})")]
    MixedArtifact { index: Uuid, labels: Uuid },

    #[error("cardindex: artifact file not found: {0}")]
    NotFound(String),

    #[error("cardindex: {0}")]
    Io(String),

    #[error("cardindex: invalid format: {0}")]
    InvalidFormat(String),
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(
        "cardindex: build produced no vectors ({} items processed, {} failed)",
        .report.processed,
        .report.failed.len()
    )]
    EmptyIndex { report: BuildReport },

    #[error("cardindex: extractor returned {got}-dimensional vector, index expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error(transparent)]
    Index(#[from] IndexError),
}
