use thiserror::Error;

/// Errors returned while turning an image into an embedding.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("imgembed: decode failed: {0}")]
    Decode(String),

    #[error("imgembed: unsupported image layout: {0}")]
    UnsupportedLayout(String),

    #[error("imgembed: empty image: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    /// The feature vector has zero norm and cannot be normalised. The
    /// built-in descriptor always carries a colour histogram, so only
    /// custom [`CardEmbedder`](crate::CardEmbedder) implementations whose
    /// features can all vanish return this.
    #[error("imgembed: image has no usable signal (zero-norm descriptor)")]
    Degenerate,

    #[error("imgembed: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
