use image::DynamicImage;
use rayon::prelude::*;

use crate::ExtractionError;

/// Extracts card embedding vectors from decoded images.
///
/// The input is any decoded raster; implementations handle resizing and
/// colour conversion themselves. The output is a dense f32 vector of
/// [`CardEmbedder::dimension`] components with unit L2 norm.
///
/// # Batching
///
/// [`CardEmbedder::embed_batch`] exists for throughput only. It must return
/// exactly what per-image [`CardEmbedder::embed`] calls would, in input
/// order, with one result per image so a single bad image never poisons
/// the rest of the batch.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use.
pub trait CardEmbedder: Send + Sync {
    /// Computes the embedding for one image.
    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>, ExtractionError>;

    /// Computes embeddings for several images, one result per input.
    fn embed_batch(&self, images: &[DynamicImage]) -> Vec<Result<Vec<f32>, ExtractionError>> {
        images.par_iter().map(|img| self.embed(img)).collect()
    }

    /// Returns the dimensionality of the embedding vectors (e.g., 384).
    fn dimension(&self) -> usize;

    /// Identifies the extractor and its parameters. Two embedders with the
    /// same id produce identical vectors for identical images.
    fn model_id(&self) -> &str;
}
