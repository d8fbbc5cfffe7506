//! [`CardEmbedder`] implementation backed by the built-in global descriptor.

use image::DynamicImage;

use crate::error::ExtractionError;
use crate::features::{compute_descriptor, DescriptorConfig};
use crate::model::CardEmbedder;

/// Bumped whenever [`compute_descriptor`] changes its output for the same
/// configuration. Artifacts built by another version must be rebuilt.
pub const DESCRIPTOR_MODEL_VERSION: u32 = 1;

/// [`CardEmbedder`] implementation using the handcrafted global descriptor.
///
/// # Pipeline
///
/// 1. Any raster -> square RGB working image (triangle filter)
/// 2. Colour layout, edge orientation and colour histogram blocks
/// 3. Per-block L2 normalization, concatenation, final L2 normalization
///
/// The model is stateless, so it is trivially safe for concurrent use.
#[derive(Debug, Clone)]
pub struct DescriptorModel {
    cfg: DescriptorConfig,
    dim: usize,
    model_id: String,
}

impl DescriptorModel {
    /// Creates a DescriptorModel with the default 384-dimensional configuration.
    pub fn new() -> Self {
        Self::with_config(DescriptorConfig::default())
    }

    /// Creates a DescriptorModel with the given configuration. Out-of-range
    /// fields fall back to their defaults.
    pub fn with_config(cfg: DescriptorConfig) -> Self {
        let cfg = cfg.sanitized();
        let model_id = format!(
            "descriptor-v{}/w{}-g{}-c{}x{}-h{}",
            DESCRIPTOR_MODEL_VERSION,
            cfg.work_size,
            cfg.layout_grid,
            cfg.cells,
            cfg.orientations,
            cfg.color_bins,
        );
        Self {
            dim: cfg.dimension(),
            cfg,
            model_id,
        }
    }

    pub fn config(&self) -> &DescriptorConfig {
        &self.cfg
    }
}

impl Default for DescriptorModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CardEmbedder for DescriptorModel {
    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>, ExtractionError> {
        let v = compute_descriptor(image, &self.cfg)?;
        if v.len() != self.dim {
            return Err(ExtractionError::DimensionMismatch {
                expected: self.dim,
                got: v.len(),
            });
        }
        Ok(v)
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
