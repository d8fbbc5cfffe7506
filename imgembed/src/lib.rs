//! Card image embeddings: decoded raster -> fixed-length unit vector.
//!
//! # Architecture
//!
//! Extraction runs in three stages:
//!
//! 1. [`decode_image`]: raw PNG/JPEG/WebP bytes -> [`image::DynamicImage`]
//! 2. [`CardEmbedder::embed`]: raster -> embedding of [`CardEmbedder::dimension`] floats
//! 3. [`l2_normalize`]: every embedding leaves the extractor with unit length
//!
//! Because all vectors are unit length, the inner product of two embeddings
//! equals their cosine similarity. The same normalization runs when the
//! reference index is built and when a query photo is embedded.
//!
//! # Descriptor Model
//!
//! [`DescriptorModel`] is the built-in extractor. It concatenates three
//! independently normalized blocks computed on a square working raster:
//!
//! ```text
//! colour layout   8x8 thumbnail, 3 channels, mean-centred   192
//! edges           4x4 cells x 8 orientation bins            128
//! colour mix      4x4x4 joint RGB histogram                  64
//!                                                           ---
//!                                                           384
//! ```

mod decode;
mod descriptor;
mod error;
pub mod features;
mod model;

pub use decode::{decode_image, embed_bytes};
pub use descriptor::{DescriptorModel, DESCRIPTOR_MODEL_VERSION};
pub use error::ExtractionError;
pub use features::{compute_descriptor, l2_norm, l2_normalize, DescriptorConfig};
pub use model::CardEmbedder;

pub use image::DynamicImage;
