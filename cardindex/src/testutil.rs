use std::io::Cursor;

use cardvault_imgembed::{CardEmbedder, DynamicImage, ExtractionError};
use image::{ImageFormat, Rgb, RgbImage};

/// PNG bytes of a synthetic card; different seeds give visually distinct cards.
pub fn card_png(seed: u32) -> Vec<u8> {
    let base = [
        (seed.wrapping_mul(97) % 256) as u8,
        (seed.wrapping_mul(57).wrapping_add(80) % 256) as u8,
        (seed.wrapping_mul(31).wrapping_add(160) % 256) as u8,
    ];
    let period = 3 + seed % 9;
    let img = RgbImage::from_fn(60, 84, |x, y| {
        let band = if seed % 2 == 0 { x } else { y };
        if (band / period) % 2 == 0 {
            Rgb(base)
        } else {
            Rgb([255 - base[0], base[2], base[1]])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

/// Embedder that ignores the image and returns a fixed-length constant.
/// `lying` makes it advertise one dimension and return another.
pub struct FixedEmbedder {
    advertised: usize,
    actual: usize,
}

impl FixedEmbedder {
    pub fn lying(advertised: usize, actual: usize) -> Self {
        Self { advertised, actual }
    }
}

impl CardEmbedder for FixedEmbedder {
    fn embed(&self, _image: &DynamicImage) -> Result<Vec<f32>, ExtractionError> {
        let v = 1.0 / (self.actual as f32).sqrt();
        Ok(vec![v; self.actual])
    }

    fn dimension(&self) -> usize {
        self.advertised
    }

    fn model_id(&self) -> &str {
        "fixed"
    }
}
