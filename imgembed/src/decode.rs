use image::{DynamicImage, ImageError};

use crate::{CardEmbedder, ExtractionError};

/// Decodes raw image bytes (PNG, JPEG or WebP).
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::Decode("empty input".into()));
    }
    image::load_from_memory(bytes).map_err(|e| match e {
        ImageError::Unsupported(u) => ExtractionError::UnsupportedLayout(u.to_string()),
        other => ExtractionError::Decode(other.to_string()),
    })
}

/// Decodes `bytes` and embeds the result with `embedder`.
pub fn embed_bytes<E>(embedder: &E, bytes: &[u8]) -> Result<Vec<f32>, ExtractionError>
where
    E: CardEmbedder + ?Sized,
{
    let image = decode_image(bytes)?;
    embedder.embed(&image)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 90]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn decode_png() {
        let img = decode_image(&png_bytes(20, 30)).unwrap();
        assert_eq!(img.width(), 20);
        assert_eq!(img.height(), 30);
    }

    #[test]
    fn decode_empty() {
        assert!(matches!(
            decode_image(&[]),
            Err(ExtractionError::Decode(_))
        ));
    }

    #[test]
    fn decode_garbage() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::Decode(_) | ExtractionError::UnsupportedLayout(_)
        ));
    }

    #[test]
    fn decode_truncated_png() {
        let mut bytes = png_bytes(16, 16);
        bytes.truncate(bytes.len() / 2);
        assert!(decode_image(&bytes).is_err());
    }
}
