use std::f32::consts::PI;

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};

use crate::ExtractionError;

/// Configures the global card descriptor.
///
/// Default configuration yields a 384-dimensional descriptor:
/// 8x8 colour layout (192), 4x4 cells of 8 edge orientations (128),
/// and a 4x4x4 RGB histogram (64).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorConfig {
    /// Side of the square working raster every input is resampled to (default: 64).
    pub work_size: u32,
    /// Side of the colour layout thumbnail (default: 8).
    pub layout_grid: u32,
    /// Spatial cells per side for the edge histogram (default: 4).
    pub cells: u32,
    /// Unsigned gradient orientation bins per cell (default: 8).
    pub orientations: usize,
    /// Quantization levels per channel for the colour histogram (default: 4).
    pub color_bins: usize,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            work_size: 64,
            layout_grid: 8,
            cells: 4,
            orientations: 8,
            color_bins: 4,
        }
    }
}

impl DescriptorConfig {
    /// Returns the descriptor length produced by this configuration.
    pub fn dimension(&self) -> usize {
        let grid = self.layout_grid as usize;
        let cells = self.cells as usize;
        grid * grid * 3 + cells * cells * self.orientations + self.color_bins.pow(3)
    }

    /// Replaces out-of-range fields with defaults.
    pub(crate) fn sanitized(mut self) -> Self {
        let d = Self::default();
        if self.work_size < 8 {
            self.work_size = d.work_size;
        }
        if self.layout_grid == 0 || self.layout_grid > self.work_size {
            self.layout_grid = d.layout_grid.min(self.work_size);
        }
        // Each cell needs interior pixels for central differences.
        if self.cells == 0 || self.cells * 2 > self.work_size {
            self.cells = d.cells;
        }
        if self.orientations == 0 {
            self.orientations = d.orientations;
        }
        if self.color_bins == 0 || self.color_bins > 256 {
            self.color_bins = d.color_bins;
        }
        self
    }
}

/// Computes the unit-length descriptor of `image`.
///
/// Returns [`ExtractionError::EmptyImage`] for zero-sized rasters. The
/// colour histogram block always has mass, so the zero-norm
/// [`ExtractionError::Degenerate`] guard does not fire for any config.
pub fn compute_descriptor(
    image: &DynamicImage,
    cfg: &DescriptorConfig,
) -> Result<Vec<f32>, ExtractionError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(ExtractionError::EmptyImage { width, height });
    }

    let work = imageops::resize(
        &image.to_rgb8(),
        cfg.work_size,
        cfg.work_size,
        FilterType::Triangle,
    );

    let mut out = Vec::with_capacity(cfg.dimension());
    for mut block in [
        color_layout(&work, cfg.layout_grid),
        edge_histogram(&work, cfg.cells, cfg.orientations),
        color_histogram(&work, cfg.color_bins),
    ] {
        l2_normalize(&mut block);
        out.extend_from_slice(&block);
    }

    if l2_norm(&out) == 0.0 {
        return Err(ExtractionError::Degenerate);
    }
    l2_normalize(&mut out);
    Ok(out)
}

/// Per-channel mean-centred thumbnail, laid out row-major as `[y][x][c]`.
fn color_layout(work: &RgbImage, grid: u32) -> Vec<f32> {
    let thumb = imageops::resize(work, grid, grid, FilterType::Triangle);
    let n = (grid * grid) as f32;

    let mut mean = [0.0f32; 3];
    for px in thumb.pixels() {
        for c in 0..3 {
            mean[c] += px[c] as f32 / 255.0;
        }
    }
    for m in &mut mean {
        *m /= n;
    }

    let mut out = Vec::with_capacity((grid * grid * 3) as usize);
    for px in thumb.pixels() {
        for c in 0..3 {
            out.push(px[c] as f32 / 255.0 - mean[c]);
        }
    }
    out
}

/// Magnitude-weighted histogram of unsigned gradient orientations per cell.
fn edge_histogram(work: &RgbImage, cells: u32, bins: usize) -> Vec<f32> {
    let (w, h) = work.dimensions();
    let luma: Vec<f32> = work
        .pixels()
        .map(|px| (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32) / 255.0)
        .collect();
    let at = |x: u32, y: u32| luma[(y * w + x) as usize];

    let mut hist = vec![0.0f32; (cells * cells) as usize * bins];
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let gx = at(x + 1, y) - at(x - 1, y);
            let gy = at(x, y + 1) - at(x, y - 1);
            let mag = (gx * gx + gy * gy).sqrt();
            if mag == 0.0 {
                continue;
            }

            // Unsigned orientation: an edge and its reversed contrast share a bin.
            let theta = gy.atan2(gx).rem_euclid(PI);
            let bin = ((theta / PI * bins as f32) as usize).min(bins - 1);

            let cx = (x * cells / w) as usize;
            let cy = (y * cells / h) as usize;
            hist[(cy * cells as usize + cx) * bins + bin] += mag;
        }
    }
    hist
}

/// Joint RGB histogram with `bins` levels per channel, frequency normalised.
fn color_histogram(work: &RgbImage, bins: usize) -> Vec<f32> {
    let mut hist = vec![0.0f32; bins * bins * bins];
    let quant = |v: u8| v as usize * bins / 256;

    let mut total = 0usize;
    for px in work.pixels() {
        let idx = (quant(px[0]) * bins + quant(px[1])) * bins + quant(px[2]);
        hist[idx] += 1.0;
        total += 1;
    }
    if total > 0 {
        for v in &mut hist {
            *v /= total as f32;
        }
    }
    hist
}

/// Returns the Euclidean length of `v` (f64 accumulation).
pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt()
}

/// Scales `v` in place to unit length. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        let scale = (1.0 / norm) as f32;
        for x in v.iter_mut() {
            *x *= scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn solid(w: u32, h: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(color)))
    }

    fn stripes(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, _| {
            if (x / 6) % 2 == 0 {
                Rgb([240, 240, 240])
            } else {
                Rgb([20, 20, 120])
            }
        }))
    }

    fn split(w: u32, h: u32, vertical: bool, first: u8) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            let before = if vertical { x < w / 2 } else { y < h / 2 };
            let v = if before { first } else { 255 - first };
            Rgb([v, v, v])
        })
    }

    #[test]
    fn edge_orientation_ignores_contrast_polarity() {
        for vertical in [true, false] {
            let dark_to_light = edge_histogram(&split(32, 32, vertical, 0), 2, 8);
            let light_to_dark = edge_histogram(&split(32, 32, vertical, 255), 2, 8);
            assert!(dark_to_light.iter().any(|&v| v > 0.0));
            for (a, b) in dark_to_light.iter().zip(&light_to_dark) {
                assert!((a - b).abs() < 1e-4, "vertical={vertical}: {dark_to_light:?} vs {light_to_dark:?}");
            }
        }
    }

    #[test]
    fn vertical_edge_lands_in_first_bin() {
        let hist = edge_histogram(&split(32, 32, true, 255), 1, 8);
        assert!(hist[0] > 0.0);
        assert!(hist[1..].iter().all(|&v| v == 0.0), "{hist:?}");
    }

    #[test]
    fn default_dimension() {
        assert_eq!(DescriptorConfig::default().dimension(), 384);
    }

    #[test]
    fn sanitized_restores_defaults() {
        let cfg = DescriptorConfig {
            work_size: 0,
            layout_grid: 0,
            cells: 0,
            orientations: 0,
            color_bins: 0,
        }
        .sanitized();
        assert_eq!(cfg, DescriptorConfig::default());
    }

    #[test]
    fn descriptor_is_unit_length() {
        let cfg = DescriptorConfig::default();
        for img in [solid(40, 56, [200, 10, 10]), stripes(63, 88)] {
            let v = compute_descriptor(&img, &cfg).unwrap();
            assert_eq!(v.len(), 384);
            let norm = l2_norm(&v);
            assert!((norm - 1.0).abs() < 1e-5, "norm = {norm}");
        }
    }

    #[test]
    fn solid_image_has_no_edges() {
        let cfg = DescriptorConfig::default();
        let v = compute_descriptor(&solid(32, 32, [10, 200, 10]), &cfg).unwrap();
        let edges = &v[192..320];
        assert!(edges.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn flat_black_image_is_not_degenerate() {
        // No layout or edge signal; the colour histogram still has mass.
        let cfg = DescriptorConfig::default();
        let v = compute_descriptor(&solid(16, 16, [0, 0, 0]), &cfg).unwrap();
        assert!((l2_norm(&v) - 1.0).abs() < 1e-5);
        assert!(color_histogram(&solid(16, 16, [0, 0, 0]).to_rgb8(), cfg.color_bins)
            .iter()
            .any(|&x| x > 0.0));
    }

    #[test]
    fn empty_image_rejected() {
        let cfg = DescriptorConfig::default();
        let err = compute_descriptor(&DynamicImage::new_rgb8(0, 0), &cfg).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyImage { .. }));
    }

    #[test]
    fn different_images_differ() {
        let cfg = DescriptorConfig::default();
        let a = compute_descriptor(&solid(32, 32, [200, 10, 10]), &cfg).unwrap();
        let b = compute_descriptor(&stripes(32, 32), &cfg).unwrap();
        let dot: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!(dot < 0.9, "dot = {dot}");
    }

    #[test]
    fn l2_normalize_unit() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize(&mut v);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero() {
        let mut v = vec![0.0f32, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
