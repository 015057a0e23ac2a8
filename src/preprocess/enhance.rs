//! Contrast and noise enhancement stages.
//!
//! CLAHE (contrast-limited adaptive histogram equalization), non-local-means
//! denoising, cubic upscaling, and border padding. These run between grayscale
//! conversion and binarization in every pipeline level.

use image::imageops::FilterType;
use image::{GrayImage, Luma};

/// Contrast Limited Adaptive Histogram Equalization.
///
/// Divides the image into `tile_size`×`tile_size` tiles, computes a clipped
/// histogram CDF per tile, and bilinearly interpolates the per-tile transfer
/// functions when mapping each pixel. `clip_limit` bounds local contrast
/// amplification (typical range 1.5-2.5 for OCR input).
pub fn clahe(img: &GrayImage, clip_limit: f32, tile_size: u32) -> GrayImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 || tile_size == 0 {
        return img.clone();
    }

    let tiles_x = width.div_ceil(tile_size) as usize;
    let tiles_y = height.div_ceil(tile_size) as usize;

    let mut tile_cdfs = vec![vec![[0.0f32; 256]; tiles_x]; tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx as u32 * tile_size;
            let y0 = ty as u32 * tile_size;
            let x1 = (x0 + tile_size).min(width);
            let y1 = (y0 + tile_size).min(height);
            tile_cdfs[ty][tx] = tile_cdf(img, x0, y0, x1, y1, clip_limit);
        }
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let value = img.get_pixel(x, y)[0] as usize;

            let fx = x as f32 / tile_size as f32;
            let fy = y as f32 / tile_size as f32;
            let tx = (fx.floor() as usize).min(tiles_x - 1);
            let ty = (fy.floor() as usize).min(tiles_y - 1);
            let x_ratio = fx - tx as f32;
            let y_ratio = fy - ty as f32;

            let mapped = if tx + 1 < tiles_x && ty + 1 < tiles_y {
                let v00 = tile_cdfs[ty][tx][value];
                let v10 = tile_cdfs[ty][tx + 1][value];
                let v01 = tile_cdfs[ty + 1][tx][value];
                let v11 = tile_cdfs[ty + 1][tx + 1][value];
                let v0 = v00 * (1.0 - x_ratio) + v10 * x_ratio;
                let v1 = v01 * (1.0 - x_ratio) + v11 * x_ratio;
                v0 * (1.0 - y_ratio) + v1 * y_ratio
            } else if tx + 1 < tiles_x {
                let v0 = tile_cdfs[ty][tx][value];
                let v1 = tile_cdfs[ty][tx + 1][value];
                v0 * (1.0 - x_ratio) + v1 * x_ratio
            } else if ty + 1 < tiles_y {
                let v0 = tile_cdfs[ty][tx][value];
                let v1 = tile_cdfs[ty + 1][tx][value];
                v0 * (1.0 - y_ratio) + v1 * y_ratio
            } else {
                tile_cdfs[ty][tx][value]
            };

            out.put_pixel(x, y, Luma([(mapped * 255.0).round().clamp(0.0, 255.0) as u8]));
        }
    }

    out
}

/// Clipped histogram CDF for one tile. Excess counts above the clip limit are
/// redistributed uniformly before the cumulative sum.
fn tile_cdf(img: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [f32; 256] {
    let mut histogram = [0u32; 256];
    let mut count = 0u32;
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[img.get_pixel(x, y)[0] as usize] += 1;
            count += 1;
        }
    }

    let mut cdf = [0.0f32; 256];
    if count == 0 {
        return cdf;
    }

    let clip = ((clip_limit * count as f32 / 256.0).max(1.0)) as u32;
    let mut clipped_total = 0u32;
    for bin in histogram.iter_mut() {
        if *bin > clip {
            clipped_total += *bin - clip;
            *bin = clip;
        }
    }
    let redistribute = clipped_total / 256;
    let remainder = (clipped_total % 256) as usize;
    for (i, bin) in histogram.iter_mut().enumerate() {
        *bin += redistribute;
        if i < remainder {
            *bin += 1;
        }
    }

    let mut cumsum = 0u32;
    for i in 0..256 {
        cumsum += histogram[i];
        cdf[i] = cumsum as f32 / count as f32;
    }
    cdf
}

/// Edge-preserving denoise in the style of non-local means.
///
/// For each pixel, averages same-size patches within a search window,
/// weighting each candidate patch by its squared difference to the reference
/// patch with filter strength `h`. Uses a 5×5 patch and 11×11 search window;
/// strength 10 matches the pipeline's fixed setting.
pub fn nl_means_denoise(img: &GrayImage, h: f32) -> GrayImage {
    const PATCH_RADIUS: i64 = 2;
    const SEARCH_RADIUS: i64 = 5;

    let (width, height) = img.dimensions();
    let mut out = GrayImage::new(width, height);
    let h2 = h * h;

    let sample = |x: i64, y: i64| -> f32 {
        let sx = x.clamp(0, width as i64 - 1) as u32;
        let sy = y.clamp(0, height as i64 - 1) as u32;
        img.get_pixel(sx, sy)[0] as f32
    };

    let patch_distance = |ax: i64, ay: i64, bx: i64, by: i64| -> f32 {
        let mut sum = 0.0f32;
        for dy in -PATCH_RADIUS..=PATCH_RADIUS {
            for dx in -PATCH_RADIUS..=PATCH_RADIUS {
                let diff = sample(ax + dx, ay + dy) - sample(bx + dx, by + dy);
                sum += diff * diff;
            }
        }
        let n = ((2 * PATCH_RADIUS + 1) * (2 * PATCH_RADIUS + 1)) as f32;
        sum / n
    };

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut weight_sum = 0.0f32;
            let mut value_sum = 0.0f32;
            for sy in -SEARCH_RADIUS..=SEARCH_RADIUS {
                for sx in -SEARCH_RADIUS..=SEARCH_RADIUS {
                    let dist = patch_distance(x, y, x + sx, y + sy);
                    let weight = (-dist / h2).exp();
                    weight_sum += weight;
                    value_sum += weight * sample(x + sx, y + sy);
                }
            }
            let value = (value_sum / weight_sum).round().clamp(0.0, 255.0) as u8;
            out.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }

    out
}

/// Small-kernel Gaussian blur used before Otsu in the heavy pipeline.
pub fn gaussian_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    image::imageops::blur(img, sigma)
}

/// Upscales small images with cubic interpolation.
///
/// Scales so the longest dimension approaches `target_max_dim`, capped at
/// `max_scale`. Never downscales: if the image is already at or above the
/// target, it is returned unchanged.
pub fn upscale_if_small(img: &GrayImage, target_max_dim: u32, max_scale: f32) -> GrayImage {
    let longest = img.width().max(img.height());
    if longest == 0 {
        return img.clone();
    }
    let scale = (target_max_dim as f32 / longest as f32).min(max_scale);
    if scale <= 1.0 {
        return img.clone();
    }
    let new_w = (img.width() as f32 * scale) as u32;
    let new_h = (img.height() as f32 * scale) as u32;
    image::imageops::resize(img, new_w, new_h, FilterType::CatmullRom)
}

/// Pads the image with a uniform border so glyphs touching the edge are not
/// truncated by the OCR engine's layout analysis.
pub fn pad_border(img: &GrayImage, border: u32, fill: u8) -> GrayImage {
    let mut out = GrayImage::from_pixel(
        img.width() + border * 2,
        img.height() + border * 2,
        Luma([fill]),
    );
    image::imageops::overlay(&mut out, img, border as i64, border as i64);
    out
}

/// Mean pixel intensity, used for dark-background detection.
pub fn mean_intensity(img: &GrayImage) -> f32 {
    let total: u64 = img.pixels().map(|p| p[0] as u64).sum();
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return 0.0;
    }
    total as f32 / count as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upscale_never_downscales() {
        let img = GrayImage::new(4000, 100);
        let out = upscale_if_small(&img, 3000, 2.0);
        assert_eq!(out.dimensions(), (4000, 100));
    }

    #[test]
    fn test_upscale_respects_cap() {
        let img = GrayImage::new(100, 50);
        let out = upscale_if_small(&img, 3500, 4.0);
        // 3500/100 = 35x would exceed the 4x cap
        assert_eq!(out.dimensions(), (400, 200));
    }

    #[test]
    fn test_upscale_targets_max_dim() {
        let img = GrayImage::new(2000, 1000);
        let out = upscale_if_small(&img, 3000, 4.0);
        assert_eq!(out.dimensions(), (3000, 1500));
    }

    #[test]
    fn test_pad_border_dimensions_and_fill() {
        let img = GrayImage::from_pixel(5, 5, Luma([0]));
        let out = pad_border(&img, 10, 255);
        assert_eq!(out.dimensions(), (25, 25));
        assert_eq!(out.get_pixel(0, 0)[0], 255);
        assert_eq!(out.get_pixel(12, 12)[0], 0);
    }

    #[test]
    fn test_mean_intensity() {
        let img = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 0 } else { 200 }]));
        assert_eq!(mean_intensity(&img), 100.0);
    }

    #[test]
    fn test_clahe_preserves_dimensions_and_range() {
        let img = GrayImage::from_fn(64, 48, |x, y| Luma([((x + y) % 256) as u8]));
        let out = clahe(&img, 2.0, 8);
        assert_eq!(out.dimensions(), img.dimensions());
    }

    #[test]
    fn test_clahe_flat_image_stays_flat() {
        // A constant image has no contrast to stretch; the output must not
        // introduce structure.
        let img = GrayImage::from_pixel(32, 32, Luma([128]));
        let out = clahe(&img, 2.0, 8);
        let first = out.get_pixel(0, 0)[0];
        assert!(out.pixels().all(|p| p[0] == first));
    }

    #[test]
    fn test_nl_means_smooths_mild_noise() {
        let mut img = GrayImage::from_pixel(16, 16, Luma([100]));
        img.put_pixel(8, 8, Luma([130]));
        let out = nl_means_denoise(&img, 10.0);
        let center = out.get_pixel(8, 8)[0];
        assert!(center < 130, "noise should be attenuated, got {}", center);
        assert!(center >= 100);
    }
}
