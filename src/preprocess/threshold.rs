//! Binarization and binary morphology.
//!
//! Implements the thresholding stages of the preprocessing pipeline on
//! grayscale buffers: global Otsu, Gaussian-weighted adaptive thresholding,
//! and small-kernel morphological opening/closing for speckle cleanup.

use image::{GrayImage, Luma};

/// Computes the Otsu threshold for a grayscale image.
///
/// Maximizes between-class variance over the 256-bin histogram. Returns the
/// threshold value; pixels strictly above it are foreground (white).
pub fn otsu_level(img: &GrayImage) -> u8 {
    let mut histogram = [0u32; 256];
    for pixel in img.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let total = img.width() as u64 * img.height() as u64;
    if total == 0 {
        return 0;
    }

    let sum_all: u64 = histogram
        .iter()
        .enumerate()
        .map(|(v, &count)| v as u64 * count as u64)
        .sum();

    let mut sum_bg: u64 = 0;
    let mut weight_bg: u64 = 0;
    let mut best_threshold = 0u8;
    let mut best_variance = 0.0f64;

    for t in 0..256 {
        weight_bg += histogram[t] as u64;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }

        sum_bg += t as u64 * histogram[t] as u64;
        let mean_bg = sum_bg as f64 / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) as f64 / weight_fg as f64;

        let variance =
            weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg) * (mean_bg - mean_fg);
        if variance > best_variance {
            best_variance = variance;
            best_threshold = t as u8;
        }
    }

    best_threshold
}

/// Binarizes with a fixed threshold: pixels above become 255, others 0.
pub fn threshold_binary(img: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = GrayImage::new(img.width(), img.height());
    for (x, y, pixel) in img.enumerate_pixels() {
        let value = if pixel[0] > threshold { 255 } else { 0 };
        out.put_pixel(x, y, Luma([value]));
    }
    out
}

/// Binarizes using the Otsu threshold.
pub fn otsu_binarize(img: &GrayImage) -> GrayImage {
    threshold_binary(img, otsu_level(img))
}

/// Gaussian-weighted adaptive threshold.
///
/// Each pixel is compared against the weighted mean of its `window`×`window`
/// neighborhood minus constant `c`, approximating the behavior of a
/// Gaussian-kernel adaptive threshold. `window` must be odd.
pub fn adaptive_threshold(img: &GrayImage, window: u32, c: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut out = GrayImage::new(width, height);
    let radius = (window / 2) as i64;

    // Gaussian weights along one axis; the 2D kernel is separable but the
    // windows here are small enough that the direct product is fine.
    let sigma = 0.3 * ((window as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let weights: Vec<f32> = (-radius..=radius)
        .map(|d| (-(d as f32 * d as f32) / (2.0 * sigma * sigma)).exp())
        .collect();

    for y in 0..height {
        for x in 0..width {
            let mut weighted_sum = 0.0f32;
            let mut weight_total = 0.0f32;
            for dy in -radius..=radius {
                let sy = (y as i64 + dy).clamp(0, height as i64 - 1) as u32;
                let wy = weights[(dy + radius) as usize];
                for dx in -radius..=radius {
                    let sx = (x as i64 + dx).clamp(0, width as i64 - 1) as u32;
                    let w = wy * weights[(dx + radius) as usize];
                    weighted_sum += w * img.get_pixel(sx, sy)[0] as f32;
                    weight_total += w;
                }
            }
            let mean = weighted_sum / weight_total;
            let value = if (img.get_pixel(x, y)[0] as f32) > mean - c {
                255
            } else {
                0
            };
            out.put_pixel(x, y, Luma([value]));
        }
    }

    out
}

/// Combines two binary images with a pixel-wise OR.
pub fn bitwise_or(a: &GrayImage, b: &GrayImage) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let mut out = GrayImage::new(a.width(), a.height());
    for (x, y, pixel) in a.enumerate_pixels() {
        let value = pixel[0].max(b.get_pixel(x, y)[0]);
        out.put_pixel(x, y, Luma([value]));
    }
    out
}

/// Inverts a grayscale image in place-style (returns a new buffer).
pub fn invert(img: &GrayImage) -> GrayImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = 255 - pixel[0];
    }
    out
}

fn erode(img: &GrayImage, kernel: u32) -> GrayImage {
    neighborhood_extreme(img, kernel, true)
}

fn dilate(img: &GrayImage, kernel: u32) -> GrayImage {
    neighborhood_extreme(img, kernel, false)
}

/// Min (erode) or max (dilate) filter over a square `kernel`×`kernel`
/// neighborhood anchored at the top-left, matching a rectangular
/// structuring element.
fn neighborhood_extreme(img: &GrayImage, kernel: u32, take_min: bool) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut out = GrayImage::new(width, height);
    let k = kernel as i64;

    for y in 0..height {
        for x in 0..width {
            let mut extreme = if take_min { 255u8 } else { 0u8 };
            for dy in 0..k {
                let sy = (y as i64 + dy - k / 2).clamp(0, height as i64 - 1) as u32;
                for dx in 0..k {
                    let sx = (x as i64 + dx - k / 2).clamp(0, width as i64 - 1) as u32;
                    let v = img.get_pixel(sx, sy)[0];
                    extreme = if take_min { extreme.min(v) } else { extreme.max(v) };
                }
            }
            out.put_pixel(x, y, Luma([extreme]));
        }
    }

    out
}

/// Morphological closing: dilate then erode. Fills small gaps in glyphs.
pub fn morph_close(img: &GrayImage, kernel: u32) -> GrayImage {
    if kernel <= 1 {
        return img.clone();
    }
    erode(&dilate(img, kernel), kernel)
}

/// Morphological opening: erode then dilate. Removes small speckles.
pub fn morph_open(img: &GrayImage, kernel: u32) -> GrayImage {
    if kernel <= 1 {
        return img.clone();
    }
    dilate(&erode(img, kernel), kernel)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bimodal_image() -> GrayImage {
        // Left half dark (40), right half light (200)
        GrayImage::from_fn(20, 10, |x, _| if x < 10 { Luma([40]) } else { Luma([200]) })
    }

    #[test]
    fn test_otsu_separates_bimodal() {
        let img = bimodal_image();
        let level = otsu_level(&img);
        assert!(level >= 40 && level < 200, "level was {}", level);

        let binary = otsu_binarize(&img);
        assert_eq!(binary.get_pixel(0, 0)[0], 0);
        assert_eq!(binary.get_pixel(19, 0)[0], 255);
    }

    #[test]
    fn test_threshold_binary_is_two_valued() {
        let img = bimodal_image();
        let binary = threshold_binary(&img, 128);
        assert!(binary.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_invert_round_trip() {
        let img = bimodal_image();
        let back = invert(&invert(&img));
        assert_eq!(img.as_raw(), back.as_raw());
    }

    #[test]
    fn test_morph_open_removes_isolated_pixel() {
        let mut img = GrayImage::from_pixel(11, 11, Luma([0]));
        img.put_pixel(5, 5, Luma([255]));
        let opened = morph_open(&img, 2);
        assert_eq!(opened.get_pixel(5, 5)[0], 0);
    }

    #[test]
    fn test_morph_close_fills_small_gap() {
        // Solid white block with a one-pixel hole
        let mut img = GrayImage::from_pixel(11, 11, Luma([255]));
        img.put_pixel(5, 5, Luma([0]));
        let closed = morph_close(&img, 2);
        assert_eq!(closed.get_pixel(5, 5)[0], 255);
    }

    #[test]
    fn test_adaptive_threshold_uniform_image_is_foreground() {
        // On a flat image every pixel sits exactly at the local mean, so the
        // -c offset pushes everything to foreground.
        let img = GrayImage::from_pixel(16, 16, Luma([120]));
        let out = adaptive_threshold(&img, 11, 2.0);
        assert!(out.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_bitwise_or() {
        let a = GrayImage::from_fn(4, 1, |x, _| Luma([if x < 2 { 255 } else { 0 }]));
        let b = GrayImage::from_fn(4, 1, |x, _| Luma([if x % 2 == 0 { 255 } else { 0 }]));
        let or = bitwise_or(&a, &b);
        assert_eq!(
            or.as_raw(),
            &vec![255, 255, 255, 0]
        );
    }
}
