//! Option-bubble removal.
//!
//! Multiple-choice screenshots carry radio-button circles to the left of each
//! option; left in place they confuse the OCR engine into emitting stray `O`,
//! `0`, or `©` glyphs. A Hough-gradient transform detects the circles and
//! paints them over with the background color.
//!
//! Detection runs three parameter presets in sequence, loosening sensitivity
//! on each retry, and stops at the first preset that finds anything. Failure
//! is non-fatal: the caller proceeds with the unmodified image.

use image::{GrayImage, Luma};
use log::debug;

/// One detection preset: accumulator resolution divisor, minimum center
/// distance, gradient magnitude threshold, accumulator vote threshold, and
/// the radius search range.
#[derive(Clone, Copy, Debug)]
pub struct CircleParams {
    pub dp: f32,
    pub min_dist: u32,
    pub edge_threshold: f32,
    pub vote_threshold: u32,
    pub min_radius: u32,
    pub max_radius: u32,
}

/// Presets tried in order: original tuning, more sensitive, more specific.
pub const CIRCLE_PRESETS: [CircleParams; 3] = [
    CircleParams { dp: 1.0, min_dist: 20, edge_threshold: 50.0, vote_threshold: 30, min_radius: 8, max_radius: 25 },
    CircleParams { dp: 1.0, min_dist: 20, edge_threshold: 30.0, vote_threshold: 20, min_radius: 5, max_radius: 30 },
    CircleParams { dp: 1.5, min_dist: 30, edge_threshold: 100.0, vote_threshold: 25, min_radius: 10, max_radius: 20 },
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Circle {
    pub x: u32,
    pub y: u32,
    pub radius: u32,
}

/// Detects circles with a gradient-direction Hough transform.
///
/// Edge pixels vote for candidate centers along their gradient direction at
/// every radius in the preset's range; accumulator peaks above the vote
/// threshold, separated by at least `min_dist`, become detections.
pub fn detect_circles(img: &GrayImage, params: &CircleParams) -> Vec<Circle> {
    let (width, height) = img.dimensions();
    if width < 3 || height < 3 {
        return Vec::new();
    }

    let acc_w = ((width as f32 / params.dp) as usize).max(1);
    let acc_h = ((height as f32 / params.dp) as usize).max(1);
    let mut votes = vec![0u32; acc_w * acc_h];
    let mut radius_sum = vec![0u64; acc_w * acc_h];

    let get = |x: i64, y: i64| -> f32 {
        let sx = x.clamp(0, width as i64 - 1) as u32;
        let sy = y.clamp(0, height as i64 - 1) as u32;
        img.get_pixel(sx, sy)[0] as f32
    };

    for y in 1..height as i64 - 1 {
        for x in 1..width as i64 - 1 {
            // Sobel gradient
            let gx = (get(x + 1, y - 1) + 2.0 * get(x + 1, y) + get(x + 1, y + 1))
                - (get(x - 1, y - 1) + 2.0 * get(x - 1, y) + get(x - 1, y + 1));
            let gy = (get(x - 1, y + 1) + 2.0 * get(x, y + 1) + get(x + 1, y + 1))
                - (get(x - 1, y - 1) + 2.0 * get(x, y - 1) + get(x + 1, y - 1));
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude < params.edge_threshold {
                continue;
            }

            let nx = gx / magnitude;
            let ny = gy / magnitude;

            // Vote on both sides of the edge so polarity does not matter
            for radius in params.min_radius..=params.max_radius {
                for sign in [1.0f32, -1.0] {
                    let cx = x as f32 + sign * nx * radius as f32;
                    let cy = y as f32 + sign * ny * radius as f32;
                    if cx < 0.0 || cy < 0.0 {
                        continue;
                    }
                    let ax = (cx / params.dp) as usize;
                    let ay = (cy / params.dp) as usize;
                    if ax >= acc_w || ay >= acc_h {
                        continue;
                    }
                    votes[ay * acc_w + ax] += 1;
                    radius_sum[ay * acc_w + ax] += radius as u64;
                }
            }
        }
    }

    // Collect peaks, strongest first, suppressing neighbors within min_dist
    let mut candidates: Vec<(u32, usize)> = votes
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v >= params.vote_threshold)
        .map(|(i, &v)| (v, i))
        .collect();
    candidates.sort_unstable_by(|a, b| b.0.cmp(&a.0));

    let min_dist_sq = (params.min_dist as i64).pow(2);
    let mut circles: Vec<Circle> = Vec::new();
    for (vote, idx) in candidates {
        let cx = ((idx % acc_w) as f32 * params.dp) as i64;
        let cy = ((idx / acc_w) as f32 * params.dp) as i64;
        let too_close = circles.iter().any(|c| {
            let dx = c.x as i64 - cx;
            let dy = c.y as i64 - cy;
            dx * dx + dy * dy < min_dist_sq
        });
        if too_close {
            continue;
        }
        let radius = (radius_sum[idx] / vote as u64) as u32;
        circles.push(Circle { x: cx as u32, y: cy as u32, radius });
    }

    circles
}

/// Paints a filled disc of `fill` over each detected circle, with a 2px
/// margin so dark circle borders are covered too.
pub fn erase_circles(img: &mut GrayImage, circles: &[Circle], fill: u8) {
    let (width, height) = img.dimensions();
    for circle in circles {
        let r = (circle.radius + 2) as i64;
        let cx = circle.x as i64;
        let cy = circle.y as i64;
        for dy in -r..=r {
            let y = cy + dy;
            if y < 0 || y >= height as i64 {
                continue;
            }
            for dx in -r..=r {
                let x = cx + dx;
                if x < 0 || x >= width as i64 {
                    continue;
                }
                if dx * dx + dy * dy <= r * r {
                    img.put_pixel(x as u32, y as u32, Luma([fill]));
                }
            }
        }
    }
}

/// Attempts bubble removal with each preset in turn, stopping at the first
/// preset that yields detections. Returns the cleaned image, or `None` when
/// no preset found circles (caller keeps the original).
pub fn remove_bubbles(img: &GrayImage) -> Option<GrayImage> {
    for (i, params) in CIRCLE_PRESETS.iter().enumerate() {
        let circles = detect_circles(img, params);
        if !circles.is_empty() {
            debug!("Bubble removal: preset {} found {} circles", i, circles.len());
            let mut cleaned = img.clone();
            erase_circles(&mut cleaned, &circles, 255);
            return Some(cleaned);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Draws a dark circle outline on a light background.
    fn circle_image(cx: i64, cy: i64, radius: i64) -> GrayImage {
        GrayImage::from_fn(100, 100, |x, y| {
            let dx = x as i64 - cx;
            let dy = y as i64 - cy;
            let d2 = dx * dx + dy * dy;
            let inner = (radius - 1) * (radius - 1);
            let outer = (radius + 1) * (radius + 1);
            if d2 >= inner && d2 <= outer {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn test_detects_synthetic_circle() {
        let img = circle_image(50, 50, 12);
        let circles = detect_circles(&img, &CIRCLE_PRESETS[0]);
        assert!(!circles.is_empty(), "no circles detected");
        let best = circles[0];
        assert!((best.x as i64 - 50).abs() <= 3, "center x off: {}", best.x);
        assert!((best.y as i64 - 50).abs() <= 3, "center y off: {}", best.y);
        assert!((best.radius as i64 - 12).abs() <= 3, "radius off: {}", best.radius);
    }

    #[test]
    fn test_erase_paints_background() {
        let img = circle_image(50, 50, 12);
        let before = img.pixels().filter(|p| p[0] == 0).count();
        let cleaned = remove_bubbles(&img).expect("expected a detection");
        let after = cleaned.pixels().filter(|p| p[0] == 0).count();
        assert!(
            after < before / 2,
            "most of the outline should be painted over ({} -> {})",
            before,
            after
        );
    }

    #[test]
    fn test_blank_image_finds_nothing() {
        let img = GrayImage::from_pixel(60, 60, Luma([255]));
        assert!(remove_bubbles(&img).is_none());
    }
}
