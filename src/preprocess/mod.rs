//! Image preprocessing pipeline.
//!
//! Turns a raw screenshot into one or more OCR-ready binary images. Each
//! enhancement level trades speed against robustness: `Light` is a plain Otsu
//! binarization, `Heavy` adds denoising and morphology, and `Super` produces
//! a whole set of candidate variants that the OCR orchestrator races against
//! each other.

pub mod circles;
pub mod enhance;
pub mod threshold;

use image::{DynamicImage, GrayImage};
use log::debug;

/// How aggressively to enhance before binarization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnhancementLevel {
    /// Grayscale conversion only, no binarization
    None,
    /// Global Otsu threshold
    Light,
    /// Adaptive threshold tuned for clean screenshots
    Medium,
    /// Blur, Otsu, and open/close morphology for noisy captures
    Heavy,
    /// Adaptive threshold merged with Otsu, for uneven lighting
    Adaptive,
    /// Multi-variant: emits Medium, Heavy, and Adaptive candidates plus
    /// dark-mode variants when the screenshot looks inverted
    Super,
}

impl EnhancementLevel {
    /// Parses a level name case-insensitively. Unknown names map to `Super`
    /// so a typo in config degrades to the most thorough option.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "none" => Self::None,
            "light" => Self::Light,
            "medium" => Self::Medium,
            "heavy" => Self::Heavy,
            "adaptive" => Self::Adaptive,
            _ => Self::Super,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Light => "Light",
            Self::Medium => "Medium",
            Self::Heavy => "Heavy",
            Self::Adaptive => "Adaptive",
            Self::Super => "Super",
        }
    }
}

/// Tuning knobs that vary by level.
#[derive(Clone, Copy, Debug)]
pub struct PreprocessSettings {
    /// CLAHE contrast clip limit
    pub clahe_clip: f32,
    /// Upscale target for the longest dimension
    pub target_max_dim: u32,
    /// Upscale factor cap
    pub max_scale: f32,
    /// Mean intensity below which the grayscale input is inverted before
    /// enhancement
    pub dark_invert_threshold: u8,
    /// White border width added after binarization
    pub border: u32,
}

impl PreprocessSettings {
    /// Per-level defaults. `Heavy` gets a stronger contrast stretch, a larger
    /// upscale budget, and a lower invert threshold than the other levels.
    pub fn for_level(level: EnhancementLevel) -> Self {
        match level {
            EnhancementLevel::Heavy => Self {
                clahe_clip: 2.5,
                target_max_dim: 3500,
                max_scale: 4.0,
                dark_invert_threshold: 110,
                border: 10,
            },
            _ => Self {
                clahe_clip: 1.5,
                target_max_dim: 3000,
                max_scale: 2.0,
                dark_invert_threshold: 128,
                border: 10,
            },
        }
    }
}

/// One OCR-ready candidate image with the strategy name that produced it.
#[derive(Clone)]
pub struct ImageVariant {
    /// Strategy label reported in the result annotation
    pub label: String,
    pub image: GrayImage,
    /// True when the variant came from an inverted (dark-mode) path; the OCR
    /// engine then also tries its own inversion pass
    pub inverted: bool,
}

/// Heuristic for dark-mode screenshots: mostly dark pixels, a dark mean, and
/// at least a sliver of bright pixels (the text).
pub fn is_dark_screenshot(img: &GrayImage) -> bool {
    let total = img.width() as u64 * img.height() as u64;
    if total == 0 {
        return false;
    }
    let mut dark = 0u64;
    let mut bright = 0u64;
    for pixel in img.pixels() {
        let v = pixel[0];
        if v < 50 {
            dark += 1;
        } else if v > 200 {
            bright += 1;
        }
    }
    enhance::mean_intensity(img) < 128.0
        && dark as f64 / total as f64 > 0.5
        && bright as f64 / total as f64 > 0.01
}

/// Runs one enhancement level over a grayscale image.
fn enhance_single(gray: &GrayImage, level: EnhancementLevel) -> GrayImage {
    let settings = PreprocessSettings::for_level(level);

    let mut img = if enhance::mean_intensity(gray) < settings.dark_invert_threshold as f32 {
        threshold::invert(gray)
    } else {
        gray.clone()
    };

    // Bubble removal runs at native resolution, where the radius presets
    // match real radio-button sizes
    if let Some(cleaned) = circles::remove_bubbles(&img) {
        img = cleaned;
    }

    img = enhance::upscale_if_small(&img, settings.target_max_dim, settings.max_scale);
    if level != EnhancementLevel::None {
        img = enhance::nl_means_denoise(&img, 10.0);
        img = enhance::clahe(&img, settings.clahe_clip, 8);
    }

    img = match level {
        // None and Super stay grayscale: Super has no single binarization
        // of its own, its candidates are built from the concrete levels in
        // prepare_variants
        EnhancementLevel::None | EnhancementLevel::Super => img,
        EnhancementLevel::Light => threshold::otsu_binarize(&img),
        EnhancementLevel::Medium => {
            threshold::morph_close(&threshold::adaptive_threshold(&img, 11, 2.0), 1)
        }
        EnhancementLevel::Heavy => {
            let blurred = enhance::gaussian_blur(&img, 1.0);
            let binary = threshold::otsu_binarize(&blurred);
            threshold::morph_close(&threshold::morph_open(&binary, 2), 2)
        }
        EnhancementLevel::Adaptive => {
            let adaptive = threshold::adaptive_threshold(&img, 15, 8.0);
            let otsu = threshold::otsu_binarize(&img);
            threshold::morph_close(&threshold::bitwise_or(&adaptive, &otsu), 2)
        }
    };

    enhance::pad_border(&img, settings.border, 255)
}

/// Dedicated path for dark-mode screenshots: invert first, then a gentle
/// blur and adaptive threshold, with a wider border.
fn dark_pipeline(gray: &GrayImage) -> GrayImage {
    let inverted = threshold::invert(gray);
    let blurred = enhance::gaussian_blur(&inverted, 1.0);
    let binary = threshold::adaptive_threshold(&blurred, 11, 2.0);
    let closed = threshold::morph_close(&binary, 2);
    enhance::pad_border(&closed, 20, 255)
}

/// Produces the candidate images for an enhancement level.
///
/// `Super` yields Medium, Heavy, and Adaptive candidates; other levels yield
/// one. `Super` always, and any level whose input looks dark, additionally
/// gets the dark-mode pipeline, an inverted Heavy pass, and the raw
/// grayscale as a last resort.
pub fn prepare_variants(input: &DynamicImage, level: EnhancementLevel) -> Vec<ImageVariant> {
    let gray = input.to_luma8();
    let dark = is_dark_screenshot(&gray);
    debug!(
        "Preprocessing {}x{} image, level {}, dark={}",
        gray.width(),
        gray.height(),
        level.name(),
        dark
    );

    let mut variants = Vec::new();

    match level {
        EnhancementLevel::Super => {
            for sub in [
                EnhancementLevel::Medium,
                EnhancementLevel::Heavy,
                EnhancementLevel::Adaptive,
            ] {
                variants.push(ImageVariant {
                    label: format!("Super/{}", sub.name()),
                    image: enhance_single(&gray, sub),
                    inverted: false,
                });
            }
        }
        _ => {
            variants.push(ImageVariant {
                label: level.name().to_string(),
                image: enhance_single(&gray, level),
                inverted: false,
            });
        }
    }

    // Super always carries the inverted candidates; other levels gain them
    // when the screenshot looks dark
    if level == EnhancementLevel::Super || dark {
        let prefix = level.name();
        variants.push(ImageVariant {
            label: format!("{}/DarkMode", prefix),
            image: dark_pipeline(&gray),
            inverted: true,
        });
        variants.push(ImageVariant {
            label: format!("{}/InvertedHeavy", prefix),
            image: enhance_single(&threshold::invert(&gray), EnhancementLevel::Heavy),
            inverted: true,
        });
        variants.push(ImageVariant {
            label: format!("{}/Direct", prefix),
            image: enhance::pad_border(&gray, 10, 255),
            inverted: true,
        });
    }

    variants
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn light_image() -> GrayImage {
        GrayImage::from_fn(60, 40, |x, y| {
            if (x / 10 + y / 10) % 2 == 0 {
                Luma([30])
            } else {
                Luma([220])
            }
        })
    }

    fn dark_image() -> GrayImage {
        // Mostly near-black with a bright text-like band
        GrayImage::from_fn(60, 60, |_, y| if y < 2 { Luma([230]) } else { Luma([20]) })
    }

    #[test]
    fn test_from_name_is_case_insensitive() {
        assert_eq!(EnhancementLevel::from_name("heavy"), EnhancementLevel::Heavy);
        assert_eq!(EnhancementLevel::from_name("LIGHT"), EnhancementLevel::Light);
        assert_eq!(EnhancementLevel::from_name("unknown"), EnhancementLevel::Super);
    }

    #[test]
    fn test_is_dark_screenshot() {
        assert!(is_dark_screenshot(&dark_image()));
        assert!(!is_dark_screenshot(&light_image()));
    }

    #[test]
    fn test_output_never_smaller_than_input() {
        let input = DynamicImage::ImageLuma8(light_image());
        for level in [
            EnhancementLevel::None,
            EnhancementLevel::Light,
            EnhancementLevel::Medium,
            EnhancementLevel::Adaptive,
        ] {
            for variant in prepare_variants(&input, level) {
                assert!(variant.image.width() >= 60, "{} shrank width", variant.label);
                assert!(variant.image.height() >= 40, "{} shrank height", variant.label);
            }
        }
    }

    #[test]
    fn test_super_always_includes_inverted_candidates() {
        let input = DynamicImage::ImageLuma8(light_image());
        let variants = prepare_variants(&input, EnhancementLevel::Super);
        assert_eq!(variants.len(), 6);
        let labels: Vec<&str> = variants.iter().map(|v| v.label.as_str()).collect();
        assert!(labels.contains(&"Super/DarkMode"));
        assert!(labels.contains(&"Super/InvertedHeavy"));
        assert!(labels.contains(&"Super/Direct"));
        assert!(variants.iter().any(|v| v.inverted));
    }

    #[test]
    fn test_dark_screenshot_gains_inverted_variants_at_any_level() {
        let input = DynamicImage::ImageLuma8(dark_image());
        let variants = prepare_variants(&input, EnhancementLevel::Super);
        assert_eq!(variants.len(), 6);
        assert!(variants.iter().any(|v| v.inverted));

        let light_variants = prepare_variants(&input, EnhancementLevel::Light);
        assert_eq!(light_variants.len(), 4);
        let labels: Vec<&str> = light_variants.iter().map(|v| v.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Light", "Light/DarkMode", "Light/InvertedHeavy", "Light/Direct"]
        );
        assert!(light_variants[1..].iter().all(|v| v.inverted));
    }

    #[test]
    fn test_binarized_levels_are_two_valued() {
        let input = DynamicImage::ImageLuma8(light_image());
        let variants = prepare_variants(&input, EnhancementLevel::Light);
        assert!(variants[0].image.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }
}
