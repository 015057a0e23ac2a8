//! OCR attempt orchestration.
//!
//! Races the preprocessed image variants through Tesseract, keeps the best
//! attempt, and falls back through alternate page segmentation modes and a
//! raw-threshold direct pass before giving up.

use anyhow::Result;
use image::DynamicImage;
use log::{debug, warn};

use super::engine::{self, OcrOutput, RETRY_WHITELIST, TessParams};
use super::setup;
use crate::preprocess::{self, EnhancementLevel, ImageVariant, threshold};

/// Page segmentation modes tried when the primary pass reads nothing.
const ALT_PSM_MODES: [u8; 6] = [3, 4, 6, 11, 1, 7];

/// Raw grayscale thresholds for the last-resort direct pass.
const DIRECT_THRESHOLDS: [u8; 2] = [200, 150];

/// Shown instead of text when every attempt came back empty.
pub const NO_TEXT_MESSAGE: &str = "No text detected in the image.\n\n\
Troubleshooting tips:\n\
1. Try the 'Super' enhancement level\n\
2. Check if the image contains actual text...\n\
3. Try a different image format (PNG, JPEG)\n\
4. Ensure Tesseract is properly installed and configured";

/// One scored recognition attempt.
#[derive(Clone, Debug)]
struct Attempt {
    text: String,
    confidence: f32,
    strategy: String,
    psm: u8,
}

/// Final result of the extraction cascade.
#[derive(Clone, Debug)]
pub struct ExtractionOutcome {
    /// Recognized text, or [`NO_TEXT_MESSAGE`] when nothing was read
    pub text: String,
    pub confidence: f32,
    /// Label of the winning preprocessing strategy
    pub strategy: String,
    pub psm: u8,
    pub success: bool,
}

impl ExtractionOutcome {
    /// Settings line appended to displayed results.
    pub fn annotation(&self) -> String {
        format!(
            "[Settings: {}, PSM {}, Confidence: {:.1}%]",
            self.strategy, self.psm, self.confidence
        )
    }
}

/// Whether `candidate` should replace the current best attempt.
///
/// Empty text never wins. A non-empty candidate wins when there is no best
/// yet or when its confidence is strictly higher, so ties keep the earlier
/// attempt.
fn is_better(best: Option<&Attempt>, candidate: &Attempt) -> bool {
    if candidate.text.trim().is_empty() {
        return false;
    }
    match best {
        None => true,
        Some(b) => candidate.confidence > b.confidence,
    }
}

/// Runs one variant through the engine. Inverted-path variants are tried both
/// with and without Tesseract's own inversion; the longer text wins.
fn recognize_variant(variant: &ImageVariant, params: &TessParams) -> Result<OcrOutput> {
    let mut output = engine::recognize(&variant.image, params)?;
    if variant.inverted {
        let mut inverted_params = params.clone();
        inverted_params.allow_inversion = true;
        match engine::recognize(&variant.image, &inverted_params) {
            Ok(alt) if alt.text.len() > output.text.len() => output = alt,
            Ok(_) => {}
            Err(e) => warn!("Inverted pass failed for {}: {}", variant.label, e),
        }
    }
    Ok(output)
}

/// Runs the full extraction cascade for one image.
///
/// Pass 1 scores every preprocessing variant at the configured PSM. If
/// nothing was read, pass 2 retries the first variant with alternate PSMs,
/// a character whitelist, and heavy noise removal. Pass 3 thresholds the
/// raw grayscale directly. An all-empty cascade still returns `Ok` with
/// `success == false` and a diagnostic message as the text.
pub fn extract_text(
    image: &DynamicImage,
    level: EnhancementLevel,
    psm: u8,
    oem: u8,
    language: &str,
) -> Result<ExtractionOutcome> {
    // Surface a missing install before burning time on preprocessing
    setup::find_tesseract_executable()?;

    let variants = preprocess::prepare_variants(image, level);
    let params = TessParams::new(psm, oem, language);
    let mut best: Option<Attempt> = None;

    for variant in &variants {
        match recognize_variant(variant, &params) {
            Ok(output) => {
                debug!(
                    "{}: {} chars at {:.1}%",
                    variant.label,
                    output.text.len(),
                    output.confidence
                );
                let attempt = Attempt {
                    text: output.text,
                    confidence: output.confidence,
                    strategy: variant.label.clone(),
                    psm,
                };
                if is_better(best.as_ref(), &attempt) {
                    best = Some(attempt);
                }
            }
            Err(e) => warn!("OCR failed for {}: {}", variant.label, e),
        }
    }

    // Alternate PSM retry, aimed at the best-scoring variant so far (or the
    // first one when nothing scored). Runs always for Super, otherwise only
    // when a dark screenshot produced no text at all.
    let dark = variants.iter().any(|v| v.inverted);
    if level == EnhancementLevel::Super || (best.is_none() && dark) {
        let target = best
            .as_ref()
            .and_then(|b| variants.iter().find(|v| v.label == b.strategy))
            .or_else(|| variants.first());
        if let Some(variant) = target {
            for alt_psm in ALT_PSM_MODES.iter().filter(|&&m| m != psm) {
                let mut retry_params = TessParams::new(*alt_psm, oem, language);
                retry_params.char_whitelist = Some(RETRY_WHITELIST.to_string());
                retry_params.heavy_noise_removal = true;
                match recognize_variant(variant, &retry_params) {
                    Ok(output) => {
                        let attempt = Attempt {
                            text: output.text,
                            confidence: output.confidence,
                            strategy: format!("{}/Retry", variant.label),
                            psm: *alt_psm,
                        };
                        if is_better(best.as_ref(), &attempt) {
                            best = Some(attempt);
                        }
                    }
                    Err(e) => warn!("Retry PSM {} failed: {}", alt_psm, e),
                }
            }
        }
    }

    // Last resort: binarize the raw grayscale at fixed thresholds
    if best.is_none() {
        best = direct_extraction(image, psm, oem, language);
    }

    Ok(match best {
        Some(attempt) => ExtractionOutcome {
            text: attempt.text,
            confidence: attempt.confidence,
            strategy: attempt.strategy,
            psm: attempt.psm,
            success: true,
        },
        None => ExtractionOutcome {
            text: NO_TEXT_MESSAGE.to_string(),
            confidence: 0.0,
            strategy: level.name().to_string(),
            psm,
            success: false,
        },
    })
}

/// Thresholds the raw grayscale at fixed levels, normal and inverted, and
/// keeps the attempt with the most text.
fn direct_extraction(image: &DynamicImage, psm: u8, oem: u8, language: &str) -> Option<Attempt> {
    let gray = image.to_luma8();
    let params = TessParams::new(psm, oem, language);
    let mut best: Option<Attempt> = None;

    for level in DIRECT_THRESHOLDS {
        let binary = threshold::threshold_binary(&gray, level);
        for (image, suffix) in [(binary.clone(), ""), (threshold::invert(&binary), "-Inv")] {
            match engine::recognize(&image, &params) {
                Ok(output) => {
                    let longer = best
                        .as_ref()
                        .map(|b| output.text.len() > b.text.len())
                        .unwrap_or(!output.text.trim().is_empty());
                    if longer {
                        best = Some(Attempt {
                            text: output.text,
                            confidence: output.confidence,
                            strategy: format!("Direct/T{}{}", level, suffix),
                            psm,
                        });
                    }
                }
                Err(e) => warn!("Direct pass T{}{} failed: {}", level, suffix, e),
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(text: &str, confidence: f32) -> Attempt {
        Attempt {
            text: text.to_string(),
            confidence,
            strategy: "Test".to_string(),
            psm: 6,
        }
    }

    #[test]
    fn test_empty_text_never_wins() {
        assert!(!is_better(None, &attempt("", 99.0)));
        assert!(!is_better(None, &attempt("   \n ", 99.0)));
    }

    #[test]
    fn test_first_nonempty_attempt_wins() {
        assert!(is_better(None, &attempt("hello", 0.0)));
    }

    #[test]
    fn test_higher_confidence_replaces() {
        let best = attempt("first", 60.0);
        assert!(is_better(Some(&best), &attempt("second", 61.0)));
        assert!(!is_better(Some(&best), &attempt("second", 59.0)));
    }

    #[test]
    fn test_tie_keeps_earlier_attempt() {
        let best = attempt("first", 60.0);
        assert!(!is_better(Some(&best), &attempt("second", 60.0)));
    }

    #[test]
    fn test_annotation_format() {
        let outcome = ExtractionOutcome {
            text: "Question 1: What?".to_string(),
            confidence: 87.25,
            strategy: "Super/Heavy".to_string(),
            psm: 6,
            success: true,
        };
        assert_eq!(
            outcome.annotation(),
            "[Settings: Super/Heavy, PSM 6, Confidence: 87.2%]"
        );
    }
}
