//! Text extraction from screenshots.
//!
//! `setup` locates the Tesseract install, `engine` drives one subprocess
//! invocation, and `orchestrator` runs the multi-variant attempt cascade.

pub mod engine;
pub mod orchestrator;
pub mod setup;

use anyhow::{Context, Result};
use std::path::Path;

pub use orchestrator::{ExtractionOutcome, NO_TEXT_MESSAGE, extract_text};

use crate::preprocess::EnhancementLevel;

/// Loads an image file and runs the extraction cascade with the given
/// settings.
pub fn extract_from_path(
    path: &Path,
    level: EnhancementLevel,
    psm: u8,
    oem: u8,
    language: &str,
) -> Result<ExtractionOutcome> {
    let image = image::open(path)
        .with_context(|| format!("Failed to open image {}", path.display()))?;
    extract_text(&image, level, psm, oem, language)
}
