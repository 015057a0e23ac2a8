//! Tesseract discovery.
//!
//! Locates the tesseract executable and tessdata directory: an explicit path
//! from config wins, then the system PATH, then common install locations.

use anyhow::{Result, anyhow};
use std::path::PathBuf;
use std::process::Command;

use crate::config;

/// Finds the Tesseract executable.
///
/// Order: the configured `tesseract_path` if set, then `tesseract` on PATH
/// (verified with `--version`), then well-known install directories.
pub fn find_tesseract_executable() -> Result<PathBuf> {
    let configured = &config::get_config().ocr.tesseract_path;
    if !configured.is_empty() {
        let p = PathBuf::from(configured);
        if p.exists() {
            return Ok(p);
        }
        return Err(anyhow!(
            "Configured tesseract path does not exist: {}",
            p.display()
        ));
    }

    // Check PATH
    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    // Check common paths
    let common_paths = [
        "/usr/bin/tesseract",
        "/usr/local/bin/tesseract",
        "/opt/homebrew/bin/tesseract",
        r"C:\Program Files\Tesseract-OCR\tesseract.exe",
        r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
    ];

    for path in &common_paths {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "Tesseract not found. Install Tesseract-OCR or set ocr.tesseract_path in config.json."
    ))
}

/// Finds the tessdata directory containing the configured language's
/// traineddata, or `None` to let tesseract use its built-in default.
pub fn find_tessdata_dir() -> Option<PathBuf> {
    let language = &config::get_config().ocr.language;
    let traineddata = format!("{}.traineddata", language);

    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if p.join(&traineddata).exists() {
            return Some(p);
        }
        let p = PathBuf::from(&prefix).join("tessdata");
        if p.join(&traineddata).exists() {
            return Some(p);
        }
    }

    let system_paths = [
        "/usr/share/tesseract-ocr/5/tessdata",
        "/usr/share/tesseract-ocr/4.00/tessdata",
        "/usr/share/tessdata",
        "/usr/local/share/tessdata",
        "/opt/homebrew/share/tessdata",
        r"C:\Program Files\Tesseract-OCR\tessdata",
        r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
    ];

    for path in &system_paths {
        let p = PathBuf::from(path);
        if p.join(&traineddata).exists() {
            return Some(p);
        }
    }

    None
}
