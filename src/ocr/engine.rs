//! Tesseract subprocess driver.
//!
//! Writes the candidate image to a temp file, runs tesseract with TSV output,
//! and reassembles the word rows into text lines with a mean confidence.

use anyhow::{Result, anyhow};
use image::GrayImage;
use std::process::Command;
use tempfile::NamedTempFile;

use super::setup::{find_tessdata_dir, find_tesseract_executable};

/// Characters allowed during the restricted retry passes. Covers question
/// text, option markers, and the hex/unit values that must survive verbatim.
pub const RETRY_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789.,;:!?()[]{}/\\-_'\"%+=<> ";

/// One tesseract invocation's parameters.
#[derive(Clone, Debug)]
pub struct TessParams {
    pub psm: u8,
    pub oem: u8,
    pub language: String,
    /// Maps to `tessedit_do_invert`; dark-mode variants are tried both ways
    pub allow_inversion: bool,
    /// Restricts recognized characters; used by the retry passes
    pub char_whitelist: Option<String>,
    /// Enables `textord_heavy_nr` and a lower `textord_min_linesize` for
    /// images where layout analysis keeps failing
    pub heavy_noise_removal: bool,
}

impl TessParams {
    pub fn new(psm: u8, oem: u8, language: &str) -> Self {
        Self {
            psm,
            oem,
            language: language.to_string(),
            allow_inversion: false,
            char_whitelist: None,
            heavy_noise_removal: false,
        }
    }
}

/// Recognized text plus the mean word confidence.
#[derive(Clone, Debug, Default)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f32,
}

/// Runs Tesseract on a preprocessed grayscale image.
pub fn recognize(img: &GrayImage, params: &TessParams) -> Result<OcrOutput> {
    let tesseract_exe = find_tesseract_executable()?;

    // Save image to temporary file
    let temp_input = NamedTempFile::with_suffix(".png")?;
    img.save(temp_input.path())?;

    // Tesseract appends .tsv to the output base
    let temp_output = NamedTempFile::new()?;
    let output_base = temp_output.path().to_string_lossy().to_string();

    let mut command = Command::new(&tesseract_exe);
    command
        .arg(temp_input.path())
        .arg(&output_base)
        .arg("--oem")
        .arg(params.oem.to_string())
        .arg("--psm")
        .arg(params.psm.to_string())
        .arg("-l")
        .arg(&params.language)
        .arg("-c")
        .arg("preserve_interword_spaces=1")
        .arg("-c")
        .arg(format!(
            "tessedit_do_invert={}",
            if params.allow_inversion { 1 } else { 0 }
        ));

    if let Some(tessdata) = find_tessdata_dir() {
        command.arg("--tessdata-dir").arg(tessdata);
    }
    if let Some(whitelist) = &params.char_whitelist {
        command
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={}", whitelist));
    }
    if params.heavy_noise_removal {
        command
            .arg("-c")
            .arg("textord_heavy_nr=1")
            .arg("-c")
            .arg("textord_min_linesize=2");
    }
    command.arg("tsv");

    let output = command.output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("Tesseract failed: {}", stderr));
    }

    let tsv_path = format!("{}.tsv", output_base);
    let tsv_content = std::fs::read_to_string(&tsv_path)
        .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
    let _ = std::fs::remove_file(&tsv_path);

    Ok(parse_tsv(&tsv_content))
}

/// Reassembles TSV word rows into line-broken text with a mean confidence.
///
/// Only level-5 (word) rows count. Rows with confidence -1 contribute no
/// confidence. If words were read but none carried a confidence, a neutral
/// 50 is reported; with no words at all the confidence is 0.
fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut lines: Vec<String> = Vec::new();
    let mut current_key: Option<(i32, i32, i32)> = None;
    let mut current_words: Vec<String> = Vec::new();
    let mut conf_sum = 0.0f32;
    let mut conf_count = 0usize;

    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }
        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }

        let key = (
            fields[2].parse().unwrap_or(-1),
            fields[3].parse().unwrap_or(-1),
            fields[4].parse().unwrap_or(-1),
        );
        if current_key.is_some() && current_key != Some(key) {
            lines.push(current_words.join(" "));
            current_words.clear();
        }
        current_key = Some(key);
        current_words.push(text.to_string());

        let conf: f32 = fields[10].parse().unwrap_or(-1.0);
        if conf >= 0.0 {
            conf_sum += conf;
            conf_count += 1;
        }
    }
    if !current_words.is_empty() {
        lines.push(current_words.join(" "));
    }

    let text = lines.join("\n");
    let confidence = if conf_count > 0 {
        conf_sum / conf_count as f32
    } else if !text.is_empty() {
        50.0
    } else {
        0.0
    };

    OcrOutput { text, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word_row(block: i32, par: i32, line: i32, word: i32, conf: f32, text: &str) -> String {
        format!("5\t1\t{block}\t{par}\t{line}\t{word}\t0\t0\t10\t10\t{conf}\t{text}")
    }

    #[test]
    fn test_parse_tsv_groups_lines() {
        let tsv = [
            HEADER.to_string(),
            "4\t1\t1\t1\t1\t0\t0\t0\t10\t10\t-1\t".to_string(),
            word_row(1, 1, 1, 1, 90.0, "Question"),
            word_row(1, 1, 1, 2, 80.0, "1:"),
            word_row(1, 1, 2, 1, 70.0, "What"),
        ]
        .join("\n");

        let out = parse_tsv(&tsv);
        assert_eq!(out.text, "Question 1:\nWhat");
        assert!((out.confidence - 80.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_tsv_skips_empty_words_and_non_word_rows() {
        let tsv = [
            HEADER.to_string(),
            word_row(1, 1, 1, 1, -1.0, "  "),
            word_row(1, 1, 1, 2, 95.0, "A."),
        ]
        .join("\n");

        let out = parse_tsv(&tsv);
        assert_eq!(out.text, "A.");
        assert_eq!(out.confidence, 95.0);
    }

    #[test]
    fn test_parse_tsv_empty_input() {
        let out = parse_tsv(HEADER);
        assert!(out.text.is_empty());
        assert_eq!(out.confidence, 0.0);
    }

    #[test]
    fn test_parse_tsv_neutral_confidence_when_unscored() {
        let tsv = [HEADER.to_string(), word_row(1, 1, 1, 1, -1.0, "word")].join("\n");
        let out = parse_tsv(&tsv);
        assert_eq!(out.text, "word");
        assert_eq!(out.confidence, 50.0);
    }
}
