//! Question parsing.
//!
//! Turns raw OCR output into a structured question: `cleanup` normalizes the
//! text, `question` locates the question span, and `options` segments the
//! A-D answers.

pub mod cleanup;
pub mod options;
pub mod question;

pub use options::{LETTERS, NOT_DETECTED, OptionSlot};

/// A parsed question with its four answer slots.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedQuestion {
    pub question: String,
    pub options: [OptionSlot; 4],
}

impl ParsedQuestion {
    /// True when a question was found and every option slot has text.
    pub fn is_complete(&self) -> bool {
        !self.question.is_empty() && self.options.iter().all(|o| o.is_detected())
    }

    /// Human-readable block used in results files and the CLI. Its shape is
    /// itself parseable, so a displayed question survives a re-parse.
    pub fn format_display(&self) -> String {
        let mut out = format!("Question: {}\n", self.question);
        for (letter, option) in LETTERS.iter().zip(&self.options) {
            out.push_str(&format!("\nOption {}: {}", letter, option.display_text()));
        }
        out
    }
}

/// Parses raw OCR text into a question and options.
pub fn parse_extracted_text(raw: &str) -> ParsedQuestion {
    let lines = cleanup::clean_text(raw);
    let span = question::extract_question(&lines);
    let options = options::extract_options(&lines, span.end_line);
    ParsedQuestion {
        question: span.text,
        options,
    }
}
