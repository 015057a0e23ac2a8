//! OCR text cleanup.
//!
//! Fixes the character confusions Tesseract reliably makes on exam
//! screenshots (zero for O in "Option", pipe for I, lowercase l for 1 in
//! list markers) and drops UI chrome lines that are not part of the
//! question.

use once_cell::sync::Lazy;
use regex::Regex;

/// Literal substring fixes applied to the whole text before line splitting.
/// The plural form is listed first so it is not half-consumed by the
/// singular one.
const REPLACEMENTS: &[(&str, &str)] = &[
    ("0ptions", "Options"),
    ("0ption", "Option"),
    ("Ouestion", "Question"),
    ("Qption", "Option"),
    ("|", "I"),
    ("(A)", "A)"),
    ("(B)", "B)"),
    ("(C)", "C)"),
    ("(D)", "D)"),
];

/// Word-level fixes for misreads that survive the character pass. Tokens
/// containing digits are never touched so hex values and units stay intact.
const WORD_FIXES: &[(&str, &str)] = &[
    ("teh", "the"),
    ("taht", "that"),
    ("wich", "which"),
    ("whith", "with"),
    ("retum", "return"),
    ("fimction", "function"),
    ("netvvork", "network"),
    ("routcr", "router"),
    ("swltch", "switch"),
];

static NOISE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(share\s+feedback|^\s*beta\s*$)").unwrap());

/// Line-start enumeration markers misread as letters: `l.` for `1.` and
/// `O.` for `0.`.
static MARKER_L: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(\s*)l([.)])").unwrap());
static MARKER_O: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(\s*)O([.)])").unwrap());

/// True for screenshot chrome that must not reach the parser.
pub fn is_noise_line(line: &str) -> bool {
    NOISE_LINE.is_match(line)
}

/// Applies the word-level fix table, preserving surrounding punctuation.
fn fix_words(line: &str) -> String {
    line.split(' ')
        .map(|token| {
            if token.chars().any(|c| c.is_ascii_digit()) {
                return token.to_string();
            }
            let core: String = token
                .chars()
                .filter(|c| c.is_ascii_alphabetic())
                .collect::<String>()
                .to_ascii_lowercase();
            for (wrong, right) in WORD_FIXES {
                if core == *wrong {
                    return token.to_lowercase().replace(wrong, right);
                }
            }
            token.to_string()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cleans raw OCR output into parse-ready lines.
///
/// Applies the substring and word fix tables, drops noise lines, and trims
/// trailing whitespace. Blank lines are removed; the parser works on line
/// boundaries, not paragraph gaps.
pub fn clean_text(raw: &str) -> Vec<String> {
    let mut text = raw.to_string();
    for (wrong, right) in REPLACEMENTS {
        text = text.replace(wrong, right);
    }
    text = MARKER_L.replace_all(&text, "${1}1${2}").into_owned();
    text = MARKER_O.replace_all(&text, "${1}0${2}").into_owned();

    text.lines()
        .map(|line| fix_words(line.trim_end()))
        .filter(|line| !line.trim().is_empty() && !is_noise_line(line))
        .collect()
}

/// Strips leading characters that are not letters or digits. Used on
/// captured option text so stray glyphs before the real content vanish.
pub fn strip_leading_junk(text: &str) -> &str {
    text.trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_confusions_fixed() {
        let lines = clean_text("Ouestion 1: What is it?\n0ption A: first\nQption B: second");
        assert_eq!(lines[0], "Question 1: What is it?");
        assert_eq!(lines[1], "Option A: first");
        assert_eq!(lines[2], "Option B: second");
    }

    #[test]
    fn test_list_markers_fixed_only_at_line_start() {
        let lines = clean_text("l. first step\nuses the OSI model.");
        assert_eq!(lines[0], "1. first step");
        assert_eq!(lines[1], "uses the OSI model.");
    }

    #[test]
    fn test_hex_and_units_survive() {
        let lines = clean_text("Set register to 0x1A2B\nLink speed is 40 Gbps");
        assert_eq!(lines[0], "Set register to 0x1A2B");
        assert_eq!(lines[1], "Link speed is 40 Gbps");
    }

    #[test]
    fn test_noise_lines_dropped() {
        let lines = clean_text("Question 2: Why?\nBeta\nShare feedback\nA. because");
        assert_eq!(lines, vec!["Question 2: Why?", "A. because"]);
    }

    #[test]
    fn test_word_fixes_skip_tokens_with_digits() {
        let lines = clean_text("teh routcr uses 0xteh");
        assert_eq!(lines[0], "the router uses 0xteh");
    }

    #[test]
    fn test_strip_leading_junk() {
        assert_eq!(strip_leading_junk("-- > option text"), "option text");
        assert_eq!(strip_leading_junk("0x1F"), "0x1F");
    }
}
