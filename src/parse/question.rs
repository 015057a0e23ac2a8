//! Question text detection.
//!
//! Finds the question inside cleaned OCR lines. The cascade tries, in order,
//! an explicit `Question N:` prefix, a line starting with a known question
//! opener, everything before the first option marker, and finally the first
//! line as a last resort.

use once_cell::sync::Lazy;
use regex::Regex;

use super::options::is_option_start;

/// `Question 12:` with optional stray bracket glyphs in front and an
/// optional number. The capture holds whatever follows the colon.
static QUESTION_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*[\[({]?\s*question\s*\d*\s*:(.*)$").unwrap());

/// Lines that start like a question even without an explicit prefix.
static IMPLICIT_OPENER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(which|what|how|why|when|where|is|are|if|using|initially|a router|an lsp)\b",
    )
    .unwrap()
});

/// `Option A:` glued to the front of a question line by a layout misread.
static OPTION_A_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*option\s*a\s*[.:]\s*").unwrap());

/// The detected question and the index of the first line after it.
#[derive(Debug, PartialEq)]
pub struct QuestionSpan {
    pub text: String,
    pub end_line: usize,
}

fn finish(mut parts: Vec<String>, end_line: usize) -> QuestionSpan {
    parts.retain(|p| !p.is_empty());
    let mut text = parts.join(" ").trim().to_string();
    if !text.is_empty() && !text.ends_with('?') {
        text.push('?');
    }
    QuestionSpan { text, end_line }
}

/// Consumes lines into `parts` until an option marker, returning the index
/// of the first line not consumed.
fn assemble(lines: &[String], mut next: usize, parts: &mut Vec<String>) -> usize {
    while next < lines.len() && !is_option_start(&lines[next]) {
        parts.push(lines[next].trim().to_string());
        next += 1;
    }
    next
}

/// Runs the detection cascade over cleaned lines.
pub fn extract_question(lines: &[String]) -> QuestionSpan {
    if lines.is_empty() {
        return QuestionSpan {
            text: String::new(),
            end_line: 0,
        };
    }

    // Explicit "Question N:" prefix
    for (i, line) in lines.iter().enumerate() {
        let Some(caps) = QUESTION_PREFIX.captures(line) else {
            continue;
        };
        let remainder = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let mut parts = Vec::new();
        let mut next = i + 1;

        if !remainder.is_empty() {
            parts.push(remainder.to_string());
        } else if let Some(next_line) = lines.get(next) {
            // The question sometimes lands on the following line with a
            // misplaced "Option A:" marker in front of it
            if let Some(m) = OPTION_A_PREFIX.find(next_line) {
                parts.push(next_line[m.end()..].trim().to_string());
                next += 1;
            }
        }

        let end = assemble(lines, next, &mut parts);
        return finish(parts, end);
    }

    // Implicit opener
    for (i, line) in lines.iter().enumerate() {
        if IMPLICIT_OPENER.is_match(line) && !is_option_start(line) {
            let mut parts = vec![line.trim().to_string()];
            let end = assemble(lines, i + 1, &mut parts);
            return finish(parts, end);
        }
    }

    // Everything before the first option marker; a marker on the very first
    // line means there is no question text at all
    if let Some(idx) = lines.iter().position(|l| is_option_start(l)) {
        let parts: Vec<String> = lines[..idx].iter().map(|l| l.trim().to_string()).collect();
        return finish(parts, idx);
    }

    // Last resort: the first line
    finish(vec![lines[0].trim().to_string()], 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(input: &[&str]) -> Vec<String> {
        input.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_explicit_prefix_same_line() {
        let span = extract_question(&lines(&[
            "Question 3: Which protocol uses port 443?",
            "A. HTTP",
        ]));
        assert_eq!(span.text, "Which protocol uses port 443?");
        assert_eq!(span.end_line, 1);
    }

    #[test]
    fn test_explicit_prefix_next_line() {
        let span = extract_question(&lines(&[
            "Question 7:",
            "Option A: Which layer handles framing",
            "A. Physical",
        ]));
        assert_eq!(span.text, "Which layer handles framing?");
        assert_eq!(span.end_line, 2);
    }

    #[test]
    fn test_multi_line_question_assembly() {
        let span = extract_question(&lines(&[
            "Question 1: A router receives a packet",
            "with an unknown destination.",
            "What does it do?",
            "A. Drops it",
        ]));
        assert_eq!(
            span.text,
            "A router receives a packet with an unknown destination. What does it do?"
        );
        assert_eq!(span.end_line, 3);
    }

    #[test]
    fn test_implicit_opener() {
        let span = extract_question(&lines(&[
            "Networking Exam 2",
            "What is the default MTU for Ethernet?",
            "A. 1500",
        ]));
        assert_eq!(span.text, "What is the default MTU for Ethernet?");
        assert_eq!(span.end_line, 2);
    }

    #[test]
    fn test_text_before_options_fallback() {
        let span = extract_question(&lines(&[
            "The spanning tree root bridge election",
            "B. uses the lowest bridge ID",
        ]));
        assert_eq!(span.text, "The spanning tree root bridge election?");
        assert_eq!(span.end_line, 1);
    }

    #[test]
    fn test_option_marker_on_first_line_means_no_question() {
        let span = extract_question(&lines(&["A. Physical", "B. Data link"]));
        assert_eq!(span.text, "");
        assert_eq!(span.end_line, 0);
    }

    #[test]
    fn test_question_mark_not_doubled() {
        let span = extract_question(&lines(&["Question 2: Why?"]));
        assert_eq!(span.text, "Why?");
    }

    #[test]
    fn test_empty_input() {
        let span = extract_question(&[]);
        assert_eq!(span.text, "");
        assert_eq!(span.end_line, 0);
    }
}
