//! Answer option segmentation.
//!
//! Pulls the A-D option texts out of the lines following the question. Each
//! letter gets three marker strategies in order (`A.` / `Option A:` /
//! `Options: A.`); letters still missing afterwards are filled from bullet
//! lines, then from leftover unconsumed lines by position.

use once_cell::sync::Lazy;
use regex::Regex;

use super::cleanup;

pub const LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

/// Reported in place of text when a slot could not be filled.
pub const NOT_DETECTED: &str = "[Option text not detected]";

/// One answer slot. Missing options are kept distinct from empty strings so
/// the store and the display layer can tell a parse gap from real text.
#[derive(Clone, Debug, PartialEq)]
pub enum OptionSlot {
    Detected(String),
    NotDetected,
}

impl OptionSlot {
    pub fn display_text(&self) -> &str {
        match self {
            Self::Detected(text) => text,
            Self::NotDetected => NOT_DETECTED,
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, Self::Detected(_))
    }
}

static OPTION_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[A-D][.:)](\s|$)|[A-D]$|[Oo]ptions?\s+[A-D][.:\s]|[•‣◦⁃∙○●◉⦿⚪⚫]\s*\S)")
        .unwrap()
});

static BULLET_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s•‣◦⁃∙○●◉⦿⚪⚫*\-]+(.+)$").unwrap());

/// Line-start letter markers, one per letter. The block they open runs to
/// the next marker of any kind, found with [`MARKER_BOUNDARY`].
static LETTER_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    LETTERS
        .iter()
        .map(|letter| Regex::new(&format!(r"(?m)^\s*{letter}[.:)]\s*")).unwrap())
        .collect()
});

/// Any marker that ends the previous option's block: a letter marker, an
/// `Option X` keyword line, or a bullet.
static MARKER_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:[A-D][.:)]|[Oo]ptions?\s+[A-D]|[•‣◦⁃∙○●◉⦿⚪⚫])").unwrap()
});

/// Keyword fallback regexes per letter (`Option A:` / `Options: A.`).
static KEYWORD_STRATEGIES: Lazy<Vec<[Regex; 2]>> = Lazy::new(|| {
    LETTERS
        .iter()
        .map(|letter| {
            [
                Regex::new(&format!(r"(?m)^\s*[Oo]ption\s+{letter}[.:\s]\s*(.+)$")).unwrap(),
                Regex::new(&format!(r"(?m)[Oo]ptions:\s*{letter}[.:\s]\s*(.+)$")).unwrap(),
            ]
        })
        .collect()
});

/// True when a line begins an option (letter marker, `Option X`, or bullet).
/// Used by the question extractor as its span boundary.
pub fn is_option_start(line: &str) -> bool {
    OPTION_START.is_match(line)
}

/// Collapses whitespace and strips leading glyph junk from captured text.
fn normalize_option(text: &str) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    cleanup::strip_leading_junk(&joined).to_string()
}

/// Extracts the four option slots from the lines after `start`.
pub fn extract_options(lines: &[String], start: usize) -> [OptionSlot; 4] {
    let tail: &[String] = &lines[start.min(lines.len())..];
    let text = tail.join("\n");

    // Byte range of each line inside the joined text, for consumed tracking
    let mut offsets = Vec::with_capacity(tail.len());
    let mut pos = 0usize;
    for line in tail {
        offsets.push((pos, pos + line.len()));
        pos += line.len() + 1;
    }
    let mut consumed = vec![false; tail.len()];
    let mark = |consumed: &mut Vec<bool>, range: std::ops::Range<usize>| {
        for (i, (s, e)) in offsets.iter().enumerate() {
            if range.start < *e && range.end > *s {
                consumed[i] = true;
            }
        }
    };

    let mut slots: [Option<String>; 4] = [None, None, None, None];

    for i in 0..LETTERS.len() {
        // Letter-marker block first: slice from the marker to the next
        // marker of any kind, or the end of the text
        if let Some(m) = LETTER_MARKERS[i].find(&text) {
            // A boundary inside the marker's trailing whitespace means the
            // marker line itself was empty
            let end = MARKER_BOUNDARY
                .find_iter(&text)
                .map(|b| b.start())
                .find(|&s| s > m.start())
                .unwrap_or(text.len());
            if end > m.end() {
                let content = normalize_option(&text[m.end()..end]);
                if !content.is_empty() {
                    mark(&mut consumed, m.start()..end);
                    slots[i] = Some(content);
                    continue;
                }
            }
        }
        for strategy in &KEYWORD_STRATEGIES[i] {
            let Some(caps) = strategy.captures(&text) else {
                continue;
            };
            let content = normalize_option(&caps[1]);
            if !content.is_empty() {
                if let Some(m) = caps.get(0) {
                    mark(&mut consumed, m.range());
                }
                slots[i] = Some(content);
                break;
            }
        }
    }

    // Bullet lines fill the remaining letters in encounter order
    for (line_idx, line) in tail.iter().enumerate() {
        if consumed[line_idx] {
            continue;
        }
        let Some(caps) = BULLET_LINE.captures(line) else {
            continue;
        };
        if let Some(slot) = slots.iter_mut().find(|s| s.is_none()) {
            let content = normalize_option(&caps[1]);
            if !content.is_empty() {
                *slot = Some(content);
                consumed[line_idx] = true;
            }
        } else {
            break;
        }
    }

    // Positional fallback: leftover lines in order
    for (line_idx, line) in tail.iter().enumerate() {
        if consumed[line_idx] || is_option_start(line) {
            continue;
        }
        let Some(slot) = slots.iter_mut().find(|s| s.is_none()) else {
            break;
        };
        let content = normalize_option(line);
        if !content.is_empty() {
            *slot = Some(content);
            consumed[line_idx] = true;
        }
    }

    slots.map(|s| match s {
        Some(text) => OptionSlot::Detected(text),
        None => OptionSlot::NotDetected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(input: &[&str]) -> Vec<String> {
        input.iter().map(|s| s.to_string()).collect()
    }

    fn detected(slots: &[OptionSlot; 4], i: usize) -> &str {
        match &slots[i] {
            OptionSlot::Detected(t) => t,
            OptionSlot::NotDetected => panic!("slot {} not detected", i),
        }
    }

    #[test]
    fn test_letter_markers() {
        let slots = extract_options(
            &lines(&["A. Physical", "B. Data link", "C. Network", "D. Transport"]),
            0,
        );
        assert_eq!(detected(&slots, 0), "Physical");
        assert_eq!(detected(&slots, 1), "Data link");
        assert_eq!(detected(&slots, 2), "Network");
        assert_eq!(detected(&slots, 3), "Transport");
    }

    #[test]
    fn test_multi_line_option_continuation() {
        let slots = extract_options(
            &lines(&["A. first part", "of the answer", "B. second", "C. third", "D. fourth"]),
            0,
        );
        assert_eq!(detected(&slots, 0), "first part of the answer");
        assert_eq!(detected(&slots, 1), "second");
    }

    #[test]
    fn test_letter_block_bounded_by_any_marker_kind() {
        let slots = extract_options(
            &lines(&[
                "A. spans two",
                "lines of text",
                "Option B: keyword style",
                "C) paren style",
                "• final bullet",
            ]),
            0,
        );
        assert_eq!(detected(&slots, 0), "spans two lines of text");
        assert_eq!(detected(&slots, 1), "keyword style");
        assert_eq!(detected(&slots, 2), "paren style");
        assert_eq!(detected(&slots, 3), "final bullet");
    }

    #[test]
    fn test_option_keyword_markers() {
        let slots = extract_options(
            &lines(&["Option A: one", "Option B: two", "Option C: three", "Option D: four"]),
            0,
        );
        assert_eq!(detected(&slots, 0), "one");
        assert_eq!(detected(&slots, 3), "four");
    }

    #[test]
    fn test_bullets_fill_missing_letters() {
        let slots = extract_options(
            &lines(&["A. explicit first", "• bullet one", "○ bullet two", "‣ bullet three"]),
            0,
        );
        assert_eq!(detected(&slots, 0), "explicit first");
        assert_eq!(detected(&slots, 1), "bullet one");
        assert_eq!(detected(&slots, 2), "bullet two");
        assert_eq!(detected(&slots, 3), "bullet three");
    }

    #[test]
    fn test_positional_fallback() {
        let slots = extract_options(&lines(&["1500", "9000", "1492"]), 0);
        assert_eq!(detected(&slots, 0), "1500");
        assert_eq!(detected(&slots, 1), "9000");
        assert_eq!(detected(&slots, 2), "1492");
        assert_eq!(slots[3], OptionSlot::NotDetected);
    }

    #[test]
    fn test_missing_slot_sentinel() {
        let slots = extract_options(&lines(&["A. only one"]), 0);
        assert!(slots[0].is_detected());
        assert_eq!(slots[1].display_text(), NOT_DETECTED);
    }

    #[test]
    fn test_hex_and_units_preserved() {
        let slots = extract_options(
            &lines(&["A) Set the register to 0x1A2B", "B) Use 40 Gbps uplinks"]),
            0,
        );
        assert_eq!(detected(&slots, 0), "Set the register to 0x1A2B");
        assert_eq!(detected(&slots, 1), "Use 40 Gbps uplinks");
    }

    #[test]
    fn test_is_option_start() {
        assert!(is_option_start("A. Physical"));
        assert!(is_option_start("B) framing"));
        assert!(is_option_start("Option C: something"));
        assert!(is_option_start("• bullet"));
        assert!(!is_option_start("A router receives a packet"));
        assert!(!is_option_start("What is the MTU?"));
    }
}
