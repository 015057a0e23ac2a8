//! Input folder scanning and chronological ordering.
//!
//! Screenshot tools encode capture time in the filename in a handful of
//! formats. Files are sorted by the first timestamp pattern that matches so
//! a batch is processed in capture order regardless of directory order.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tiff", "gif"];

static ISO_DATETIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})[ _T](\d{2})[-:.](\d{2})[-:.](\d{2})").unwrap()
});
static COMPACT_DATETIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})(\d{2})(\d{2})[-_](\d{2})(\d{2})(\d{2})").unwrap());
static DATE_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap());
static COMPACT_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})(\d{2})(\d{2})").unwrap());
static TIME_HMS: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(\d{2})(\d{2})(\d{2})_").unwrap());
static TIME_MS: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(\d{2})(\d{2})_").unwrap());
static UNIX_STAMP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{10,14})").unwrap());
static DIGITS_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

fn field(caps: &regex::Captures<'_>, i: usize) -> i64 {
    caps[i].parse().unwrap_or(0)
}

fn datetime_key(caps: &regex::Captures<'_>) -> Option<i64> {
    NaiveDate::from_ymd_opt(field(caps, 1) as i32, field(caps, 2) as u32, field(caps, 3) as u32)?
        .and_hms_opt(field(caps, 4) as u32, field(caps, 5) as u32, field(caps, 6) as u32)
        .map(|dt: NaiveDateTime| dt.and_utc().timestamp())
}

fn date_key(caps: &regex::Captures<'_>) -> Option<i64> {
    NaiveDate::from_ymd_opt(field(caps, 1) as i32, field(caps, 2) as u32, field(caps, 3) as u32)?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
}

/// Sort key for one filename. Patterns are tried from most to least
/// specific; a name with no recognizable timestamp sorts first with key 0.
pub fn timestamp_sort_key(filename: &str) -> i64 {
    if let Some(caps) = ISO_DATETIME.captures(filename) {
        if let Some(key) = datetime_key(&caps) {
            return key;
        }
    }
    if let Some(caps) = COMPACT_DATETIME.captures(filename) {
        if let Some(key) = datetime_key(&caps) {
            return key;
        }
    }
    if let Some(caps) = DATE_ONLY.captures(filename) {
        if let Some(key) = date_key(&caps) {
            return key;
        }
    }
    if let Some(caps) = COMPACT_DATE.captures(filename) {
        if let Some(key) = date_key(&caps) {
            return key;
        }
    }
    if let Some(caps) = TIME_HMS.captures(filename) {
        return field(&caps, 1) * 3600 + field(&caps, 2) * 60 + field(&caps, 3);
    }
    if let Some(caps) = TIME_MS.captures(filename) {
        return field(&caps, 1) * 60 + field(&caps, 2);
    }
    if let Some(caps) = UNIX_STAMP.captures(filename) {
        return field(&caps, 1);
    }
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    if DIGITS_ONLY.is_match(stem) {
        return stem.parse().unwrap_or(0);
    }
    0
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Lists the image files in a folder in capture order.
pub fn list_image_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(folder)
        .with_context(|| format!("Failed to read folder {}", folder.display()))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_image_file(path))
        .collect();

    files.sort_by_cached_key(|path| {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();
        (timestamp_sort_key(&name), name)
    });

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_compact_datetime_ordering() {
        let earlier = timestamp_sort_key("page_20240101-080000.png");
        let later = timestamp_sort_key("page_20240101-090000.png");
        assert!(earlier < later);
    }

    #[test]
    fn test_iso_datetime_key() {
        let a = timestamp_sort_key("shot 2024-03-05 10-30-00.png");
        let b = timestamp_sort_key("shot 2024-03-05 10-30-01.png");
        assert_eq!(b - a, 1);
    }

    #[test]
    fn test_digits_only_filename() {
        assert_eq!(timestamp_sort_key("42.png"), 42);
        assert!(timestamp_sort_key("9.png") < timestamp_sort_key("10.png"));
    }

    #[test]
    fn test_unrecognized_name_is_zero() {
        assert_eq!(timestamp_sort_key("screenshot.png"), 0);
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in [
            "page_20240101-090000.png",
            "page_20240101-080000.png",
            "notes.txt",
            "scan.jpeg",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let files = list_image_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "scan.jpeg",
                "page_20240101-080000.png",
                "page_20240101-090000.png"
            ]
        );
    }
}
