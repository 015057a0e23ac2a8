//! Persisted application configuration.
//!
//! Loaded from config.json in the data directory at startup. Stores the
//! last-used input folder, the LLM endpoint settings, and OCR defaults so
//! repeated batch runs pick up where the previous one left off.

use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::OnceLock;

use crate::paths;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// LLM endpoint settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Chat-completion endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model identifier sent in the request payload
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum response tokens; values <= 0 mean "no limit" and are omitted
    /// from the payload
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i32,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry budget per file for transient endpoint failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Optional bearer token for the endpoint
    #[serde(default)]
    pub api_key: String,
}

fn default_endpoint() -> String {
    "http://localhost:1234/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gemma-3-12b-instruct".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> i32 {
    -1
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    2
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            api_key: String::new(),
        }
    }
}

/// OCR defaults applied when the CLI does not override them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OcrDefaults {
    /// Enhancement level name, parsed by `EnhancementLevel::from_name`
    #[serde(default = "default_enhancement")]
    pub enhancement: String,
    /// Tesseract page segmentation mode (0-13)
    #[serde(default = "default_psm")]
    pub psm: u8,
    /// Tesseract engine mode (0-3)
    #[serde(default = "default_oem")]
    pub oem: u8,
    #[serde(default = "default_language")]
    pub language: String,
    /// Explicit tesseract executable path; empty means auto-discover
    #[serde(default)]
    pub tesseract_path: String,
}

fn default_enhancement() -> String {
    "Super".to_string()
}

fn default_psm() -> u8 {
    6
}

fn default_oem() -> u8 {
    3
}

fn default_language() -> String {
    "eng".to_string()
}

impl Default for OcrDefaults {
    fn default() -> Self {
        Self {
            enhancement: default_enhancement(),
            psm: default_psm(),
            oem: default_oem(),
            language: default_language(),
            tesseract_path: String::new(),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Last folder processed; used as the default for the next run
    #[serde(default)]
    pub last_folder: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub ocr: OcrDefaults,
}

/// Loads configuration from config.json or returns defaults.
fn load_config() -> AppConfig {
    let config_path = paths::get_config_path();

    if config_path.exists() {
        match fs::read_to_string(&config_path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    info!("Config loaded from {}", config_path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}. Using defaults.", config_path.display(), e);
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {}. Using defaults.", config_path.display(), e);
            }
        }
    }

    AppConfig::default()
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config() {
    let _ = CONFIG.set(load_config());
}

/// Returns a reference to the global configuration.
/// Panics if called before init_config().
pub fn get_config() -> &'static AppConfig {
    CONFIG
        .get()
        .expect("Config not initialized. Call init_config() first.")
}

/// Writes an updated configuration back to disk.
///
/// The global instance is not replaced; updates take effect on next startup.
pub fn save_config(config: &AppConfig) -> Result<()> {
    let contents = serde_json::to_string_pretty(config)?;
    fs::write(paths::get_config_path(), contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.api.endpoint, config.api.endpoint);
        assert_eq!(parsed.ocr.psm, 6);
        assert_eq!(parsed.api.max_retries, 2);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"last_folder": "/tmp/scans"}"#).unwrap();
        assert_eq!(parsed.last_folder, "/tmp/scans");
        assert_eq!(parsed.ocr.language, "eng");
        assert_eq!(parsed.api.max_tokens, -1);
    }
}
