use std::path::PathBuf;
use std::sync::OnceLock;

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the application data directory: `<local data dir>/quizscan/`.
///
/// Falls back to the current directory when the platform data dir cannot
/// be resolved.
pub fn get_data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quizscan")
    })
}

/// Returns the path of the question database.
pub fn get_db_path() -> PathBuf {
    get_data_dir().join("questions.db")
}

/// Returns the path of the persisted application config.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Ensures the data directory exists. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_data_dir())
}
