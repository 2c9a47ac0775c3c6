use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Platform data directory: `<data_local_dir>/docscan-ocr/`
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docscan-ocr")
}

/// Returns the logs directory: `<data_dir>/logs/`
pub fn logs_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Returns the key-value store directory: `<data_dir>/store/`
pub fn store_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("store")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories(data_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(logs_dir(data_dir))?;
    std::fs::create_dir_all(store_dir(data_dir))?;
    Ok(())
}
