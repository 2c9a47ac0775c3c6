//! Application configuration.
//!
//! Loads settings from config.json at startup: storage location, ambient
//! document type, Tesseract discovery and preprocessing strengths.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{OcrError, Result};
use crate::fields::DocumentType;
use crate::ocr::preprocess::PreprocessOptions;
use crate::paths;

/// How to find and run Tesseract.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    /// Explicit executable; searched on PATH and common locations when unset
    pub executable: Option<PathBuf>,
    /// Directory containing `<language>.traineddata`
    pub tessdata_dir: Option<PathBuf>,
    /// Tesseract language code
    pub language: String,
    /// Fetch missing language data from the public tessdata repository
    pub download_language_data: bool,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            executable: None,
            tessdata_dir: None,
            language: "por".to_string(),
            download_language_data: true,
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Durable storage root; platform data dir when unset
    pub data_dir: Option<PathBuf>,
    /// Document type installed on the engine at startup
    pub default_document_type: DocumentType,
    pub tesseract: TesseractConfig,
    /// Whole-document preprocessing
    pub document_preprocess: PreprocessOptions,
    /// Region preprocessing, stronger than the document pass
    pub region_preprocess: PreprocessOptions,
    /// Smallest accepted selection width and height, in pixels
    pub min_selection_size: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_document_type: DocumentType::Rg,
            tesseract: TesseractConfig::default(),
            document_preprocess: PreprocessOptions::document(),
            region_preprocess: PreprocessOptions::region(),
            min_selection_size: 10,
        }
    }
}

impl AppConfig {
    /// Effective storage root.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(paths::default_data_dir)
    }

    /// Parses a config file, reporting read and parse failures.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| OcrError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Loads configuration from `explicit`, else config.json next to the
    /// executable. Falls back to defaults on any failure.
    pub fn load(explicit: Option<&Path>) -> Self {
        let config_path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| paths::get_exe_dir().join("config.json"));

        info!("Looking for config at: {}", config_path.display());

        if !config_path.exists() {
            info!("config.json not found. Using default config.");
            return Self::default();
        }

        match Self::from_file(&config_path) {
            Ok(config) => {
                info!("Config loaded from {}", config_path.display());
                config
            }
            Err(e) => {
                warn!("{}. Using defaults.", e);
                Self::default()
            }
        }
    }
}
