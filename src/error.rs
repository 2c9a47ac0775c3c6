use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    /// Decoding, drawing or encoding an image failed locally.
    #[error("Image rendering failed: {0}")]
    Rendering(String),

    /// Selection rectangle is smaller than the minimum allowed size.
    #[error("Selection too small: {width}x{height} (minimum {min}x{min} pixels)")]
    Validation { width: u32, height: u32, min: u32 },

    /// The recognizer failed to produce text.
    #[error("Text recognition failed, check image quality: {0}")]
    Recognition(String),

    #[error("Invalid configuration at {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OcrError {
    pub fn recognition(err: impl std::fmt::Display) -> Self {
        Self::Recognition(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OcrError>;
