//! Identity document OCR for real-estate paperwork.
//!
//! Normalizes document images, recognizes their text with Tesseract, extracts
//! and canonicalizes typed fields (name, CPF, RG, issuer, dates, registration
//! numbers) with a heuristic confidence per field, remembers which image
//! regions produced which field, and keeps a bounded audit log of every
//! extraction attempt.
//!
//! [`ExtractionService`] owns one instance of each stateful component and is
//! the entry point for collaborators.

pub mod analysis;
pub mod config;
pub mod error;
pub mod fields;
pub mod ocr;
pub mod paths;
pub mod storage;

pub use config::AppConfig;
pub use error::{OcrError, Result};
pub use fields::{DocumentType, FieldResult};
pub use ocr::{ExtractionResult, ExtractionService, Rect};
