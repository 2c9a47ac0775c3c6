//! Document field grammars, extraction, formatting and confidence scoring.
//!
//! This module provides:
//! - The closed set of supported document types and their field grammars
//! - Whole-text field extraction (first match per field)
//! - Per-field value canonicalization
//! - Heuristic per-field confidence scores

pub mod confidence;
pub mod extract;
pub mod format;
pub mod grammar;

pub use confidence::score;
pub use extract::{extract_fields, match_field};
pub use format::format;
pub use grammar::{DocumentType, FieldDefinition};

use serde::{Deserialize, Serialize};

/// One extracted field value with its heuristic confidence (0.0 to 1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResult {
    pub value: String,
    pub confidence: f32,
}
