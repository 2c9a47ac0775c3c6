//! Heuristic confidence for extracted field values.
//!
//! The weights are not calibrated against labeled data; they are the contract.
//! Identical inputs always produce identical scores.

use std::sync::LazyLock;

use regex::Regex;

use super::grammar::DocumentType;

const BASE: f32 = 0.8;
const SHORT_PENALTY: f32 = 0.3;
const LONG_PENALTY: f32 = 0.2;
const CHARSET_PENALTY: f32 = 0.2;
const PATTERN_BONUS: f32 = 0.2;
const SHAPE_BONUS: f32 = 0.2;

const MIN_LENGTH: usize = 3;
const MAX_LENGTH: usize = 100;

/// Letters (with Latin-1 diacritics, excluding × and ÷), digits, `@ . , - /` and whitespace.
static ALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-zÀ-ÖØ-öø-ÿ0-9@.,\-/\s]*$").expect("valid charset pattern"));

static CPF_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3}\.\d{3}\.\d{3}-\d{2}$").expect("valid cpf shape"));
static RG_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{7,9}[\dX]$").expect("valid rg shape"));
static ISSUER_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2,}/[A-Z]{2}$").expect("valid issuer shape"));
static DATE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").expect("valid date shape"));
static NAME_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\p{Lu}\p{Ll}*(?:\s+\p{Lu}\p{Ll}*)+$").expect("valid name shape")
});
static CRECI_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5,}(?:-?[A-Z])?$").expect("valid creci shape"));
static CNH_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{11}$").expect("valid cnh shape"));

/// Scores an already formatted value for `field_key` in [0, 1].
pub fn score(text: &str, field_key: &str, document_type: DocumentType) -> f32 {
    let mut confidence = BASE;

    let len = text.chars().count();
    if len < MIN_LENGTH {
        confidence -= SHORT_PENALTY;
    }
    if len > MAX_LENGTH {
        confidence -= LONG_PENALTY;
    }
    if !ALLOWED.is_match(text) {
        confidence -= CHARSET_PENALTY;
    }

    if let Some(def) = document_type.field(field_key) {
        if def.pattern.is_match(text) {
            confidence += PATTERN_BONUS;
        }
    }
    if has_canonical_shape(text, field_key) {
        confidence += SHAPE_BONUS;
    }

    confidence.clamp(0.0, 1.0)
}

/// Strict per-field shape check on the canonical value.
fn has_canonical_shape(text: &str, field_key: &str) -> bool {
    let shape: &Regex = match field_key {
        "cpf" => &CPF_SHAPE,
        "rg" => &RG_SHAPE,
        "orgaoExpedidor" => &ISSUER_SHAPE,
        "dataExpedicao" | "dataNascimento" => &DATE_SHAPE,
        "nomeCompleto" => &NAME_SHAPE,
        "numeroCRECI" => &CRECI_SHAPE,
        "registroCnh" => &CNH_SHAPE,
        _ => return false,
    };
    shape.is_match(text)
}
