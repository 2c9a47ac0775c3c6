use std::collections::BTreeMap;

use tracing::debug;

use super::confidence::score;
use super::format::format;
use super::grammar::DocumentType;
use super::FieldResult;

/// Extracts every grammar field of `document_type` from recognized `text`.
///
/// Each pattern runs independently against the whole text (first match only),
/// in grammar order. Fields that do not match are absent from the result.
pub fn extract_fields(text: &str, document_type: DocumentType) -> BTreeMap<String, FieldResult> {
    let mut fields = BTreeMap::new();

    for def in document_type.grammar() {
        let Some(captured) = def
            .pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
        else {
            continue;
        };

        let value = format(captured, def.key);
        let confidence = score(&value, def.key, document_type);
        debug!(
            "Field {} matched {:?} -> {:?} (conf: {:.2})",
            def.key, captured, value, confidence
        );
        fields.insert(def.key.to_string(), FieldResult { value, confidence });
    }

    debug!(
        "{} grammar: {} of {} fields found",
        document_type,
        fields.len(),
        document_type.grammar().len()
    );

    fields
}

/// Returns the raw capture of `field_key`'s pattern in `text`, if the field
/// belongs to the grammar and its pattern matches with a non-empty capture.
pub fn match_field(text: &str, field_key: &str, document_type: DocumentType) -> Option<String> {
    let def = document_type.field(field_key)?;
    def.pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}
