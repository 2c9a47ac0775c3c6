//! Per-field value canonicalization.
//!
//! Every rule starts from whitespace-collapsed, trimmed text and is idempotent:
//! formatting an already formatted value returns it unchanged.

use std::sync::LazyLock;

use regex::Regex;

static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})[/.\-](\d{2})[/.\-](\d{4})").expect("valid date pattern"));

/// Field keys whose values are title-cased names or words.
const TITLE_CASE_FIELDS: [&str; 6] = [
    "nomeCompleto",
    "profissao",
    "nacionalidade",
    "estadoCivil",
    "naturalidade",
    "filiacao",
];

/// Canonicalizes `raw` according to the rule for `field_key`.
///
/// Unknown keys only get whitespace normalization. Never fails: malformed
/// input passes through the best-effort transform.
pub fn format(raw: &str, field_key: &str) -> String {
    let text = collapse_whitespace(raw);

    match field_key {
        "cpf" => format_cpf(&text),
        "rg" => text
            .to_uppercase()
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == 'X')
            .collect(),
        "dataExpedicao" | "dataNascimento" => format_date(&text),
        "orgaoExpedidor" => format_issuer(&text),
        "numeroCRECI" => text
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '-')
            .collect(),
        "registroCnh" => digits_only(&text),
        key if TITLE_CASE_FIELDS.contains(&key) => title_case(&text),
        _ => text,
    }
}

/// Collapses runs of whitespace to a single space and trims.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn digits_only(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn format_cpf(text: &str) -> String {
    let digits = digits_only(text);
    if digits.len() != 11 {
        return digits;
    }
    format!(
        "{}.{}.{}-{}",
        &digits[0..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..11]
    )
}

fn format_date(text: &str) -> String {
    match DATE.captures(text) {
        Some(caps) => format!("{}/{}/{}", &caps[1], &caps[2], &caps[3]),
        None => text.to_string(),
    }
}

fn format_issuer(text: &str) -> String {
    let compact: String = text
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let len = compact.chars().count();
    if compact.contains('/') || len < 4 {
        return compact;
    }

    let split = compact
        .char_indices()
        .nth(len - 2)
        .map(|(idx, _)| idx)
        .unwrap_or(compact.len());
    format!("{}/{}", &compact[..split], &compact[split..])
}

fn title_case(text: &str) -> String {
    text.to_lowercase()
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    // Keep the char when its uppercase form is longer (ß -> SS).
                    let mut upper = first.to_uppercase();
                    let head = match (upper.next(), upper.next()) {
                        (Some(single), None) => single,
                        _ => first,
                    };
                    std::iter::once(head).chain(chars).collect()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
