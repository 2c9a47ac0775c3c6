//! Aggregate statistics over extraction log entries.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::log::LogEntry;

/// Mappings above this confidence count as successful.
pub const CONFIDENT_MAPPING: f32 = 0.7;

/// Success of one field across all logged mappings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSuccess {
    pub field_name: String,
    /// Number of logged mappings for the field
    pub mappings: usize,
    /// Mappings with confidence above [`CONFIDENT_MAPPING`]
    pub confident: usize,
    /// `confident / mappings`, 0.0 to 1.0
    pub rate: f64,
}

/// Success of attempts made from one navigation path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStats {
    pub path: String,
    pub attempts: usize,
    pub successes: usize,
    /// Percentage, one decimal
    pub rate: f64,
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 * 1000.0 / total as f64).round() / 10.0
}

/// Percentage of successful entries, rounded to one decimal.
pub fn success_rate(entries: &[LogEntry]) -> f64 {
    let successes = entries.iter().filter(|e| e.success).count();
    percentage(successes, entries.len())
}

/// Fields ranked by the fraction of confident mappings, best first.
///
/// Ties go to the field with more mappings, then to the field name.
pub fn field_rankings(entries: &[LogEntry]) -> Vec<FieldSuccess> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();

    for mapping in entries.iter().flat_map(|e| e.field_mappings.iter()) {
        let (total, confident) = counts.entry(mapping.field_name.as_str()).or_default();
        *total += 1;
        if mapping.confidence > CONFIDENT_MAPPING {
            *confident += 1;
        }
    }

    let mut ranked: Vec<FieldSuccess> = counts
        .into_iter()
        .map(|(name, (mappings, confident))| FieldSuccess {
            field_name: name.to_string(),
            mappings,
            confident,
            rate: confident as f64 / mappings as f64,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.rate
            .total_cmp(&a.rate)
            .then_with(|| b.mappings.cmp(&a.mappings))
            .then_with(|| a.field_name.cmp(&b.field_name))
    });

    ranked
}

/// Display label for the navigation context of an entry.
pub fn path_label(entry: &LogEntry) -> String {
    if !entry.navigation_path.is_empty() {
        entry.navigation_path.join(" > ")
    } else if !entry.form_path.is_empty() {
        entry.form_path.clone()
    } else {
        "(unknown)".to_string()
    }
}

/// Per-path attempt counts and success rates, sorted by path.
pub fn path_summary(entries: &[LogEntry]) -> Vec<PathStats> {
    let mut by_path: BTreeMap<String, (usize, usize)> = BTreeMap::new();

    for entry in entries {
        let (attempts, successes) = by_path.entry(path_label(entry)).or_default();
        *attempts += 1;
        if entry.success {
            *successes += 1;
        }
    }

    by_path
        .into_iter()
        .map(|(path, (attempts, successes))| PathStats {
            path,
            attempts,
            successes,
            rate: percentage(successes, attempts),
        })
        .collect()
}
