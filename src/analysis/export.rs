//! JSON export for extraction log entries.

use super::log::LogEntry;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Entries included in an export, most recent last.
pub const EXPORT_ENTRIES: usize = 50;

fn recent(entries: &[LogEntry]) -> &[LogEntry] {
    &entries[entries.len().saturating_sub(EXPORT_ENTRIES)..]
}

/// Serializes the most recent entries as pretty-printed JSON.
pub fn export_json(entries: &[LogEntry]) -> Result<String> {
    serde_json::to_string_pretty(recent(entries)).context("Failed to serialize log entries to JSON")
}

/// Export the most recent entries to a JSON file.
pub fn export_to_file(entries: &[LogEntry], output_path: &Path) -> Result<()> {
    let json = export_json(entries)?;

    let mut file = File::create(output_path)
        .context(format!("Failed to create JSON file: {}", output_path.display()))?;

    file.write_all(json.as_bytes())
        .context("Failed to write JSON data")?;

    Ok(())
}
