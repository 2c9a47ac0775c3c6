use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::statistics::{self, FieldSuccess, PathStats};
use super::{export, report};
use crate::fields::{DocumentType, FieldResult};
use crate::storage::{KeyValueStore, EXTRACTION_LOG_KEY};

/// Entries kept in memory and in durable storage.
pub const MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogAction {
    OcrAttempt,
    FieldMapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub field_name: String,
    pub value: String,
    pub confidence: f32,
}

impl FieldMapping {
    pub fn new(field_name: impl Into<String>, value: impl Into<String>, confidence: f32) -> Self {
        Self {
            field_name: field_name.into(),
            value: value.into(),
            confidence,
        }
    }

    /// One mapping per extracted field, in key order.
    pub fn from_fields(fields: &BTreeMap<String, FieldResult>) -> Vec<Self> {
        fields
            .iter()
            .map(|(key, result)| Self::new(key.as_str(), result.value.as_str(), result.confidence))
            .collect()
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: LogAction,
    pub document_type: Option<DocumentType>,
    pub form_path: String,
    pub navigation_path: Vec<String>,
    pub field_mappings: Vec<FieldMapping>,
    pub success: bool,
}

#[derive(Debug, Clone, Default)]
struct Location {
    form_path: String,
    navigation_path: Vec<String>,
}

/// Size-bounded audit log of extraction attempts and field mappings.
pub struct ExtractionLogService {
    store: Arc<dyn KeyValueStore>,
    entries: Mutex<Vec<LogEntry>>,
    location: Mutex<Location>,
}

impl ExtractionLogService {
    /// Loads any persisted entries. Unreadable data starts an empty log.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let mut entries: Vec<LogEntry> = match store.load(EXTRACTION_LOG_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("Discarding unreadable extraction log: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to load extraction log: {:#}", e);
                Vec::new()
            }
        };
        truncate(&mut entries);

        debug!("Extraction log loaded with {} entries", entries.len());

        Self {
            store,
            entries: Mutex::new(entries),
            location: Mutex::new(Location::default()),
        }
    }

    /// Navigation context stamped on subsequent entries.
    pub fn set_location(&self, form_path: &str, navigation_path: &[&str]) {
        let mut location = self.location.lock().unwrap_or_else(PoisonError::into_inner);
        location.form_path = form_path.to_string();
        location.navigation_path = navigation_path.iter().map(|s| s.to_string()).collect();
    }

    pub fn log_attempt(
        &self,
        document_type: DocumentType,
        field_mappings: Vec<FieldMapping>,
        success: bool,
    ) {
        self.append(LogAction::OcrAttempt, Some(document_type), field_mappings, success);
    }

    /// Logs a single mapping not tied to a document type.
    pub fn log_field_mapping(&self, field_name: &str, value: &str, confidence: f32) {
        let success = !value.is_empty();
        self.append(
            LogAction::FieldMapping,
            None,
            vec![FieldMapping::new(field_name, value, confidence)],
            success,
        );
    }

    /// Logs a single mapping produced while extracting `document_type`.
    pub fn log_field_mapping_for(
        &self,
        document_type: DocumentType,
        field_name: &str,
        value: &str,
        confidence: f32,
    ) {
        let success = !value.is_empty();
        self.append(
            LogAction::FieldMapping,
            Some(document_type),
            vec![FieldMapping::new(field_name, value, confidence)],
            success,
        );
    }

    fn append(
        &self,
        action: LogAction,
        document_type: Option<DocumentType>,
        field_mappings: Vec<FieldMapping>,
        success: bool,
    ) {
        let location = self
            .location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let entry = LogEntry {
            timestamp: Utc::now(),
            action,
            document_type,
            form_path: location.form_path,
            navigation_path: location.navigation_path,
            field_mappings,
            success,
        };

        debug!(
            "Logged {:?} ({} mappings, success: {})",
            entry.action,
            entry.field_mappings.len(),
            entry.success
        );

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push(entry);
        truncate(&mut entries);
        self.persist(&entries);
    }

    fn persist(&self, entries: &[LogEntry]) {
        let result = serde_json::to_string(entries)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.store.save(EXTRACTION_LOG_KEY, &json));

        if let Err(e) = result {
            warn!(key = EXTRACTION_LOG_KEY, "Failed to persist extraction log: {:#}", e);
        }
    }

    /// Snapshot of the retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
        self.persist(&entries);
    }

    /// Percentage of successful entries, one decimal. 0.0 when empty.
    pub fn success_rate(&self) -> f64 {
        statistics::success_rate(&self.entries())
    }

    pub fn most_successful_fields(&self) -> Vec<FieldSuccess> {
        statistics::field_rankings(&self.entries())
    }

    pub fn path_summary(&self) -> Vec<PathStats> {
        statistics::path_summary(&self.entries())
    }

    /// HTML report of per-path success and the most recent entries.
    pub fn generate_report(&self) -> String {
        report::generate_report(&self.entries())
    }

    /// Pretty JSON of the most recent entries.
    pub fn export_json(&self) -> anyhow::Result<String> {
        export::export_json(&self.entries())
    }

    pub fn export_to_file(&self, path: &Path) -> anyhow::Result<()> {
        export::export_to_file(&self.entries(), path)
    }
}

fn truncate(entries: &mut Vec<LogEntry>) {
    if entries.len() > MAX_ENTRIES {
        let excess = entries.len() - MAX_ENTRIES;
        entries.drain(..excess);
    }
}
