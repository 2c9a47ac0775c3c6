use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{KeyValueStore, SELECTION_HISTORY_KEY};
use crate::ocr::preprocess::Rect;

/// Which rectangle of an image produced which field's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub rectangle: Rect,
    pub field: String,
    pub text: String,
}

type History = BTreeMap<String, Vec<SelectionRecord>>;

/// Per-image selection history, at most one record per field.
///
/// Every mutation is persisted; persistence failures are logged and the
/// in-memory history stays authoritative.
pub struct SelectionHistoryStore {
    store: Arc<dyn KeyValueStore>,
    history: Mutex<History>,
}

impl SelectionHistoryStore {
    /// Loads any persisted history. Unreadable data starts an empty history.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let history = match store.load(SELECTION_HISTORY_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("Discarding unreadable selection history: {}", e);
                History::new()
            }),
            Ok(None) => History::new(),
            Err(e) => {
                warn!("Failed to load selection history: {:#}", e);
                History::new()
            }
        };

        debug!("Selection history loaded for {} images", history.len());

        Self {
            store,
            history: Mutex::new(history),
        }
    }

    /// Records `text` for `field` on `image_id`, replacing any earlier record
    /// for the same field.
    pub fn record(&self, image_id: &str, rectangle: Rect, field: &str, text: &str) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);

        let records = history.entry(image_id.to_string()).or_default();
        records.retain(|r| r.field != field);
        records.push(SelectionRecord {
            rectangle,
            field: field.to_string(),
            text: text.to_string(),
        });

        self.persist(&history);
    }

    /// Records for `image_id` in insertion order; empty when unknown.
    pub fn get(&self, image_id: &str) -> Vec<SelectionRecord> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.get(image_id).cloned().unwrap_or_default()
    }

    /// Forgets every record for `image_id`.
    pub fn clear(&self, image_id: &str) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.remove(image_id).is_some() {
            self.persist(&history);
        }
    }

    pub fn image_ids(&self) -> Vec<String> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.keys().cloned().collect()
    }

    fn persist(&self, history: &History) {
        let result = serde_json::to_string(history)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.store.save(SELECTION_HISTORY_KEY, &json));

        if let Err(e) = result {
            warn!(key = SELECTION_HISTORY_KEY, "Failed to persist selection history: {:#}", e);
        }
    }
}
