//! Extraction audit log, statistics and reporting.
//!
//! This module provides:
//! - The size-bounded, durably persisted extraction log
//! - Success rates overall, per field and per navigation path
//! - An HTML report over recent entries
//! - JSON export of recent entries

pub mod export;
pub mod log;
pub mod report;
pub mod statistics;

pub use log::{ExtractionLogService, FieldMapping, LogAction, LogEntry};
pub use statistics::{FieldSuccess, PathStats};
