//! HTML report over the extraction log.

use std::fmt::Write;

use super::log::LogEntry;
use super::statistics::{path_label, path_summary, success_rate};

/// Entries listed in the detailed section, newest first.
pub const REPORT_ENTRIES: usize = 20;

/// Renders a standalone HTML page with a per-path success summary and the
/// most recent entries in reverse-chronological order.
pub fn generate_report(entries: &[LogEntry]) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>OCR extraction report</title>\n</head>\n<body>\n");
    html.push_str("<h1>OCR extraction report</h1>\n");

    let _ = writeln!(
        html,
        "<p>Entries: {} &middot; Success rate: {:.1}%</p>",
        entries.len(),
        success_rate(entries)
    );

    html.push_str("<h2>Success by path</h2>\n<table>\n");
    html.push_str("<tr><th>Path</th><th>Attempts</th><th>Successes</th><th>Rate</th></tr>\n");
    for stats in path_summary(entries) {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.1}%</td></tr>",
            escape(&stats.path),
            stats.attempts,
            stats.successes,
            stats.rate
        );
    }
    html.push_str("</table>\n");

    html.push_str("<h2>Recent entries</h2>\n<table>\n");
    html.push_str(
        "<tr><th>Time</th><th>Action</th><th>Document</th><th>Path</th><th>Fields</th><th>Result</th></tr>\n",
    );
    for entry in entries.iter().rev().take(REPORT_ENTRIES) {
        let fields = entry
            .field_mappings
            .iter()
            .map(|m| format!("{}: {} ({:.2})", escape(&m.field_name), escape(&m.value), m.confidence))
            .collect::<Vec<_>>()
            .join("<br>");

        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{:?}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.action,
            entry.document_type.map(|d| d.as_str()).unwrap_or("-"),
            escape(&path_label(entry)),
            fields,
            if entry.success { "success" } else { "failure" }
        );
    }
    html.push_str("</table>\n</body>\n</html>\n");

    html
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
