//! Formatting of log entries.
//!
//! Every entry has two renderings: a plain-text one for terminals and an
//! HTML fragment (`<div class="data-item">…</div>`) for embedding in a page.

use crate::snapshot::PollSnapshot;
use chrono::NaiveTime;
use serde_json::Value;
use std::fmt;

/// How many numeric values a data block previews.
pub const NUMERIC_PREVIEW: usize = 10;

const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    Status {
        at: NaiveTime,
        message: String,
    },
    Data {
        at: NaiveTime,
        summary: SnapshotSummary,
    },
    EncryptionWarning {
        indicators: String,
    },
}

/// The fixed set of figures a data block shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub text_points: usize,
    pub numeric_values: String,
    pub network_requests: usize,
    pub api_calls: usize,
}

impl SnapshotSummary {
    pub fn from_snapshot(snapshot: &PollSnapshot) -> Self {
        let numeric = snapshot.numeric_values();
        let preview = join_values(&numeric[..numeric.len().min(NUMERIC_PREVIEW)]);
        let numeric_values = if preview.is_empty() {
            "None".to_string()
        } else {
            preview
        };

        Self {
            text_points: snapshot.text_count(),
            numeric_values,
            network_requests: snapshot.request_count(),
            api_calls: snapshot.api_call_count(),
        }
    }
}

impl LogEntry {
    pub fn status(message: impl Into<String>, at: NaiveTime) -> Self {
        LogEntry::Status {
            at,
            message: message.into(),
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, LogEntry::EncryptionWarning { .. })
    }

    pub fn to_html(&self) -> String {
        match self {
            LogEntry::Status { at, message } => format!(
                "<div class=\"data-item\"><strong>[{}]</strong> {}</div>",
                at.format(TIME_FORMAT),
                escape_html(message)
            ),
            LogEntry::Data { at, summary } => format!(
                "<div class=\"data-item\">\
                 <strong>Timestamp:</strong> {}<br>\
                 <strong>Visible Data Points:</strong> {}<br>\
                 <strong>Numeric Values:</strong> {}<br>\
                 <strong>Network Requests:</strong> {}<br>\
                 <strong>API Calls:</strong> {}\
                 </div>",
                at.format(TIME_FORMAT),
                summary.text_points,
                escape_html(&summary.numeric_values),
                summary.network_requests,
                summary.api_calls
            ),
            LogEntry::EncryptionWarning { indicators } => format!(
                "<div class=\"data-item encryption-warning\">\
                 <strong>Encryption Indicators Found:</strong><br>{}</div>",
                escape_html(indicators)
            ),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEntry::Status { at, message } => {
                write!(f, "[{}] {}", at.format(TIME_FORMAT), message)
            }
            LogEntry::Data { at, summary } => {
                writeln!(f, "Timestamp: {}", at.format(TIME_FORMAT))?;
                writeln!(f, "Visible Data Points: {}", summary.text_points)?;
                writeln!(f, "Numeric Values: {}", summary.numeric_values)?;
                writeln!(f, "Network Requests: {}", summary.network_requests)?;
                write!(f, "API Calls: {}", summary.api_calls)
            }
            LogEntry::EncryptionWarning { indicators } => {
                write!(f, "Encryption Indicators Found:\n{}", indicators)
            }
        }
    }
}

/// Renders a snapshot into its entries, in display order: the data block
/// first, then the warning block when indicators are present.
pub fn render_snapshot(snapshot: &PollSnapshot, at: NaiveTime) -> Vec<LogEntry> {
    let mut entries = vec![LogEntry::Data {
        at,
        summary: SnapshotSummary::from_snapshot(snapshot),
    }];

    let indicators = snapshot.encryption_indicators();
    if !indicators.is_empty() {
        entries.push(LogEntry::EncryptionWarning {
            indicators: join_values(indicators),
        });
    }

    entries
}

fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            Value::Number(n) => format_number(n),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Whole-valued floats print without a fractional part (`3.0` reads `3`).
fn format_number(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 && f.abs() < 1e21 => {
            // `-0.0` reads `0`.
            format!("{:.0}", f + 0.0)
        }
        _ => n.to_string(),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
