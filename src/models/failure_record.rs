use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::models::{ErrorKind, generate_id};

/// Upper bound on the markup kept alongside a parse failure.
pub const HTML_SNAPSHOT_LIMIT: usize = 5000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureRecord {
    pub id: String,
    pub item_url: String,
    pub error_kind: ErrorKind,
    pub message: String,
    pub failed_at: DateTime<Utc>,
    pub html_snapshot: Option<String>,
}

/// An item whose oldest unresolved failure predates the reporting window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistentFailure {
    pub item_url: String,
    pub first_failure: DateTime<Utc>,
    pub failure_count: u32,
}

impl FailureRecord {
    pub fn new(item_url: String, error_kind: ErrorKind, message: String, html_snapshot: Option<String>) -> Self {
        Self::observed_at(item_url, error_kind, message, html_snapshot, Utc::now())
    }

    pub fn observed_at(
        item_url: String,
        error_kind: ErrorKind,
        message: String,
        html_snapshot: Option<String>,
        failed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id(),
            item_url,
            error_kind,
            message,
            failed_at,
            html_snapshot: html_snapshot.map(|html| truncate_snapshot(&html)),
        }
    }
}

/// Cut markup down to `HTML_SNAPSHOT_LIMIT` bytes without splitting a UTF-8 character.
pub fn truncate_snapshot(html: &str) -> String {
    if html.len() <= HTML_SNAPSHOT_LIMIT {
        return html.to_string();
    }
    let mut end = HTML_SNAPSHOT_LIMIT;
    while !html.is_char_boundary(end) {
        end -= 1;
    }
    html[..end].to_string()
}
