//! Canonical task hash
//!
//! Both sides of a mapping store the digest produced here, so equal task
//! content always yields equal strings regardless of which backend it was
//! read from. The hash covers title, normalized status, the date range,
//! category and description; the reminder is deliberately excluded so
//! alarm round-trip jitter cannot defeat a no-op detection.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::status::normalize_status_name;
use crate::task::{is_date_only, Task};

/// Hash payload with keys in sorted order, matching the stored JSON shape
#[derive(Serialize)]
struct HashPayload<'a> {
    category: Option<&'a str>,
    description: Option<&'a str>,
    end: Option<String>,
    start: Option<String>,
    status: Option<String>,
    title: &'a str,
}

/// Normalize a date value for hashing: timestamps collapse to UTC RFC 3339
/// seconds, date-only values hash verbatim. The same instant written with
/// different offsets must not look like a change.
fn normalize_date_value(value: &str) -> String {
    let trimmed = value.trim();
    if is_date_only(trimmed) {
        return trimmed.to_string();
    }
    match DateTime::parse_from_rfc3339(trimmed) {
        Ok(parsed) => parsed
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        Err(_) => trimmed.to_string(),
    }
}

/// Stable digest over the sync-relevant task fields
pub fn canonical_task_hash(task: &Task) -> String {
    let payload = HashPayload {
        category: task.category.as_deref(),
        description: task.description.as_deref(),
        end: task.end_date.as_deref().map(normalize_date_value),
        start: task.start_date.as_deref().map(normalize_date_value),
        status: task.status.as_deref().map(normalize_status_name),
        title: &task.title,
    };
    // Struct field order is the serialization order, so this is stable.
    let raw = serde_json::to_string(&payload).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
