//! The task model shared by both sync sides
//!
//! A `Task` is the neutral representation a Notion page and a CalDAV event
//! both reduce to. Date values stay in the string forms the backends
//! exchange: date-only `YYYY-MM-DD` or RFC 3339 timestamps.

use serde::{Deserialize, Serialize};

/// A task as seen by the reconciliation engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable Notion page id (dashed UUID form)
    pub notion_id: String,
    pub title: String,
    /// Raw status name; normalized on use, unknown names pass through
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub reminder: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    /// Owning data source id, when known
    pub database_id: Option<String>,
    pub database_name: String,
    pub last_edited_time: Option<String>,
}

impl Task {
    /// A task can only be projected onto the calendar once it has a start
    pub fn has_start(&self) -> bool {
        self.start_date.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// True when a date value carries no time component
pub fn is_date_only(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && !trimmed.contains('T')
}

/// Build the stable event UID for a Notion page
pub fn build_uid(notion_id: &str) -> String {
    format!("notion-{notion_id}@sync")
}

/// Recover the Notion page id from an event UID, if it is one of ours
pub fn notion_id_from_uid(uid: &str) -> Option<String> {
    let rest = uid.strip_prefix("notion-")?;
    let (id, _) = rest.split_once('@')?;
    if id.is_empty() { None } else { Some(id.to_string()) }
}

/// Event resource URL inside the calendar collection
pub fn event_url(calendar_href: &str, notion_id: &str) -> String {
    format!("{}/{notion_id}.ics", calendar_href.trim_end_matches('/'))
}
