//! The per-item decision function
//!
//! `decide` is pure: given the stored mapping and the two sides' current
//! view of a task, it names the action to take. All transport and state
//! effects happen in the apply phase.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use notidav_core::overdue::parse_iso_datetime;
use notidav_core::{canonical_task_hash, Task};
use notidav_store::MappingRecord;

/// Action chosen for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Noop,
    /// Content already equal; only the stored hashes need refreshing
    Recalibrate,
    CreateCalDav,
    CreateNotion,
    UpdateCalDav,
    UpdateNotion,
    DeleteCalDav,
}

/// Action plus the reason it was chosen (for logs)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncDecision {
    pub action: SyncAction,
    pub detail: &'static str,
}

impl SyncDecision {
    const fn new(action: SyncAction, detail: &'static str) -> Self {
        Self { action, detail }
    }
}

fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    parse_iso_datetime(value, false, Tz::UTC)
}

/// Strictly-later comparison; a present timestamp beats a missing one
pub fn is_later(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => match (parse_ts(a), parse_ts(b)) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        },
        (Some(_), None) => true,
        _ => false,
    }
}

/// The newer of two timestamps, favoring the first on ties
pub fn pick_newer<'a>(a: Option<&'a str>, b: Option<&'a str>) -> Option<&'a str> {
    match (a, b) {
        (Some(a_val), Some(b_val)) => match (parse_ts(a_val), parse_ts(b_val)) {
            (Some(a_ts), Some(b_ts)) => Some(if a_ts >= b_ts { a_val } else { b_val }),
            _ => Some(a_val),
        },
        (Some(a_val), None) => Some(a_val),
        (None, b_val) => b_val,
    }
}

fn hash_matches(stored: Option<&str>, current: &str) -> bool {
    stored.is_some_and(|stored| stored == current)
}

/// Decide the action for one key of the unified key set
pub fn decide(
    mapping: Option<&MappingRecord>,
    notion: Option<&Task>,
    caldav: Option<&Task>,
) -> SyncDecision {
    match (mapping, notion, caldav) {
        (None, Some(task), None) => {
            if task.has_start() {
                SyncDecision::new(SyncAction::CreateCalDav, "new task -> calendar")
            } else {
                SyncDecision::new(SyncAction::Noop, "task has no start date")
            }
        }
        (None, None, Some(_)) => SyncDecision::new(SyncAction::CreateNotion, "new event -> notion"),
        (None, Some(n), Some(c)) => {
            if is_later(n.last_edited_time.as_deref(), c.last_edited_time.as_deref()) {
                SyncDecision::new(SyncAction::UpdateCalDav, "both unmapped; notion newer")
            } else {
                SyncDecision::new(SyncAction::UpdateNotion, "both unmapped; calendar newer")
            }
        }
        (Some(_), Some(task), None) => {
            if task.has_start() {
                SyncDecision::new(SyncAction::CreateCalDav, "event missing -> recreate")
            } else {
                SyncDecision::new(SyncAction::Noop, "task has no start date")
            }
        }
        (Some(_), None, Some(_)) => {
            SyncDecision::new(SyncAction::DeleteCalDav, "task gone -> delete event")
        }
        (Some(record), Some(n), Some(c)) => {
            let notion_hash = canonical_task_hash(n);
            let caldav_hash = canonical_task_hash(c);
            let notion_clean = hash_matches(record.notion_hash.as_deref(), &notion_hash);
            let caldav_clean = hash_matches(record.caldav_hash.as_deref(), &caldav_hash);

            if notion_hash == caldav_hash {
                if notion_clean && caldav_clean {
                    SyncDecision::new(SyncAction::Noop, "no changes")
                } else {
                    SyncDecision::new(SyncAction::Recalibrate, "content equal; stored hashes stale")
                }
            } else if !caldav_clean && notion_clean {
                SyncDecision::new(SyncAction::UpdateNotion, "calendar changed")
            } else if caldav_clean && !notion_clean {
                SyncDecision::new(SyncAction::UpdateCalDav, "notion changed")
            } else if is_later(n.last_edited_time.as_deref(), c.last_edited_time.as_deref()) {
                SyncDecision::new(SyncAction::UpdateCalDav, "conflict; notion wins")
            } else {
                SyncDecision::new(SyncAction::UpdateNotion, "conflict; calendar wins")
            }
        }
        _ => SyncDecision::new(SyncAction::Noop, "nothing to sync"),
    }
}
