//! notidav core - Domain logic and models
//!
//! This crate contains pure domain logic with no I/O operations: the task
//! model, canonical status handling, the canonical task hash, the iCalendar
//! codec and the overdue/timezone rules.

pub mod error;
pub mod hash;
pub mod ics;
pub mod overdue;
pub mod status;
pub mod task;
pub mod timezone;

pub use error::SyncError;
pub use hash::canonical_task_hash;
pub use status::{normalize_status_name, status_to_emoji, TaskStatus};
pub use task::{build_uid, event_url, is_date_only, notion_id_from_uid, Task};
pub use timezone::{parse_timezone, resolve_date_only_tz};
