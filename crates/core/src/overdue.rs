//! Overdue derivation
//!
//! A task shows as `Overdue` on the calendar when its due timestamp has
//! passed, without ever mutating the Notion-side status. Date-only dues
//! use end-of-day in the configured floating timezone as the cutoff.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::status::{normalize_status_name, TaskStatus};
use crate::task::{is_date_only, Task};

/// Parse a backend date value into a UTC instant.
///
/// Date-only values are anchored in `date_only_tz`, at midnight or at
/// 23:59:59 when `end_of_day` is requested. Timestamps without an offset
/// are treated as UTC.
pub fn parse_iso_datetime(value: &str, end_of_day: bool, date_only_tz: Tz) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if is_date_only(trimmed) {
        let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()?;
        let naive = if end_of_day {
            date.and_hms_opt(23, 59, 59)?
        } else {
            date.and_hms_opt(0, 0, 0)?
        };
        let local = date_only_tz.from_local_datetime(&naive).earliest()?;
        return Some(local.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Offset-less timestamps occasionally appear; read them as UTC
    chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Whether the task's due instant lies strictly in the past
pub fn is_overdue(task: &Task, date_only_tz: Tz, now: DateTime<Utc>) -> bool {
    if task.start_date.is_none() && task.end_date.is_none() {
        return false;
    }
    let raw_status = task.status.as_deref().unwrap_or("");
    if TaskStatus::from_name(raw_status).is_some_and(TaskStatus::is_final) {
        return false;
    }
    let due_source = task.end_date.as_deref().or(task.start_date.as_deref());
    let Some(due_source) = due_source else {
        return false;
    };
    let all_day_due = is_date_only(due_source);
    match parse_iso_datetime(due_source, all_day_due, date_only_tz) {
        Some(due) => due < now,
        None => false,
    }
}

/// Display status for the calendar: the normalized status, with `Overdue`
/// substituted when the due date has passed
pub fn status_for_task(task: &Task, date_only_tz: Tz, now: DateTime<Utc>) -> String {
    if is_overdue(task, date_only_tz, now) {
        return TaskStatus::Overdue.as_str().to_string();
    }
    let raw = task.status.as_deref().unwrap_or("");
    if raw.trim().is_empty() {
        return TaskStatus::Todo.as_str().to_string();
    }
    normalize_status_name(raw)
}
