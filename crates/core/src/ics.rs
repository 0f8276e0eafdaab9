//! iCalendar codec
//!
//! Converts a task into a single-VEVENT VCALENDAR (RFC 5545, with RFC 7986
//! COLOR) and parses such an event back into task fields. Identity is
//! carried purely by the UID; everything else is plain property text.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use icalendar::{Alarm, Calendar, Component, Event, EventLike};

use crate::error::{SyncError, SyncResult};
use crate::status::{clean_summary_title, split_summary_status, status_to_emoji, TaskStatus};
use crate::task::{build_uid, is_date_only, notion_id_from_uid};

/// Everything the emitter needs for one event
#[derive(Debug, Default, Clone)]
pub struct EventInput<'a> {
    pub notion_id: &'a str,
    pub title: &'a str,
    /// Display status, already overdue-resolved
    pub status_name: &'a str,
    pub start: Option<&'a str>,
    pub end: Option<&'a str>,
    pub reminder: Option<&'a str>,
    pub description: Option<&'a str>,
    pub category: Option<&'a str>,
    pub color: Option<&'a str>,
    pub url: Option<&'a str>,
}

/// Fields recovered from an event resource
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub notion_id: Option<String>,
    pub title: String,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub last_modified: Option<String>,
    pub reminder: Option<String>,
    pub category: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
}

fn compose_description(category: Option<&str>, description: Option<&str>) -> String {
    if let Some(text) = description {
        if !text.is_empty() {
            return text.to_string();
        }
    }
    if let Some(category) = category {
        if !category.is_empty() {
            return format!("Category: {category}");
        }
    }
    String::new()
}

fn parse_timestamp(value: &str) -> SyncResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| SyncError::InvalidDate(value.to_string()))
}

fn parse_date(value: &str) -> SyncResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| SyncError::InvalidDate(value.to_string()))
}

/// Serialize a task as a VCALENDAR with one VEVENT
pub fn build_event(input: &EventInput<'_>) -> SyncResult<String> {
    let mut event = Event::new();
    event.uid(&build_uid(input.notion_id));

    let emoji = {
        let resolved = status_to_emoji(input.status_name);
        if resolved.is_empty() { TaskStatus::Todo.emoji() } else { resolved }
    };
    let stripped = clean_summary_title(input.title);
    let payload = if stripped.trim().is_empty() { "Untitled" } else { stripped.trim() };
    event.summary(&format!("{emoji}{payload}"));

    if let Some(color) = input.color.filter(|c| !c.is_empty()) {
        event.add_property("COLOR", color);
    }
    if let Some(category) = input.category.filter(|c| !c.is_empty()) {
        event.add_property("CATEGORIES", category);
    }

    let now = Utc::now();
    event.timestamp(now);
    // RFC 5545 wants basic-format timestamps; chrono's to_rfc3339 emits the
    // extended form, which some clients choke on during sync.
    event.add_property("LAST-MODIFIED", &now.format("%Y%m%dT%H%M%SZ").to_string());

    let mut timed_start: Option<DateTime<Utc>> = None;
    if let Some(start_iso) = input.start {
        if is_date_only(start_iso) {
            let start = parse_date(start_iso)?;
            // All-day DTEND is exclusive, so the stored end gains a day
            let end = match input.end {
                Some(end_iso) => parse_date(end_iso)? + Duration::days(1),
                None => start + Duration::days(1),
            };
            event.starts(start);
            event.ends(end);
        } else {
            let start = parse_timestamp(start_iso)?;
            let end = match input.end {
                Some(end_iso) => parse_timestamp(end_iso)?,
                None => start,
            };
            event.starts(start);
            event.ends(end);
            timed_start = Some(start);
        }
    }

    let description = compose_description(input.category, input.description);
    if !description.is_empty() {
        event.description(&description);
    }

    let url = input.url.map(str::to_string).unwrap_or_else(|| {
        format!("https://www.notion.so/{}", input.notion_id.replace('-', ""))
    });
    event.add_property("URL", &url);

    if let (Some(reminder_iso), Some(start)) = (input.reminder, timed_start) {
        let reminder = parse_timestamp(reminder_iso)?;
        let minutes_before = (start - reminder).num_minutes();
        if minutes_before > 0 {
            event.alarm(Alarm::display(
                &format!("Reminder: {payload}"),
                Duration::minutes(-minutes_before),
            ));
        }
    }

    let mut calendar = Calendar::new();
    // icalendar adds PRODID and VERSION itself
    calendar.push(event);
    Ok(calendar.to_string())
}

/// Join folded continuation lines (RFC 5545 §3.1)
fn unfold_lines(ics_text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in ics_text.lines() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(stripped) = line.strip_prefix(' ').or_else(|| line.strip_prefix('\t')) {
            if let Some(last) = lines.last_mut() {
                last.push_str(stripped);
                continue;
            }
        }
        lines.push(line.to_string());
    }
    lines
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(escaped) => out.push(escaped),
            None => out.push('\\'),
        }
    }
    out
}

/// Header-block split of a description: recognized `Key: value` lines become
/// headers, everything else is body text
fn parse_description_fields(text: &str) -> (HashMap<String, String>, Option<String>) {
    const HEADER_KEYS: [&str; 4] = ["Category", "Status", "Source", "Description"];

    let (head, explicit_body) = match text.split_once("\n\n") {
        Some((head, body)) => (head, Some(body.trim().to_string()).filter(|b| !b.is_empty())),
        None => (text, None),
    };
    let candidates: Vec<&str> = if head.contains('\n') {
        head.lines().map(str::trim).filter(|line| !line.is_empty()).collect()
    } else {
        head.split('|').map(str::trim).filter(|part| !part.is_empty()).collect()
    };

    let mut headers = HashMap::new();
    let mut leftovers: Vec<&str> = Vec::new();
    for item in candidates {
        if let Some((key, value)) = item.split_once(':') {
            let key = key.trim();
            if HEADER_KEYS.contains(&key) {
                headers.insert(key.to_string(), value.trim().to_string());
                continue;
            }
        }
        leftovers.push(item);
    }

    let body = explicit_body
        .or_else(|| {
            if leftovers.is_empty() { None } else { Some(leftovers.join("\n")) }
        })
        .or_else(|| headers.get("Description").cloned())
        .filter(|body| !body.is_empty());
    (headers, body)
}

fn parse_ics_date(value: &str) -> Option<String> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d")
        .ok()
        .map(|date| date.format("%Y-%m-%d").to_string())
}

fn parse_ics_datetime(value: &str) -> Option<String> {
    let trimmed = value.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y%m%dT%H%M%SZ")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y%m%dT%H%M%S"))
        .ok()
        .map(|naive| naive.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn parse_ics_date_value(value: &str, params: Option<&str>) -> Option<String> {
    let is_date = params
        .is_some_and(|p| p.contains("VALUE=DATE") && !p.contains("VALUE=DATE-TIME"))
        || (value.len() == 8 && !value.contains('T'));
    if is_date { parse_ics_date(value) } else { parse_ics_datetime(value) }
}

/// Minutes encoded in a negative ISO 8601 duration such as `-PT30M`
fn negative_duration_minutes(value: &str) -> Option<i64> {
    let rest = value.trim().strip_prefix("-P")?;
    let rest = rest.strip_prefix('T').unwrap_or(rest);
    let mut minutes: i64 = 0;
    let mut number = String::new();
    for c in rest.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let amount: i64 = number.parse().ok()?;
        number.clear();
        match c {
            'H' => minutes += amount * 60,
            'M' => minutes += amount,
            'S' => minutes += amount / 60,
            'D' => minutes += amount * 24 * 60,
            'W' => minutes += amount * 7 * 24 * 60,
            _ => return None,
        }
    }
    if minutes > 0 { Some(minutes) } else { None }
}

/// Parse the single VEVENT out of an event resource
pub fn parse_event(ics_text: &str) -> SyncResult<ParsedEvent> {
    let mut parsed = ParsedEvent::default();
    let mut uid: Option<String> = None;
    let mut summary_status: Option<TaskStatus> = None;
    let mut header_status: Option<String> = None;
    let mut trigger_minutes: Option<i64> = None;

    let mut in_vevent = false;
    let mut in_valarm = false;
    let mut seen_vevent = false;

    for line in unfold_lines(ics_text) {
        match line.as_str() {
            "BEGIN:VEVENT" => {
                in_vevent = true;
                seen_vevent = true;
                continue;
            }
            "END:VEVENT" => break,
            "BEGIN:VALARM" => {
                in_valarm = true;
                continue;
            }
            "END:VALARM" => {
                in_valarm = false;
                continue;
            }
            _ => {}
        }
        if !in_vevent {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (name, params) = match key.split_once(';') {
            Some((name, params)) => (name, Some(params)),
            None => (key, None),
        };

        if in_valarm {
            if name == "TRIGGER" {
                trigger_minutes = negative_duration_minutes(value);
            }
            continue;
        }

        match name {
            "UID" => uid = Some(value.to_string()),
            "SUMMARY" => {
                let text = unescape_text(value);
                let (status, title) = split_summary_status(&text);
                summary_status = status;
                parsed.title = title;
            }
            "DESCRIPTION" => {
                let text = unescape_text(value);
                let (headers, body) = parse_description_fields(&text);
                if let Some(category) = headers.get("Category") {
                    parsed.category = Some(category.clone());
                }
                header_status = headers.get("Status").cloned();
                parsed.description = body;
            }
            "CATEGORIES" => {
                let first = unescape_text(value);
                let first = first.split(',').next().unwrap_or("").trim().to_string();
                if !first.is_empty() {
                    parsed.category = Some(first);
                }
            }
            "COLOR" => parsed.color = Some(value.trim().to_string()),
            "DTSTART" => parsed.start_date = parse_ics_date_value(value, params),
            "DTEND" => parsed.end_date = parse_ics_date_value(value, params),
            "LAST-MODIFIED" => parsed.last_modified = parse_ics_datetime(value),
            _ => {}
        }
    }

    if !seen_vevent {
        return Err(SyncError::InvalidIcs("no VEVENT component".to_string()));
    }

    parsed.status = summary_status
        .map(|status| status.as_str().to_string())
        .or(header_status);
    parsed.notion_id = uid.as_deref().and_then(notion_id_from_uid);

    if let (Some(minutes), Some(start)) = (trigger_minutes, parsed.start_date.as_deref()) {
        if !is_date_only(start) {
            if let Ok(start) = parse_timestamp(start) {
                let reminder = start - Duration::minutes(minutes);
                parsed.reminder = Some(reminder.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::canonical_task_hash;
    use crate::task::Task;

    fn build_sample(input: &EventInput<'_>) -> String {
        build_event(input).expect("build_event failed")
    }

    #[test]
    fn test_build_event_all_day_expands_dates_and_description() {
        let ics = build_sample(&EventInput {
            notion_id: "task-123",
            title: "Plan trip",
            status_name: "Todo",
            start: Some("2024-06-01"),
            end: None,
            description: Some("Pack bags"),
            category: Some("Travel"),
            color: Some("#FF7F00"),
            url: Some("https://www.notion.so/task123"),
            ..EventInput::default()
        });

        assert!(ics.contains("BEGIN:VCALENDAR"));
        assert!(ics.contains("UID:notion-task-123@sync"));
        assert!(ics.contains("SUMMARY:○ Plan trip"));
        // All-day events use date values; the exclusive end lands a day later
        assert!(ics.contains("DTSTART;VALUE=DATE:20240601"));
        assert!(ics.contains("DTEND;VALUE=DATE:20240602"));
        assert!(ics.contains("DESCRIPTION:Pack bags"));
        assert!(ics.contains("COLOR:#FF7F00"));
        assert!(ics.contains("CATEGORIES:Travel"));
        assert!(ics.contains("LAST-MODIFIED:"));
    }

    #[test]
    fn test_build_event_all_day_range_adds_extra_day() {
        let ics = build_sample(&EventInput {
            notion_id: "task-range",
            title: "Weekend trip",
            status_name: "Todo",
            start: Some("2025-11-08"),
            end: Some("2025-11-09"),
            ..EventInput::default()
        });

        assert!(ics.contains("DTSTART;VALUE=DATE:20251108"));
        // Exclusive end: both the 8th and the 9th stay visible
        assert!(ics.contains("DTEND;VALUE=DATE:20251110"));
    }

    #[test]
    fn test_build_event_timed_uses_utc_and_reminder() {
        let ics = build_sample(&EventInput {
            notion_id: "task-456",
            title: "Demo",
            status_name: "in progress",
            start: Some("2024-06-01T10:00:00-04:00"),
            end: Some("2024-06-01T11:00:00-04:00"),
            reminder: Some("2024-06-01T09:30:00-04:00"),
            ..EventInput::default()
        });

        assert!(ics.contains("SUMMARY:⊖ Demo"));
        assert!(ics.contains("DTSTART:20240601T140000Z"));
        assert!(ics.contains("DTEND:20240601T150000Z"));
        assert!(ics.contains("BEGIN:VALARM"));
        assert!(ics.contains("ACTION:DISPLAY"));
        assert!(ics.contains("-PT30M"));
    }

    #[test]
    fn test_build_event_timed_without_end_defaults_to_start() {
        let ics = build_sample(&EventInput {
            notion_id: "task-no-end",
            title: "Quick check",
            status_name: "Todo",
            start: Some("2024-06-01T10:00:00Z"),
            ..EventInput::default()
        });

        assert!(ics.contains("DTSTART:20240601T100000Z"));
        assert!(ics.contains("DTEND:20240601T100000Z"));
    }

    #[test]
    fn test_build_event_reminder_after_start_is_dropped() {
        let ics = build_sample(&EventInput {
            notion_id: "task-late",
            title: "Late alarm",
            status_name: "Todo",
            start: Some("2024-06-01T10:00:00Z"),
            reminder: Some("2024-06-01T10:30:00Z"),
            ..EventInput::default()
        });
        assert!(!ics.contains("BEGIN:VALARM"));
    }

    #[test]
    fn test_build_event_unknown_status_falls_back_to_todo_emoji() {
        let ics = build_sample(&EventInput {
            notion_id: "task-odd",
            title: "Odd",
            status_name: "Someday",
            ..EventInput::default()
        });
        assert!(ics.contains("SUMMARY:○ Odd"));
    }

    #[test]
    fn test_build_event_strips_prior_round_trip_prefix() {
        let ics = build_sample(&EventInput {
            notion_id: "task-re",
            title: "○ Todo: Buy milk",
            status_name: "Todo",
            ..EventInput::default()
        });
        assert!(ics.contains("SUMMARY:○ Buy milk"));
    }

    #[test]
    fn test_uid_survives_round_trip() {
        let ics = build_sample(&EventInput {
            notion_id: "1234abcd-1234-abcd-1234-abcd1234abcd",
            title: "Plan",
            status_name: "Todo",
            start: Some("2025-06-01"),
            ..EventInput::default()
        });
        let parsed = parse_event(&ics).expect("parse failed");
        assert_eq!(
            parsed.notion_id.as_deref(),
            Some("1234abcd-1234-abcd-1234-abcd1234abcd")
        );
    }

    #[test]
    fn test_hash_symmetry_through_round_trip() {
        let task = Task {
            notion_id: "abc-def".into(),
            title: "Demo".into(),
            status: Some("In progress".into()),
            start_date: Some("2025-06-01T14:00:00Z".into()),
            end_date: Some("2025-06-01T15:00:00Z".into()),
            reminder: Some("2025-06-01T13:30:00Z".into()),
            category: Some("Work".into()),
            description: Some("Bring slides".into()),
            ..Task::default()
        };
        let ics = build_sample(&EventInput {
            notion_id: &task.notion_id,
            title: &task.title,
            status_name: task.status.as_deref().unwrap(),
            start: task.start_date.as_deref(),
            end: task.end_date.as_deref(),
            reminder: task.reminder.as_deref(),
            description: task.description.as_deref(),
            category: task.category.as_deref(),
            ..EventInput::default()
        });
        let parsed = parse_event(&ics).expect("parse failed");
        let round_tripped = Task {
            notion_id: parsed.notion_id.clone().unwrap(),
            title: parsed.title.clone(),
            status: parsed.status.clone(),
            start_date: parsed.start_date.clone(),
            end_date: parsed.end_date.clone(),
            reminder: parsed.reminder.clone(),
            category: parsed.category.clone(),
            description: parsed.description.clone(),
            ..Task::default()
        };
        assert_eq!(canonical_task_hash(&task), canonical_task_hash(&round_tripped));
        assert_eq!(parsed.reminder.as_deref(), Some("2025-06-01T13:30:00Z"));
    }

    #[test]
    fn test_parse_foreign_event() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   VERSION:2.0\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:notion-X@sync\r\n\
                   SUMMARY:○ Buy milk\r\n\
                   DTSTART;VALUE=DATE:20250601\r\n\
                   DTEND;VALUE=DATE:20250602\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR\r\n";
        let parsed = parse_event(ics).expect("parse failed");
        assert_eq!(parsed.notion_id.as_deref(), Some("X"));
        assert_eq!(parsed.title, "Buy milk");
        assert_eq!(parsed.status.as_deref(), Some("Todo"));
        assert_eq!(parsed.start_date.as_deref(), Some("2025-06-01"));
        assert_eq!(parsed.end_date.as_deref(), Some("2025-06-02"));
    }

    #[test]
    fn test_parse_status_header_fallback() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:notion-Y@sync\r\n\
                   SUMMARY:No emoji here\r\n\
                   DESCRIPTION:Status: Completed | Category: Chores\r\n\
                   DTSTART:20250601T100000Z\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR\r\n";
        let parsed = parse_event(ics).expect("parse failed");
        assert_eq!(parsed.status.as_deref(), Some("Completed"));
        assert_eq!(parsed.category.as_deref(), Some("Chores"));
        assert_eq!(parsed.description, None);
    }

    #[test]
    fn test_parse_category_fallback_description() {
        let ics = build_sample(&EventInput {
            notion_id: "cat-only",
            title: "Chore",
            status_name: "Todo",
            start: Some("2025-06-01"),
            category: Some("Home"),
            ..EventInput::default()
        });
        assert!(ics.contains("DESCRIPTION:Category: Home"));
        let parsed = parse_event(&ics).expect("parse failed");
        assert_eq!(parsed.category.as_deref(), Some("Home"));
        assert_eq!(parsed.description, None);
    }

    #[test]
    fn test_parse_rejects_payload_without_vevent() {
        let err = parse_event("BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_parse_unfolds_long_lines() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:notion-Z@sync\r\n\
                   SUMMARY:○ A rather long title that certainly exceeds the se\r\n venty-five octet line limit of the format\r\n\
                   DTSTART:20250601T100000Z\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR\r\n";
        let parsed = parse_event(ics).expect("parse failed");
        assert!(parsed.title.ends_with("line limit of the format"));
    }
}
