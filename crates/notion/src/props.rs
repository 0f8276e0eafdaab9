//! Schema inspection and typed write payloads
//!
//! Writes never guess blindly: property names are resolved against the
//! target schema by type, and status values are only written when they
//! match an existing option case-insensitively.

use serde_json::{json, Map, Value};

use notidav_core::task::{is_date_only, Task};

use crate::parse::{
    CATEGORY_PROPERTIES, DATE_PROPERTIES, DESCRIPTION_PROPERTY, REMINDER_PROPERTIES,
    STATUS_PROPERTIES, TITLE_PROPERTY,
};

/// Whether a status-like property is `status` or `select` flavored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Status,
    Select,
}

/// Property names picked for writing, with status metadata
#[derive(Debug, Clone, Default)]
pub struct ResolvedProperties {
    pub title: Option<String>,
    pub status: Option<(String, StatusKind, Vec<String>)>,
    pub date: Option<String>,
    pub reminder: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

fn prop_type<'a>(prop: &'a Value) -> &'a str {
    prop.get("type").and_then(Value::as_str).unwrap_or("")
}

/// A schema is task-bearing when it has at least one date property and one
/// status or select property
pub fn is_task_schema(properties: &Value) -> bool {
    let Some(map) = properties.as_object() else {
        return false;
    };
    let has_date = map.values().any(|prop| prop_type(prop) == "date");
    let has_status = map
        .values()
        .any(|prop| matches!(prop_type(prop), "status" | "select"));
    has_date && has_status
}

fn pick_name(
    map: &Map<String, Value>,
    preferred: &[&str],
    accepted_types: &[&str],
) -> Option<String> {
    for name in preferred {
        if let Some(prop) = map.get(*name) {
            if accepted_types.contains(&prop_type(prop)) {
                return Some((*name).to_string());
            }
        }
    }
    map.iter()
        .find(|(_, prop)| accepted_types.contains(&prop_type(prop)))
        .map(|(name, _)| name.clone())
}

fn status_options(prop: &Value) -> Vec<String> {
    prop.get("status")
        .or_else(|| prop.get("select"))
        .and_then(|data| data.get("options"))
        .and_then(Value::as_array)
        .map(|options| {
            options
                .iter()
                .filter_map(|option| option.get("name").and_then(Value::as_str))
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Resolve write-side property names by inspecting the target schema
pub fn resolve_property_names(properties: &Value) -> ResolvedProperties {
    let Some(map) = properties.as_object() else {
        return ResolvedProperties::default();
    };

    let status = pick_name(map, &STATUS_PROPERTIES, &["status", "select"]).map(|name| {
        let prop = &map[&name];
        let kind = if prop_type(prop) == "status" { StatusKind::Status } else { StatusKind::Select };
        let options = status_options(prop);
        (name, kind, options)
    });

    // The due-date property must not double as the reminder slot
    let date = pick_name(map, &DATE_PROPERTIES, &["date"]);
    let reminder = pick_name(map, &REMINDER_PROPERTIES, &["date"])
        .filter(|name| Some(name) != date.as_ref());

    // Nor may a select-flavored status double as the category
    let category = pick_name(map, &CATEGORY_PROPERTIES, &["select"]).filter(|name| {
        status
            .as_ref()
            .is_none_or(|(status_name, ..)| status_name != name)
    });

    ResolvedProperties {
        title: pick_name(map, &[TITLE_PROPERTY], &["title"]),
        status,
        date,
        reminder,
        category,
        description: pick_name(map, &[DESCRIPTION_PROPERTY], &["rich_text"]),
    }
}

/// Names assumed when the target schema could not be loaded
pub fn default_property_names() -> ResolvedProperties {
    ResolvedProperties {
        title: Some(TITLE_PROPERTY.to_string()),
        status: None,
        date: Some(DATE_PROPERTIES[0].to_string()),
        reminder: Some(REMINDER_PROPERTIES[0].to_string()),
        category: None,
        description: Some(DESCRIPTION_PROPERTY.to_string()),
    }
}

fn rich_text_value(content: &str) -> Value {
    json!([{ "text": { "content": content } }])
}

/// Build the `properties` payload for a page create or update
pub fn build_page_properties(task: &Task, resolved: &ResolvedProperties) -> Value {
    let mut properties = Map::new();

    if let Some(name) = &resolved.title {
        properties.insert(name.clone(), json!({ "title": rich_text_value(&task.title) }));
    }

    if let Some((name, kind, options)) = &resolved.status {
        if let Some(status) = task.status.as_deref().filter(|s| !s.trim().is_empty()) {
            // Only an exact (case-insensitive) option match may be written
            let matched = options
                .iter()
                .find(|option| option.to_lowercase() == status.trim().to_lowercase());
            match matched {
                Some(option) => {
                    let key = match kind {
                        StatusKind::Status => "status",
                        StatusKind::Select => "select",
                    };
                    properties.insert(name.clone(), json!({ key: { "name": option } }));
                }
                None => {
                    tracing::warn!(
                        "status {status:?} has no option in property {name:?}; dropping"
                    );
                }
            }
        }
    }

    if let Some(name) = &resolved.date {
        if let Some(start) = task.start_date.as_deref() {
            // Single-day all-day ranges collapse to {start, end: null}
            let end = match task.end_date.as_deref() {
                Some(end) if is_date_only(start) && end == start => None,
                other => other,
            };
            properties.insert(
                name.clone(),
                json!({ "date": { "start": start, "end": end } }),
            );
        }
    }

    if let Some(name) = &resolved.reminder {
        if let Some(reminder) = task.reminder.as_deref() {
            properties.insert(name.clone(), json!({ "date": { "start": reminder } }));
        }
    }

    if let Some(name) = &resolved.category {
        if let Some(category) = task.category.as_deref().filter(|c| !c.is_empty()) {
            properties.insert(name.clone(), json!({ "select": { "name": category } }));
        }
    }

    if let Some(name) = &resolved.description {
        if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
            properties.insert(name.clone(), json!({ "rich_text": rich_text_value(description) }));
        }
    }

    Value::Object(properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_schema() -> Value {
        json!({
            "Title": {"type": "title", "title": {}},
            "Status": {"type": "status", "status": {"options": [
                {"name": "Todo"}, {"name": "In progress"}, {"name": "Completed"}
            ]}},
            "Due date": {"type": "date", "date": {}},
            "Reminder": {"type": "date", "date": {}},
            "Category": {"type": "select", "select": {"options": [{"name": "Work"}]}},
            "Description": {"type": "rich_text", "rich_text": {}}
        })
    }

    #[test]
    fn test_is_task_schema() {
        assert!(is_task_schema(&sample_schema()));
        assert!(!is_task_schema(&json!({
            "Title": {"type": "title"},
            "Status": {"type": "status"}
        })));
        assert!(!is_task_schema(&json!({
            "Title": {"type": "title"},
            "Due": {"type": "date"}
        })));
        assert!(!is_task_schema(&json!(null)));
    }

    #[test]
    fn test_resolve_property_names_prefers_well_known() {
        let resolved = resolve_property_names(&sample_schema());
        assert_eq!(resolved.title.as_deref(), Some("Title"));
        let (status_name, kind, options) = resolved.status.unwrap();
        assert_eq!(status_name, "Status");
        assert_eq!(kind, StatusKind::Status);
        assert_eq!(options.len(), 3);
        assert_eq!(resolved.date.as_deref(), Some("Due date"));
        assert_eq!(resolved.reminder.as_deref(), Some("Reminder"));
        assert_eq!(resolved.category.as_deref(), Some("Category"));
        assert_eq!(resolved.description.as_deref(), Some("Description"));
    }

    #[test]
    fn test_resolve_property_names_by_type_inspection() {
        let schema = json!({
            "Name": {"type": "title", "title": {}},
            "Zustand": {"type": "select", "select": {"options": [{"name": "Done"}]}},
            "Frist": {"type": "date", "date": {}}
        });
        let resolved = resolve_property_names(&schema);
        assert_eq!(resolved.title.as_deref(), Some("Name"));
        let (status_name, kind, _) = resolved.status.unwrap();
        assert_eq!(status_name, "Zustand");
        assert_eq!(kind, StatusKind::Select);
        assert_eq!(resolved.date.as_deref(), Some("Frist"));
        // The lone date property serves as the due date, not the reminder
        assert_eq!(resolved.reminder, None);
    }

    fn task() -> Task {
        Task {
            notion_id: "p1".into(),
            title: "Buy milk".into(),
            status: Some("todo".into()),
            start_date: Some("2025-06-01".into()),
            end_date: Some("2025-06-01".into()),
            category: Some("Work".into()),
            description: Some("2%".into()),
            ..Task::default()
        }
    }

    #[test]
    fn test_build_page_properties_collapses_single_day_range() {
        let resolved = resolve_property_names(&sample_schema());
        let properties = build_page_properties(&task(), &resolved);
        assert_eq!(
            properties["Due date"],
            json!({"date": {"start": "2025-06-01", "end": null}})
        );
    }

    #[test]
    fn test_build_page_properties_status_case_insensitive_match() {
        let resolved = resolve_property_names(&sample_schema());
        let properties = build_page_properties(&task(), &resolved);
        // "todo" matched the "Todo" option by case-insensitive comparison
        assert_eq!(properties["Status"], json!({"status": {"name": "Todo"}}));
    }

    #[test]
    fn test_build_page_properties_drops_unknown_status() {
        let mut task = task();
        task.status = Some("Blocked".into());
        let resolved = resolve_property_names(&sample_schema());
        let properties = build_page_properties(&task, &resolved);
        assert!(properties.get("Status").is_none());
        assert_eq!(properties["Title"], json!({"title": [{"text": {"content": "Buy milk"}}]}));
    }

    #[test]
    fn test_build_page_properties_keeps_timed_range() {
        let mut task = task();
        task.start_date = Some("2025-06-01T10:00:00Z".into());
        task.end_date = Some("2025-06-01T11:00:00Z".into());
        let resolved = resolve_property_names(&sample_schema());
        let properties = build_page_properties(&task, &resolved);
        assert_eq!(
            properties["Due date"],
            json!({"date": {"start": "2025-06-01T10:00:00Z", "end": "2025-06-01T11:00:00Z"}})
        );
    }
}
