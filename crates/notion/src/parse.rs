//! Page parsing
//!
//! Notion pages carry heterogeneous property dictionaries keyed by a type
//! tag (`title`, `status`, `select`, `date`, `rich_text`). Parsing walks
//! the well-known property names first and falls back to type inspection,
//! so renamed columns still sync.

use serde_json::Value;

use notidav_core::Task;

/// Well-known property names tried before type inspection
pub const TITLE_PROPERTY: &str = "Title";
pub const STATUS_PROPERTIES: [&str; 1] = ["Status"];
pub const DATE_PROPERTIES: [&str; 4] = ["Due date", "Due", "Date", "Deadline"];
pub const REMINDER_PROPERTIES: [&str; 1] = ["Reminder"];
pub const CATEGORY_PROPERTIES: [&str; 1] = ["Category"];
pub const DESCRIPTION_PROPERTY: &str = "Description";

/// First non-empty plain text found in a rich-text value
pub fn rich_text_to_plain(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(rich_text_to_plain),
        Value::Object(map) => {
            let text = map
                .get("plain_text")
                .and_then(Value::as_str)
                .or_else(|| map.get("text").and_then(|t| t.get("content")).and_then(Value::as_str))?;
            let trimmed = text.trim();
            if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
        }
        _ => None,
    }
}

fn prop_type<'a>(prop: &'a Value) -> &'a str {
    prop.get("type").and_then(Value::as_str).unwrap_or("")
}

fn extract_title_from_prop(prop: &Value) -> String {
    if prop_type(prop) != "title" {
        return String::new();
    }
    let Some(items) = prop.get("title").and_then(Value::as_array) else {
        return String::new();
    };
    let mut parts: Vec<&str> = Vec::new();
    for item in items {
        let text = item
            .get("plain_text")
            .and_then(Value::as_str)
            .or_else(|| item.get("text").and_then(|t| t.get("content")).and_then(Value::as_str));
        if let Some(text) = text {
            parts.push(text);
        }
    }
    parts.concat().trim().to_string()
}

/// Find a property by preferred names, falling back to the first one of an
/// accepted type
fn find_prop<'a>(
    props: &'a Value,
    names: &[&str],
    accepted_types: &[&str],
) -> Option<&'a Value> {
    let map = props.as_object()?;
    for name in names {
        if let Some(candidate) = map.get(*name) {
            if accepted_types.contains(&prop_type(candidate)) {
                return Some(candidate);
            }
        }
    }
    map.values().find(|candidate| accepted_types.contains(&prop_type(candidate)))
}

fn select_name(prop: &Value) -> Option<String> {
    let data = prop.get("status").or_else(|| prop.get("select"))?;
    data.get("name").and_then(Value::as_str).map(ToString::to_string)
}

fn date_start_end(prop: &Value) -> (Option<String>, Option<String>) {
    let Some(date) = prop.get("date") else {
        return (None, None);
    };
    let start = date.get("start").and_then(Value::as_str).map(ToString::to_string);
    let end = date.get("end").and_then(Value::as_str).map(ToString::to_string);
    (start, end)
}

/// Parse a page object into the neutral task model
pub fn parse_page(page: &Value) -> Task {
    let empty = Value::Object(serde_json::Map::new());
    let props = page.get("properties").unwrap_or(&empty);
    let page_id = page.get("id").and_then(Value::as_str).unwrap_or("").to_string();

    let mut title = props
        .get(TITLE_PROPERTY)
        .map(extract_title_from_prop)
        .unwrap_or_default();
    if title.is_empty() {
        if let Some(map) = props.as_object() {
            title = map
                .values()
                .map(extract_title_from_prop)
                .find(|candidate| !candidate.is_empty())
                .unwrap_or_default();
        }
    }
    if title.is_empty() {
        title = if page_id.is_empty() { "Untitled".to_string() } else { page_id.clone() };
    }

    let status = find_prop(props, &STATUS_PROPERTIES, &["status", "select"]).and_then(select_name);

    let (start_date, end_date) = find_prop(props, &DATE_PROPERTIES, &["date"])
        .map(date_start_end)
        .unwrap_or((None, None));

    let reminder = find_prop(props, &REMINDER_PROPERTIES, &["date"])
        .filter(|prop| {
            // Don't let the due-date property double as the reminder
            find_prop(props, &DATE_PROPERTIES, &["date"])
                .map(|date_prop| !std::ptr::eq(*prop, date_prop))
                .unwrap_or(true)
        })
        .and_then(|prop| date_start_end(prop).0);

    let category = props
        .as_object()
        .and_then(|map| {
            CATEGORY_PROPERTIES.iter().find_map(|name| {
                map.get(*name).filter(|prop| prop_type(prop) == "select")
            })
        })
        .and_then(select_name);

    let description = props
        .get(DESCRIPTION_PROPERTY)
        .filter(|prop| prop_type(prop) == "rich_text")
        .and_then(|prop| prop.get("rich_text"))
        .and_then(rich_text_to_plain);

    let parent = page.get("parent");
    let database_id = parent
        .and_then(|p| p.get("data_source_id").or_else(|| p.get("database_id")))
        .and_then(Value::as_str)
        .map(ToString::to_string);

    Task {
        notion_id: page_id,
        title,
        status,
        start_date,
        end_date,
        reminder,
        category,
        description,
        url: page.get("url").and_then(Value::as_str).map(ToString::to_string),
        database_id,
        database_name: String::new(),
        last_edited_time: page
            .get("last_edited_time")
            .and_then(Value::as_str)
            .map(ToString::to_string),
    }
}

/// Human title of a data source object, walking the usual candidates
pub fn extract_data_source_title(meta: &Value) -> Option<String> {
    let empty = Value::Object(serde_json::Map::new());
    let data_source = meta.get("data_source").unwrap_or(&empty);
    for candidate in [
        meta.get("title"),
        data_source.get("title"),
        meta.get("name"),
        data_source.get("name"),
        meta.get("display_name"),
        data_source.get("display_name"),
    ]
    .into_iter()
    .flatten()
    {
        if let Some(text) = rich_text_to_plain(candidate) {
            return Some(text);
        }
    }
    None
}
