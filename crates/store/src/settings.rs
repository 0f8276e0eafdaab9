//! Calendar settings persisted one key per field
//!
//! Unknown fields survive a load/save cycle via the flattened map, so a
//! newer deployment never silently drops what an older one wrote.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Full calendar rewrite cadence when nothing is configured
pub const DEFAULT_FULL_SYNC_MINUTES: u64 = 30;

/// Default display color for the synced calendar
pub const DEFAULT_CALENDAR_COLOR: &str = "#FF7F00";

/// Default calendar display name
pub const DEFAULT_CALENDAR_NAME: &str = "Notion";

/// Per-account configuration and cursors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_name: Option<String>,
    /// Normalized `#RRGGBB`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_timezone: Option<String>,
    /// Override zone for floating (all-day) values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_only_timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_sync_interval_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_full_sync: Option<String>,
    /// "Changed since" ISO timestamp for the Notion side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notion_sync_token: Option<String>,
    /// Opaque RFC 6578 token for the CalDAV side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caldav_sync_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_verification_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_webhook: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Settings {
    /// Effective full sync cadence
    pub fn full_sync_interval_minutes(&self) -> u64 {
        self.full_sync_interval_minutes.unwrap_or(DEFAULT_FULL_SYNC_MINUTES)
    }

    /// Build from a field-name → decoded-value map
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        serde_json::from_value(Value::Object(fields)).unwrap_or_default()
    }

    /// Flatten back into a field map for per-key persistence
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
