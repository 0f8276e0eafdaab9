//! Typed state store over the key/value substrate
//!
//! Key schema:
//!
//! | Prefix | Purpose |
//! |---|---|
//! | `settings:value:<field>` | One JSON-encoded value per settings field |
//! | `mapping:record:<sync_id>` | MappingRecord JSON |
//! | `mapping:index:notion:<page_id>` | Value = sync_id |
//! | `mapping:index:caldav:<uid>` | Value = sync_id |
//!
//! Any individual substrate failure is logged and treated as absence; a
//! sync pass never aborts because one key read failed. Readers tolerate
//! the substrate's eventual consistency by re-reading on the next pass.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use notidav_core::task::build_uid;

use crate::kv::KeyValueStore;
use crate::settings::Settings;

const SETTINGS_KEY: &str = "settings"; // legacy monolithic blob
const SETTINGS_VALUE_PREFIX: &str = "settings:value:";
const MAPPING_PREFIX: &str = "mapping:record:";
const INDEX_NOTION_PREFIX: &str = "mapping:index:notion:";
const INDEX_CALDAV_PREFIX: &str = "mapping:index:caldav:";

/// Persistent link between one Notion page and one CalDAV event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub sync_id: String,
    pub notion_page_id: String,
    pub caldav_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caldav_etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caldav_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notion_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notion_last_edited: Option<String>,
    pub last_sync_time: String,
}

impl MappingRecord {
    /// Fresh record for a page, UID derived per the identity rule
    pub fn new(notion_page_id: &str) -> Self {
        Self {
            sync_id: Uuid::new_v4().to_string(),
            notion_page_id: notion_page_id.to_string(),
            caldav_uid: build_uid(notion_page_id),
            caldav_etag: None,
            caldav_hash: None,
            notion_hash: None,
            notion_last_edited: None,
            last_sync_time: now_iso(),
        }
    }

    /// Touch the sync timestamp after an update
    pub fn touch(&mut self) {
        self.last_sync_time = now_iso();
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// State store facade used by the engine and the admin surface
#[derive(Clone)]
pub struct StateStore {
    kv: Arc<dyn KeyValueStore>,
}

impl StateStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    // Substrate access with the degrade-to-absence policy applied

    async fn kv_get(&self, key: &str) -> Option<String> {
        match self.kv.get(key).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("state read failed for {key}: {err}");
                None
            }
        }
    }

    async fn kv_put(&self, key: &str, value: &str) {
        if let Err(err) = self.kv.put(key, value).await {
            tracing::warn!("state write failed for {key}: {err}");
        }
    }

    async fn kv_delete(&self, key: &str) {
        if let Err(err) = self.kv.delete(key).await {
            tracing::warn!("state delete failed for {key}: {err}");
        }
    }

    async fn kv_list(&self, prefix: &str) -> Vec<String> {
        match self.kv.list(prefix).await {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!("state list failed for {prefix}: {err}");
                Vec::new()
            }
        }
    }

    // Settings -----------------------------------------------------------

    fn field_key(field: &str) -> String {
        format!("{SETTINGS_VALUE_PREFIX}{field}")
    }

    async fn write_field(&self, field: &str, value: &Value) {
        match serde_json::to_string(value) {
            Ok(payload) => self.kv_put(&Self::field_key(field), &payload).await,
            Err(err) => tracing::warn!("cannot encode settings field {field}: {err}"),
        }
    }

    /// Convert the old monolithic settings blob into per-field keys
    async fn migrate_legacy(&self) {
        let Some(raw) = self.kv_get(SETTINGS_KEY).await else {
            return;
        };
        let Ok(Value::Object(data)) = serde_json::from_str::<Value>(&raw) else {
            return;
        };
        tracing::info!("migrating legacy settings blob into per-field keys");
        for (field, value) in &data {
            if !value.is_null() {
                self.write_field(field, value).await;
            }
        }
        self.kv_delete(SETTINGS_KEY).await;
    }

    /// Load all settings fields merged into one struct
    pub async fn load_settings(&self) -> Settings {
        self.migrate_legacy().await;
        let mut fields = serde_json::Map::new();
        for key in self.kv_list(SETTINGS_VALUE_PREFIX).await {
            let field = key[SETTINGS_VALUE_PREFIX.len()..].to_string();
            let Some(raw) = self.kv_get(&key).await else {
                continue;
            };
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            fields.insert(field, value);
        }
        Settings::from_fields(fields)
    }

    /// Replace the whole settings namespace
    pub async fn save_settings(&self, settings: &Settings) {
        for key in self.kv_list(SETTINGS_VALUE_PREFIX).await {
            self.kv_delete(&key).await;
        }
        for (field, value) in settings.to_fields() {
            if !value.is_null() {
                self.write_field(&field, &value).await;
            }
        }
    }

    /// Apply field updates; a `None` value removes the field
    pub async fn update_settings(&self, updates: &[(&str, Option<Value>)]) -> Settings {
        for (field, value) in updates {
            match value {
                Some(value) => self.write_field(field, value).await,
                None => self.kv_delete(&Self::field_key(field)).await,
            }
        }
        self.load_settings().await
    }

    async fn load_string_field(&self, field: &str) -> Option<String> {
        let raw = self.kv_get(&Self::field_key(field)).await?;
        let value: Value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
        value
            .as_str()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(ToString::to_string)
    }

    async fn persist_string_field(&self, field: &str, value: Option<&str>) {
        match value.map(str::trim).filter(|token| !token.is_empty()) {
            Some(token) => self.write_field(field, &Value::String(token.to_string())).await,
            None => self.kv_delete(&Self::field_key(field)).await,
        }
    }

    // Cursors ------------------------------------------------------------

    pub async fn load_notion_sync_token(&self) -> Option<String> {
        self.load_string_field("notion_sync_token").await
    }

    pub async fn persist_notion_sync_token(&self, token: Option<&str>) {
        self.persist_string_field("notion_sync_token", token).await;
    }

    pub async fn load_caldav_sync_token(&self) -> Option<String> {
        self.load_string_field("caldav_sync_token").await
    }

    pub async fn persist_caldav_sync_token(&self, token: Option<&str>) {
        self.persist_string_field("caldav_sync_token", token).await;
    }

    pub async fn load_webhook_token(&self) -> Option<String> {
        self.load_string_field("webhook_verification_token").await
    }

    pub async fn persist_webhook_token(&self, token: &str) {
        self.persist_string_field("webhook_verification_token", Some(token)).await;
    }

    /// Stamp the time of the last accepted webhook
    pub async fn persist_webhook_last_used(&self) {
        self.persist_string_field("last_webhook", Some(&now_iso())).await;
    }

    // Mappings -----------------------------------------------------------

    fn mapping_key(sync_id: &str) -> String {
        format!("{MAPPING_PREFIX}{sync_id}")
    }

    fn index_notion_key(page_id: &str) -> String {
        format!("{INDEX_NOTION_PREFIX}{page_id}")
    }

    fn index_caldav_key(uid: &str) -> String {
        format!("{INDEX_CALDAV_PREFIX}{uid}")
    }

    async fn load_record(&self, sync_id: &str) -> Option<MappingRecord> {
        let raw = self.kv_get(&Self::mapping_key(sync_id)).await?;
        serde_json::from_str(&raw).ok()
    }

    /// Persist a record and both lookup indices
    pub async fn save_mapping(&self, record: &MappingRecord) {
        let Ok(payload) = serde_json::to_string(record) else {
            return;
        };
        self.kv_put(&Self::mapping_key(&record.sync_id), &payload).await;
        self.kv_put(&Self::index_notion_key(&record.notion_page_id), &record.sync_id)
            .await;
        self.kv_put(&Self::index_caldav_key(&record.caldav_uid), &record.sync_id)
            .await;
    }

    /// Remove a record and both lookup indices
    pub async fn delete_mapping(&self, record: &MappingRecord) {
        self.kv_delete(&Self::mapping_key(&record.sync_id)).await;
        self.kv_delete(&Self::index_notion_key(&record.notion_page_id)).await;
        self.kv_delete(&Self::index_caldav_key(&record.caldav_uid)).await;
    }

    pub async fn mapping_by_notion(&self, page_id: &str) -> Option<MappingRecord> {
        if page_id.is_empty() {
            return None;
        }
        let index_key = Self::index_notion_key(page_id);
        let sync_id = self.kv_get(&index_key).await?;
        match self.load_record(&sync_id).await {
            Some(record) => Some(record),
            None => {
                // Stray index entry; clean it up and report absence
                self.kv_delete(&index_key).await;
                None
            }
        }
    }

    pub async fn mapping_by_caldav(&self, caldav_uid: &str) -> Option<MappingRecord> {
        if caldav_uid.is_empty() {
            return None;
        }
        let index_key = Self::index_caldav_key(caldav_uid);
        let sync_id = self.kv_get(&index_key).await?;
        match self.load_record(&sync_id).await {
            Some(record) => Some(record),
            None => {
                self.kv_delete(&index_key).await;
                None
            }
        }
    }

    pub async fn list_mappings(&self) -> Vec<MappingRecord> {
        let mut records = Vec::new();
        for key in self.kv_list(MAPPING_PREFIX).await {
            if let Some(raw) = self.kv_get(&key).await {
                if let Ok(record) = serde_json::from_str(&raw) {
                    records.push(record);
                }
            }
        }
        records
    }

    /// Delete all mapping records and indexes (use sparingly)
    pub async fn reset_mappings(&self) {
        for prefix in [MAPPING_PREFIX, INDEX_NOTION_PREFIX, INDEX_CALDAV_PREFIX] {
            for key in self.kv_list(prefix).await {
                self.kv_delete(&key).await;
            }
        }
    }
}
