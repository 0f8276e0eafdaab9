//! HTTP client for the Notion API
//!
//! All endpoints speak JSON with a Bearer token and a pinned API version
//! header. Data-source schemas are cached briefly; everything else goes to
//! the wire every time.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::{json, Value};

use notidav_core::Task;

use crate::config::NotionConfig;
use crate::error::{NotionError, NotionResult};
use crate::parse::extract_data_source_title;
use crate::props::{build_page_properties, default_property_names, resolve_property_names};

const SEARCH_PAGE_SIZE: u64 = 100;
const QUERY_PAGE_SIZE: u64 = 200;

/// A task-bearing collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    pub id: String,
    pub title: String,
}

/// Client for one Notion integration
#[derive(Clone)]
pub struct NotionClient {
    http: reqwest::Client,
    config: NotionConfig,
    schema_cache: Cache<String, Arc<Value>>,
}

impl NotionClient {
    pub fn new(config: NotionConfig) -> NotionResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let schema_cache = Cache::builder()
            .time_to_live(Duration::from_secs(300))
            .max_capacity(256)
            .build();
        Ok(Self { http, config, schema_cache })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.config.token)
            .header("Notion-Version", &self.config.api_version)
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> NotionResult<Value> {
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(NotionError::Api { status: status.as_u16(), message: body });
        }
        serde_json::from_str(&body)
            .map_err(|err| NotionError::Unexpected(format!("invalid JSON: {err}")))
    }

    /// List all data sources visible to the integration
    pub async fn list_data_sources(&self) -> NotionResult<Vec<DataSource>> {
        let mut results = Vec::new();
        let mut next_cursor: Option<String> = None;
        loop {
            let mut body = json!({
                "filter": {"property": "object", "value": "data_source"},
                "page_size": SEARCH_PAGE_SIZE,
            });
            if let Some(cursor) = &next_cursor {
                body["start_cursor"] = json!(cursor);
            }
            let data = self
                .send_json(self.request(reqwest::Method::POST, "/v1/search").json(&body))
                .await?;

            for entry in data.get("results").and_then(Value::as_array).unwrap_or(&Vec::new()) {
                let Some(id) = resolve_data_source_id(entry) else {
                    tracing::warn!("skipping search result without data_source id");
                    continue;
                };
                let title = extract_data_source_title(entry).unwrap_or_else(|| "Untitled".into());
                results.push(DataSource { id, title });
            }

            if !data.get("has_more").and_then(Value::as_bool).unwrap_or(false) {
                break;
            }
            match data.get("next_cursor").and_then(Value::as_str) {
                Some(cursor) => next_cursor = Some(cursor.to_string()),
                None => {
                    tracing::warn!(
                        "search response signals has_more without a cursor; stopping pagination"
                    );
                    break;
                }
            }
        }
        Ok(results)
    }

    /// Schema (property map) of a data source, cached briefly
    pub async fn data_source_properties(&self, ds_id: &str) -> NotionResult<Arc<Value>> {
        let path = format!("/v1/data_sources/{ds_id}");
        let client = self.clone();
        self.schema_cache
            .try_get_with(ds_id.to_string(), async move {
                let data = client
                    .send_json(client.request(reqwest::Method::GET, &path))
                    .await?;
                if data.get("object").and_then(Value::as_str) == Some("error") {
                    return Err(NotionError::Unexpected(format!(
                        "data source {ds_id} not found"
                    )));
                }
                Ok(Arc::new(data))
            })
            .await
            .map_err(|err: Arc<NotionError>| NotionError::Unexpected(err.to_string()))
    }

    /// Display title of a data source, falling back to its id
    pub async fn data_source_title(&self, ds_id: &str) -> String {
        match self.data_source_properties(ds_id).await {
            Ok(meta) => extract_data_source_title(&meta).unwrap_or_else(|| ds_id.to_string()),
            Err(err) => {
                tracing::warn!("unable to load title for data source {ds_id}: {err}");
                ds_id.to_string()
            }
        }
    }

    /// Query pages, optionally server-filtered to edits since `changed_since`
    pub async fn query_pages(
        &self,
        ds_id: &str,
        changed_since: Option<&str>,
    ) -> NotionResult<Vec<Value>> {
        let mut pages = Vec::new();
        let mut next_cursor: Option<String> = None;
        loop {
            let mut body = json!({ "page_size": QUERY_PAGE_SIZE });
            if let Some(since) = changed_since {
                body["filter"] = json!({
                    "property": "last_edited_time",
                    "date": {"on_or_after": since},
                });
            }
            if let Some(cursor) = &next_cursor {
                body["start_cursor"] = json!(cursor);
            }
            let data = self
                .send_json(
                    self.request(
                        reqwest::Method::POST,
                        &format!("/v1/data_sources/{ds_id}/query"),
                    )
                    .json(&body),
                )
                .await?;

            if let Some(results) = data.get("results").and_then(Value::as_array) {
                pages.extend(results.iter().cloned());
            }
            if !data.get("has_more").and_then(Value::as_bool).unwrap_or(false) {
                break;
            }
            match data.get("next_cursor").and_then(Value::as_str) {
                Some(cursor) => next_cursor = Some(cursor.to_string()),
                None => {
                    tracing::warn!(
                        "query response signals has_more without a cursor; stopping pagination"
                    );
                    break;
                }
            }
        }
        Ok(pages)
    }

    /// Fetch one page; a missing or errored page is `None`
    pub async fn get_page(&self, page_id: &str) -> NotionResult<Option<Value>> {
        let request = self.request(reqwest::Method::GET, &format!("/v1/pages/{page_id}"));
        match self.send_json(request).await {
            Ok(data) => {
                if data.get("object").and_then(Value::as_str) == Some("error") {
                    Ok(None)
                } else {
                    Ok(Some(data))
                }
            }
            Err(NotionError::Api { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn resolved_for(&self, ds_id: Option<&str>) -> crate::props::ResolvedProperties {
        if let Some(ds_id) = ds_id {
            match self.data_source_properties(ds_id).await {
                Ok(meta) => {
                    let empty = json!({});
                    let properties = meta.get("properties").unwrap_or(&empty);
                    return resolve_property_names(properties);
                }
                Err(err) => {
                    tracing::warn!("schema unavailable for {ds_id}: {err}; using defaults");
                }
            }
        }
        default_property_names()
    }

    /// Create a page for a task in the given data source
    pub async fn create_page(&self, ds_id: &str, task: &Task) -> NotionResult<Value> {
        let resolved = self.resolved_for(Some(ds_id)).await;
        let body = json!({
            "parent": {"data_source_id": ds_id},
            "properties": build_page_properties(task, &resolved),
        });
        self.send_json(self.request(reqwest::Method::POST, "/v1/pages").json(&body))
            .await
    }

    /// Patch a page's properties from a task
    pub async fn update_page(&self, page_id: &str, task: &Task) -> NotionResult<Value> {
        let ds_id = match task.database_id.as_deref() {
            Some(id) => Some(id.to_string()),
            None => self.get_page(page_id).await?.and_then(|page| {
                page.get("parent")
                    .and_then(|p| p.get("data_source_id").or_else(|| p.get("database_id")))
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
            }),
        };
        let resolved = self.resolved_for(ds_id.as_deref()).await;
        let body = json!({ "properties": build_page_properties(task, &resolved) });
        self.send_json(
            self.request(reqwest::Method::PATCH, &format!("/v1/pages/{page_id}")).json(&body),
        )
        .await
    }
}

fn resolve_data_source_id(meta: &Value) -> Option<String> {
    let nested = meta
        .get("data_source")
        .and_then(|ds| ds.get("id").or_else(|| ds.get("data_source_id")))
        .and_then(Value::as_str);
    let candidate = nested
        .or_else(|| meta.get("data_source_id").and_then(Value::as_str))
        .or_else(|| meta.get("id").and_then(Value::as_str))?;
    let trimmed = candidate.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}
