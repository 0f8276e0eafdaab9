//! Notion webhook ingress
//!
//! Two message shapes arrive here: the one-time verification handshake
//! (unsigned, stores and echoes the token) and signed change events.
//! Event payloads are walked recursively for page identities; database
//! and data-source events additionally kick off a background full sync.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "X-Notion-Signature";
const FULL_SYNC_PREFIXES: [&str; 2] = ["database.", "data_source."];

/// Verify `sha256=<hex>` over the raw body with the stored token as key
fn verify_signature(token: &str, raw_body: &[u8], provided: &str) -> bool {
    let Some(hex_digest) = provided.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(token.as_bytes()).expect("HMAC can take key of any size");
    mac.update(raw_body);
    // verify_slice is the constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

/// Normalize a candidate page id to dashed UUID form
fn normalize_page_id(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    let compact: String = text.chars().filter(|c| *c != '-').collect();
    if compact.len() != 32 {
        return None;
    }
    Uuid::parse_str(&compact).ok().map(|uuid| uuid.to_string())
}

/// Recursively extract page identities, first-seen order, deduplicated
pub fn collect_page_ids(payload: &Value) -> Vec<String> {
    fn append(candidate: Option<&Value>, found: &mut Vec<String>) {
        if let Some(id) = candidate.and_then(normalize_page_id) {
            if !found.contains(&id) {
                found.push(id);
            }
        }
    }

    fn walk(value: &Value, parent_key: Option<&str>, found: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                let hint = map
                    .get("object")
                    .or_else(|| map.get("type"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_lowercase();
                if hint == "page" || parent_key == Some("page") {
                    append(map.get("id").or_else(|| map.get("page_id")), found);
                }
                for (key, nested) in map {
                    if key.as_str() == "page_id" || key.as_str() == "pageId" {
                        append(Some(nested), found);
                        continue;
                    }
                    if key.as_str() == "parent" {
                        if let Some(parent) = nested.as_object() {
                            append(parent.get("page_id"), found);
                        }
                    }
                    if nested.is_object() || nested.is_array() {
                        walk(nested, Some(key), found);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    walk(item, parent_key, found);
                }
            }
            _ => {}
        }
    }

    let mut found = Vec::new();
    walk(payload, None, &mut found);
    found
}

/// Every event type string present in the payload, lowercased, deduplicated
pub fn extract_event_types(payload: &Value) -> Vec<String> {
    fn walk(value: &Value, types: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                if let Some(event_type) = map.get("type").and_then(Value::as_str) {
                    let normalized = event_type.trim().to_lowercase();
                    if !normalized.is_empty() && !types.contains(&normalized) {
                        types.push(normalized);
                    }
                }
                if let Some(event) = map.get("event") {
                    walk(event, types);
                }
                if let Some(events) = map.get("events").and_then(Value::as_array) {
                    for item in events {
                        walk(item, types);
                    }
                }
                for key in ["payload", "data"] {
                    if let Some(nested) = map.get(key) {
                        if nested.is_object() || nested.is_array() {
                            walk(nested, types);
                        }
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    walk(item, types);
                }
            }
            _ => {}
        }
    }

    let mut types = Vec::new();
    walk(payload, &mut types);
    types
}

/// Database-level events invalidate more than any one page
pub fn needs_full_sync(event_types: &[String]) -> bool {
    event_types.iter().any(|event_type| {
        FULL_SYNC_PREFIXES
            .iter()
            .any(|prefix| event_type.starts_with(prefix))
    })
}

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let raw = std::str::from_utf8(&body)
        .map_err(|_| ApiError::BadRequest("body is not UTF-8".to_string()))?;
    let data: Option<Value> = serde_json::from_str(raw).ok();

    // Verification handshake: store the token and echo it back, unsigned
    if let Some(token) = data
        .as_ref()
        .and_then(|d| d.get("verification_token"))
        .and_then(Value::as_str)
    {
        let token = token.trim();
        if token.is_empty() {
            return Err(ApiError::BadRequest("invalid verification_token".to_string()));
        }
        state.engine.store().persist_webhook_token(token).await;
        tracing::info!("stored webhook verification token");
        return Ok(Json(json!({ "verification_token": token })).into_response());
    }

    let Some(data) = data else {
        return Err(ApiError::BadRequest("invalid JSON".to_string()));
    };

    let mut stored_token = state.engine.store().load_webhook_token().await;
    if stored_token.is_none() {
        if let Some(seed) = state.webhook_seed.as_deref().map(str::trim).filter(|s| !s.is_empty())
        {
            state.engine.store().persist_webhook_token(seed).await;
            stored_token = Some(seed.to_string());
        }
    }
    let Some(stored_token) = stored_token else {
        return Err(ApiError::Unauthorized("missing stored verification token".to_string()));
    };

    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        return Err(ApiError::Unauthorized("no signature".to_string()));
    };
    if !verify_signature(&stored_token, &body, signature) {
        tracing::warn!("webhook signature mismatch");
        return Err(ApiError::Unauthorized("invalid signature".to_string()));
    }

    let event_types = extract_event_types(&data);
    if needs_full_sync(&event_types) {
        tracing::info!("database/data_source event detected; scheduling full sync");
        state.full_sync.schedule(Arc::clone(&state.engine)).await;
    }

    let page_ids = collect_page_ids(&data);
    tracing::info!("webhook event types {event_types:?}, pages {page_ids:?}");
    if !page_ids.is_empty() {
        state.engine.reconcile_pages(&page_ids).await?;
    }
    state.engine.store().persist_webhook_last_used().await;

    Ok(Json(json!({ "ok": true, "updated": page_ids })).into_response())
}

/// Webhook routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/webhook/notion", post(handle_webhook))
}
