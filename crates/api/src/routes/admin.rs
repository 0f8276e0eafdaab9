//! Admin status surface
//!
//! One HTML page: connectivity badges, sync actions as plain form posts,
//! the settings form, and a raw JSON dump of the current state. Guarded
//! by the admin token via header or query parameter.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Router,
};
use chrono::Utc;
use serde_json::{json, Value};

use notidav_engine::{full_sync_due, SyncOptions};

use crate::error::ApiError;
use crate::AppState;

fn authorized(state: &AppState, headers: &HeaderMap, query: &HashMap<String, String>) -> bool {
    if state.admin_token.is_empty() {
        return false;
    }
    let provided = headers
        .get("X-Admin-Token")
        .or_else(|| headers.get("Authorization"))
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
        .or_else(|| query.get("token").cloned());
    provided.as_deref() == Some(state.admin_token.as_str())
}

async fn collect_status(state: &AppState) -> Value {
    let settings = state.engine.store().load_settings().await;
    let webhook_token = settings.webhook_verification_token.clone();
    let notion_ok = state.engine.check_notion().await;
    let caldav_ok = state.engine.check_caldav().await;

    json!({
        "settings": settings.to_fields(),
        "webhook": {
            "has_verification_token": webhook_token.is_some(),
            "verification_token": webhook_token,
        },
        "last_webhook": settings.last_webhook,
        "full_sync_due": full_sync_due(&settings, Utc::now()),
        "notion_ok": notion_ok,
        "caldav_ok": caldav_ok,
    })
}

fn status_badge(ok: bool) -> &'static str {
    if ok {
        "<span class='pill' style='background:#16a34a1a;color:#16a34a'>● Operational</span>"
    } else {
        "<span class='pill' style='background:#ef44441a;color:#ef4444'>● Degraded</span>"
    }
}

fn text_or_dash(value: Option<&str>) -> &str {
    match value {
        Some(text) if !text.is_empty() => text,
        _ => "-",
    }
}

fn render_status_page(status: &Value) -> String {
    let settings = status.get("settings").cloned().unwrap_or_else(|| json!({}));
    let field = |name: &str| -> String {
        settings
            .get(name)
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    };

    let notion_ok = status.get("notion_ok").and_then(Value::as_bool).unwrap_or(false);
    let caldav_ok = status.get("caldav_ok").and_then(Value::as_bool).unwrap_or(false);
    let last_action = status
        .get("last_action")
        .and_then(|action| action.get("action"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let last_action_pill = if last_action.is_empty() {
        String::new()
    } else {
        format!("<span class='pill'>Last: {last_action}</span>")
    };
    let webhook_token = status
        .get("webhook")
        .and_then(|w| w.get("verification_token"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let last_webhook = status.get("last_webhook").and_then(Value::as_str).unwrap_or("");
    let raw = serde_json::to_string_pretty(status).unwrap_or_default();

    format!(
        r##"<!DOCTYPE html>
<html lang='en'>
<head>
  <meta charset='utf-8'/>
  <title>Notion → CalDAV Status</title>
  <style>
    :root {{
      --bg: #f7f8fc; --card: #ffffff; --border: #e5e7eb; --text: #0f172a;
      --muted: #475569; --accent: #0ea5e9; --accent-weak: #e0f2fe;
      --mono: "SFMono-Regular", ui-monospace, Menlo, monospace;
    }}
    * {{ box-sizing: border-box; }}
    body {{ margin: 0 auto; max-width: 900px; padding: 24px; background: var(--bg); color: var(--text); font-family: "Inter", -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif; }}
    h1 {{ margin: 0 0 12px; font-weight: 700; font-size: 26px; }}
    .card {{ background: var(--card); border: 1px solid var(--border); border-radius: 12px; padding: 16px; box-shadow: 0 4px 10px rgba(15,23,42,0.04); margin-bottom: 16px; }}
    .card h2 {{ margin: 0 0 10px; font-size: 16px; font-weight: 700; }}
    .meta {{ color: var(--muted); font-size: 13px; }}
    .pill {{ display: inline-flex; align-items: center; gap: 6px; padding: 4px 10px; border-radius: 999px; font-size: 12px; font-weight: 600; background: var(--accent-weak); color: var(--accent); }}
    label {{ font-size: 13px; font-weight: 600; color: var(--muted); display: block; margin-bottom: 4px; }}
    input {{ width: 100%; padding: 8px 10px; border: 1px solid var(--border); border-radius: 8px; font-size: 14px; }}
    button {{ background: var(--accent); color: white; border: none; border-radius: 8px; padding: 10px 14px; font-weight: 700; cursor: pointer; }}
    pre {{ background: #0b1220; color: #e2e8f0; padding: 12px; border-radius: 10px; overflow-x: auto; font-family: var(--mono); font-size: 13px; margin: 0; }}
    .stack {{ display: flex; flex-direction: column; gap: 12px; }}
    .actions-row {{ display: flex; flex-wrap: wrap; gap: 8px; align-items: center; }}
    .actions-row form {{ margin: 0; }}
    .actions-row button {{ width: auto; padding: 8px 12px; }}
  </style>
</head>
<body>
  <h1>Notion CalDAV Sync Status</h1>

  <div class='card stack'>
    <div style='display:flex; justify-content:space-between; align-items:center;'>
      <h2>Status</h2>
      {last_action_pill}
    </div>
    <div class='meta'>Notion API {notion_badge}</div>
    <div class='meta'>CalDAV server {caldav_badge}</div>
    <div class='meta'>Last full sync: {last_full_sync}</div>
    <div class='meta'>Last webhook: {last_webhook}</div>
  </div>

  <div class='card stack'>
    <div class='actions-row'>
      <form method="POST">
        <input type="hidden" name="action" value="check_connectivity" />
        <button type="submit">Re-check connectivity</button>
      </form>
      <form method="POST">
        <input type="hidden" name="action" value="full_sync" />
        <button type="submit">Bidirectional Sync</button>
      </form>
      <form method="POST">
        <input type="hidden" name="action" value="notion_to_caldav" />
        <button type="submit">Notion to CalDAV</button>
      </form>
      <form method="POST">
        <input type="hidden" name="action" value="caldav_to_notion" />
        <button type="submit">CalDAV to Notion</button>
      </form>
    </div>
  </div>

  <div class='card stack'>
    <h2>Settings</h2>
    <form method="POST" class='stack'>
      <input type="hidden" name="action" value="save_settings" />
      <div><label>Calendar name</label><input name="calendar_name" value="{calendar_name}" placeholder="Notion" /></div>
      <div><label>Calendar color</label><input name="calendar_color" value="{calendar_color}" placeholder="#FF7F00" /></div>
      <div><label>Calendar timezone</label><input name="calendar_timezone" value="{calendar_timezone}" placeholder="America/Los_Angeles" /></div>
      <div><label>Date-only timezone</label><input name="date_only_timezone" value="{date_only_timezone}" placeholder="UTC" /></div>
      <div><label>Full sync interval (minutes)</label><input name="full_sync_interval_minutes" type="number" min="1" value="{full_sync_interval}" /></div>
      <div><label>Webhook token (read-only)</label><input value="{webhook_token}" disabled /></div>
      <div><button type="submit">Save settings</button></div>
    </form>
  </div>

  <div class='card stack'>
    <h2>Raw status</h2>
    <pre>{raw}</pre>
  </div>
</body>
</html>"##,
        last_action_pill = last_action_pill,
        notion_badge = status_badge(notion_ok),
        caldav_badge = status_badge(caldav_ok),
        last_full_sync = text_or_dash(Some(&field("last_full_sync"))),
        last_webhook = text_or_dash(Some(last_webhook)),
        calendar_name = field("calendar_name"),
        calendar_color = field("calendar_color"),
        calendar_timezone = field("calendar_timezone"),
        date_only_timezone = field("date_only_timezone"),
        full_sync_interval = field("full_sync_interval_minutes"),
        webhook_token = webhook_token,
        raw = raw,
    )
}

async fn admin_status_page(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if !authorized(&state, &headers, &query) {
        return Err(ApiError::Unauthorized("admin token required".to_string()));
    }
    let status = collect_status(&state).await;
    Ok(Html(render_status_page(&status)).into_response())
}

async fn admin_status_action(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    if !authorized(&state, &headers, &query) {
        return Err(ApiError::Unauthorized("admin token required".to_string()));
    }

    let action = form
        .get("action")
        .map(|a| a.trim().to_lowercase())
        .unwrap_or_default();
    tracing::info!("admin action {action:?}");
    let mut last_action = json!({ "action": action });

    match action.as_str() {
        "full_sync" => {
            let report = state.engine.run_sync(SyncOptions::bidirectional(false)).await?;
            last_action["result"] = serde_json::to_value(&report).unwrap_or_default();
        }
        "notion_to_caldav" => {
            let report = state.engine.run_full_rewrite().await?;
            last_action["result"] = serde_json::to_value(&report).unwrap_or_default();
        }
        "caldav_to_notion" => {
            let report = state.engine.run_caldav_to_notion().await?;
            last_action["result"] = serde_json::to_value(&report).unwrap_or_default();
        }
        "save_settings" => {
            let mut updates: Vec<(&str, Option<Value>)> = Vec::new();
            for field in [
                "calendar_name",
                "calendar_color",
                "calendar_timezone",
                "date_only_timezone",
            ] {
                if let Some(value) = form.get(field) {
                    let trimmed = value.trim();
                    updates.push((
                        field,
                        if trimmed.is_empty() { None } else { Some(json!(trimmed)) },
                    ));
                }
            }
            if let Some(raw) = form.get("full_sync_interval_minutes") {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    let minutes: u64 = trimmed
                        .parse()
                        .ok()
                        .filter(|minutes| *minutes > 0)
                        .ok_or_else(|| {
                            ApiError::BadRequest("invalid full_sync_interval_minutes".to_string())
                        })?;
                    updates.push(("full_sync_interval_minutes", Some(json!(minutes))));
                }
            }
            state.engine.apply_settings(&updates).await;
            last_action["notion_ok"] = json!(state.engine.check_notion().await);
            last_action["caldav_ok"] = json!(state.engine.check_caldav().await);
        }
        "check_connectivity" => {
            last_action["notion_ok"] = json!(state.engine.check_notion().await);
            last_action["caldav_ok"] = json!(state.engine.check_caldav().await);
        }
        _ => {
            return Err(ApiError::BadRequest("invalid action".to_string()));
        }
    }

    let mut status = collect_status(&state).await;
    status["last_action"] = last_action;
    Ok(Html(render_status_page(&status)).into_response())
}

/// Admin routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/admin/status", get(admin_status_page).post(admin_status_action))
}
