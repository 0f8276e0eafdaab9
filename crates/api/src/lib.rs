//! notidav API server library
//!
//! Hosts the webhook ingress and the admin status surface on one axum
//! router. All sync work is delegated to the engine; this crate only
//! authenticates, translates payloads and renders status.

pub mod error;
mod routes;

use std::sync::Arc;

use axum::Router;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use notidav_engine::{SyncEngine, SyncOptions};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    /// Admin surface credential; empty disables the admin endpoints
    pub admin_token: String,
    /// Fallback webhook verification token taken from the environment
    pub webhook_seed: Option<String>,
    pub full_sync: FullSyncSlot,
}

impl AppState {
    pub fn new(engine: Arc<SyncEngine>, admin_token: String, webhook_seed: Option<String>) -> Self {
        Self { engine, admin_token, webhook_seed, full_sync: FullSyncSlot::default() }
    }
}

/// At-most-one background full sync at a time
#[derive(Clone, Default)]
pub struct FullSyncSlot {
    inner: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl FullSyncSlot {
    /// Kick off a background authoritative pass unless one is running.
    ///
    /// Returns false when an earlier kickoff is still in flight.
    pub async fn schedule(&self, engine: Arc<SyncEngine>) -> bool {
        let mut slot = self.inner.lock().await;
        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                tracing::info!("full sync already running; skipping new kickoff");
                return false;
            }
        }
        *slot = Some(tokio::spawn(async move {
            match engine.run_sync(SyncOptions::bidirectional(false)).await {
                Ok(report) => tracing::info!("background full sync finished: {report}"),
                Err(err) => tracing::warn!("background full sync failed: {err}"),
            }
        }));
        true
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::routes())
        .merge(routes::webhook::routes())
        .merge(routes::admin::routes())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let user_agent = request
                        .headers()
                        .get(axum::http::header::USER_AGENT)
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("unknown");

                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        user_agent = %user_agent,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %response.status(),
                            "finished processing request"
                        );
                    },
                ),
        )
        .with_state(state)
}

/// Run the API server
///
/// This function starts the HTTP server and blocks until it exits.
pub async fn run_api(state: AppState, host: &str, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);
    let addr = format!("{host}:{port}");

    tracing::info!("API server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}
