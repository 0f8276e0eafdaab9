//! notidav worker - Periodic sync scheduler
//!
//! Ticks on an interval; whenever the configured full-sync cadence has
//! elapsed, runs one authoritative bidirectional pass. The engine's gate
//! keeps this from overlapping webhook-triggered passes.

mod config;

pub use config::Config;

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use notidav_engine::{full_sync_due, EngineError, SyncEngine, SyncOptions};

/// Run the scheduler loop until cancelled
pub async fn run_worker(
    engine: Arc<SyncEngine>,
    config: Config,
    shutdown: Option<CancellationToken>,
) -> Result<()> {
    info!("Starting scheduler: poll_interval={}s", config.poll_interval_secs);

    let mut interval = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = async {
                if let Some(ref token) = shutdown {
                    token.cancelled().await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("Scheduler received shutdown signal");
                break;
            }
            _ = interval.tick() => {
                tick(&engine).await;
            }
        }
    }

    Ok(())
}

/// One scheduler tick: run the authoritative pass when it is due
pub async fn tick(engine: &SyncEngine) {
    let settings = engine.store().load_settings().await;
    if !full_sync_due(&settings, Utc::now()) {
        tracing::debug!("scheduled run skipped (full sync interval not reached)");
        return;
    }

    match engine.run_sync(SyncOptions::bidirectional(false)).await {
        Ok(report) => {
            info!("scheduled sync finished: {report}");
            let now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
            engine
                .store()
                .update_settings(&[("last_full_sync", Some(serde_json::json!(now)))])
                .await;
        }
        Err(EngineError::Busy) => {
            info!("scheduled sync skipped; another pass is in flight");
        }
        Err(err) => {
            warn!("scheduled sync failed: {err}");
        }
    }
}
