use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notidav_caldav::{CalDavClient, CalDavConfig};
use notidav_engine::SyncEngine;
use notidav_notion::{NotionClient, NotionConfig};
use notidav_store::{JsonFileStore, StateStore};

mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Initialize tracing once for the entire process
    // The guard must be kept alive for the duration of the program to ensure logs are flushed
    let _guard = init_tracing()?;

    tracing::info!("Starting notidav unified server");

    let config = config::UnifiedConfig::from_env()?;
    tracing::info!("✓ Configuration loaded");

    // Persistent state store
    let kv = JsonFileStore::open(&config.state_path).await?;
    let store = StateStore::new(Arc::new(kv));
    tracing::info!("✓ State store opened at {}", config.state_path);

    // Backend clients
    let caldav = CalDavClient::new(CalDavConfig::new(
        config.caldav_username.clone(),
        config.caldav_password.clone(),
    ))?;
    let notion = NotionClient::new(NotionConfig::new(config.notion_token.clone()))?;
    let engine = Arc::new(SyncEngine::new(store, caldav, notion));

    // Create shutdown coordination
    let shutdown = CancellationToken::new();

    // Spawn both services
    let api_handle = spawn_api(Arc::clone(&engine), &config, shutdown.clone());
    let worker_handle = spawn_worker(Arc::clone(&engine), shutdown.clone())?;

    tracing::info!("✓ All services started");

    // Wait for shutdown signal
    wait_for_shutdown().await;
    tracing::info!("Shutdown signal received");

    shutdown.cancel();
    let _ = tokio::join!(api_handle, worker_handle);

    tracing::info!("✓ All services stopped gracefully");
    Ok(())
}

fn spawn_api(
    engine: Arc<SyncEngine>,
    config: &config::UnifiedConfig,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<Result<()>> {
    let state = api::AppState::new(
        engine,
        config.admin_token.clone(),
        config.webhook_token_seed.clone(),
    );
    let host = config.host.clone();
    let port = config.port;

    tokio::spawn(async move {
        tokio::select! {
            result = api::run_api(state, &host, port) => {
                tracing::error!("API service exited: {result:?}");
                result.map_err(|err| anyhow::anyhow!(err))
            }
            _ = shutdown.cancelled() => {
                tracing::info!("API service shutting down");
                Ok(())
            }
        }
    })
}

fn spawn_worker(
    engine: Arc<SyncEngine>,
    shutdown: CancellationToken,
) -> Result<tokio::task::JoinHandle<Result<()>>> {
    let worker_config = worker::Config::from_env()?;
    Ok(tokio::spawn(async move {
        worker::run_worker(engine, worker_config, Some(shutdown)).await
    }))
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing() -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,api=debug,worker=debug,notidav_engine=debug".into());

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let enable_file_logging = std::env::var("ENABLE_FILE_LOGGING")
        .map(|v| v.to_lowercase() != "false" && v != "0")
        .unwrap_or(true);

    if enable_file_logging {
        let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
        let file_appender = tracing_appender::rolling::daily(log_dir, "notidav.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking)
            .json();

        registry.with(file_layer).init();

        Ok(Some(guard))
    } else {
        registry.init();
        Ok(None)
    }
}
