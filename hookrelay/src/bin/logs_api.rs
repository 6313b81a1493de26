//! Hookrelay Logs API - read-only view of stored webhook envelopes.
//!
//! Serves `GET /logs?limit=&event_type=`, newest first.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hookrelay::shutdown::shutdown_signal;
use hookrelay::store::postgres::create_pool;
use hookrelay::web::logs_router;
use hookrelay::{Config, LogsQueryService, PgStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("logs_api_starting");

    let config = Config::from_env();
    info!(
        port = config.port,
        max_connections = config.database_max_connections,
        "config_loaded"
    );

    let pool = create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;

    let service = LogsQueryService::new(Arc::new(PgStore::new(pool.clone())));
    let app = logs_router(service);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "logs_api_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal("logs_api"))
        .await
        .context("Server error")?;

    pool.close().await;

    info!("logs_api_shutdown_complete");

    Ok(())
}
