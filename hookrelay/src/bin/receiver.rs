//! Hookrelay Receiver - webhook intake server.
//!
//! This binary provides a thin web server that:
//! - Verifies the HMAC signature of every inbound webhook
//! - Wraps accepted payloads in an envelope and enqueues them
//! - Answers 200 only once the broker has confirmed the message
//!
//! Persistence happens later, in the processor.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hookrelay::shutdown::shutdown_signal;
use hookrelay::web::receiver_router;
use hookrelay::{secrets, Config, Publisher, WebhookReceiver};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("receiver_starting");

    let config = Config::from_env();
    info!(
        port = config.port,
        signature_header = %config.signature_header,
        secret_file_configured = config.webhook_secret_file.is_some(),
        secret_env_configured = config.webhook_secret.is_some(),
        "config_loaded"
    );

    // Connects lazily on the first webhook
    let publisher = Publisher::new(config.amqp_url.clone());
    info!("amqp_publisher_created");

    let receiver = WebhookReceiver::new(
        Arc::new(publisher.clone()),
        secrets::from_config(&config),
        config.signature_header.clone(),
    );

    let app = receiver_router(receiver);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "receiver_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal("receiver"))
        .await
        .context("Server error")?;

    publisher.close().await;

    info!("receiver_shutdown_complete");

    Ok(())
}
