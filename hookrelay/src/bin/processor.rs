//! Hookrelay Processor - stores queued webhook envelopes.
//!
//! This binary:
//! 1. Consumes envelopes from the webhook_events queue in batches
//! 2. Accepts trigger-delivered batches on `POST /trigger`
//! 3. Persists every message independently, counting failures
//!
//! A batch is always acknowledged as a whole; one bad message never causes
//! its siblings to be redelivered.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
    Connection, ConnectionProperties,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hookrelay::queue::publisher::declare_webhook_queue;
use hookrelay::shutdown::shutdown_signal;
use hookrelay::store::postgres::{create_pool, run_migrations};
use hookrelay::web::trigger_router;
use hookrelay::{BatchProcessor, Config, PgStore, RawMessage, WEBHOOK_QUEUE};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("processor_starting");

    let config = Config::from_env();
    info!(
        port = config.port,
        batch_size = config.batch_size,
        batch_concurrency = config.batch_concurrency,
        run_migrations = config.run_migrations,
        "config_loaded"
    );

    run(config).await?;

    Ok(())
}

/// Run the trigger endpoint and the queue consumer until shutdown.
async fn run(config: Config) -> Result<()> {
    let pool = create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;

    if config.run_migrations {
        run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;
    }

    let processor = BatchProcessor::new(Arc::new(PgStore::new(pool)), config.batch_concurrency);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "processor_listening");

    let app = trigger_router(processor.clone(), config.batch_size);

    // The two ingress paths are independent: losing the broker stops
    // consumption but `/trigger` keeps serving.
    let consumer_config = config.clone();
    let consumer = tokio::spawn(async move {
        match consume(&consumer_config, processor).await {
            Ok(()) => warn!("amqp_consumer_stopped"),
            Err(e) => error!(error = %format!("{e:#}"), "amqp_consumer_failed"),
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal("processor"))
        .await
        .context("Server error")?;

    info!("processor_stopping");
    consumer.abort();

    info!("processor_shutdown_complete");
    Ok(())
}

/// Consume the webhook queue, handing ready deliveries over in batches.
async fn consume(config: &Config, processor: BatchProcessor) -> Result<()> {
    info!(url_length = config.amqp_url.len(), "amqp_connecting");

    let conn = Connection::connect(&config.amqp_url, ConnectionProperties::default())
        .await
        .context("Failed to connect to AMQP broker")?;

    info!("amqp_connected");

    let channel = conn
        .create_channel()
        .await
        .context("Failed to create channel")?;

    // Prefetch exactly one batch worth of messages
    let prefetch_count = u16::try_from(config.batch_size).unwrap_or(u16::MAX);
    channel
        .basic_qos(prefetch_count, BasicQosOptions::default())
        .await
        .context("Failed to set QoS")?;

    info!(prefetch_count = prefetch_count, "amqp_qos_set");

    declare_webhook_queue(&channel).await?;

    let consumer = channel
        .basic_consume(
            WEBHOOK_QUEUE,
            "hookrelay-processor",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("Failed to start consumer")?;

    info!(queue = WEBHOOK_QUEUE, "amqp_consumer_started");

    let mut batches = consumer.ready_chunks(config.batch_size);

    while let Some(deliveries) = batches.next().await {
        let mut messages = Vec::with_capacity(deliveries.len());
        let mut last_tag = None;

        for delivery in deliveries {
            match delivery {
                Ok(delivery) => {
                    let message_id = delivery
                        .properties
                        .message_id()
                        .as_ref()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    last_tag = Some(delivery.delivery_tag);

                    // Undecodable bytes become an empty body and are counted as an error
                    let body = String::from_utf8(delivery.data).unwrap_or_default();
                    messages.push(RawMessage::new(message_id, body));
                }
                Err(e) => {
                    error!(error = %e, "amqp_delivery_error");
                }
            }
        }

        let Some(last_tag) = last_tag else {
            continue;
        };

        let result = processor.process_batch(messages).await;

        // Acknowledge the whole batch regardless of per-message failures
        if let Err(e) = channel
            .basic_ack(last_tag, BasicAckOptions { multiple: true })
            .await
        {
            error!(delivery_tag = last_tag, error = %e, "amqp_ack_failed");
        } else {
            info!(
                queue = WEBHOOK_QUEUE,
                processed = result.processed,
                errors = result.errors,
                "amqp_batch_acked"
            );
        }
    }

    Ok(())
}
