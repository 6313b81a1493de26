//! Async AMQP publisher for enqueueing webhook envelopes.
//!
//! The publisher is cheap to clone and shared across request handlers; it
//! keeps one connection and channel alive and reconnects when they drop.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::types::{WebhookEnvelope, WEBHOOK_QUEUE};
use super::{EventQueue, QueueError};

/// Async AMQP publisher with connection management.
///
/// The channel runs in confirm mode, so `publish` only returns `Ok` once the
/// broker has taken responsibility for the message.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    url: String,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl Publisher {
    /// Create a new publisher for the given broker URL.
    ///
    /// No connection is made until the first publish.
    pub fn new(url: String) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                url,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&self) -> Result<Channel> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Double-check after acquiring write lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        info!("amqp_publisher_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default())
            .await
            .context("Failed to connect to AMQP broker")?;

        info!("amqp_publisher_connected");

        let ch = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        ch.confirm_select(ConfirmSelectOptions::default())
            .await
            .context("Failed to enable publisher confirms")?;

        declare_webhook_queue(&ch).await?;

        info!(queue = WEBHOOK_QUEUE, "amqp_queue_declared");

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    /// Publish one envelope to the `webhook_events` queue.
    pub async fn publish(&self, envelope: &WebhookEnvelope) -> Result<()> {
        let channel = self.ensure_connected().await?;

        let body = serde_json::to_vec(envelope).context("Failed to serialize envelope")?;
        let message_id = envelope.log_id.to_string();

        let confirmation = channel
            .basic_publish(
                "",
                WEBHOOK_QUEUE,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into())
                    .with_message_id(message_id.clone().into()),
            )
            .await
            .context("Failed to publish to webhook queue")?
            .await
            .context("Failed to confirm publish")?;

        if confirmation.is_nack() {
            return Err(QueueError::Rejected(message_id).into());
        }

        info!(
            queue = WEBHOOK_QUEUE,
            message_id = %message_id,
            body_length = body.len(),
            "amqp_envelope_published"
        );

        Ok(())
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "amqp_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "amqp_connection_close_error");
            }
        }

        info!("amqp_publisher_closed");
    }
}

#[async_trait]
impl EventQueue for Publisher {
    async fn send(&self, envelope: &WebhookEnvelope) -> Result<(), QueueError> {
        self.publish(envelope).await.map_err(|e| {
            error!(log_id = %envelope.log_id, error = %format!("{e:#}"), "amqp_publish_failed");
            e.downcast::<QueueError>()
                .unwrap_or_else(|e| QueueError::Unavailable(format!("{e:#}")))
        })
    }
}

/// Declare the durable webhook queue (idempotent).
pub async fn declare_webhook_queue(channel: &Channel) -> Result<()> {
    channel
        .queue_declare(
            WEBHOOK_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare webhook queue")?;

    Ok(())
}
