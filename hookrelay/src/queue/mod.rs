//! Queue module.
//!
//! This module provides:
//! - The envelope carried between receiver and processor
//! - The `EventQueue` seam the receiver enqueues through
//! - An AMQP publisher and an in-memory queue behind that seam
//!
//! ## Architecture
//!
//! ```text
//! Receiver → webhook_events queue → Processor → webhook_logs table ← Logs API
//! ```

pub mod memory;
pub mod publisher;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryQueue;
pub use publisher::Publisher;
pub use types::{now_micros, WebhookEnvelope, DEFAULT_EVENT_TYPE, WEBHOOK_QUEUE};

/// Failure to hand an envelope to the queue.
///
/// Always retryable from the webhook caller's point of view.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("broker rejected message {0}")]
    Rejected(String),
}

/// Destination for accepted webhook envelopes.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Durably hand one envelope to the queue.
    async fn send(&self, envelope: &WebhookEnvelope) -> Result<(), QueueError>;
}
