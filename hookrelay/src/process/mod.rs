//! Queue message processing.
//!
//! Each message in a batch is decoded and stored on its own. A message that
//! fails is counted and logged, never allowed to fail the rest of the batch:
//! at-least-once delivery would otherwise redeliver the whole batch forever
//! because of one poison message.
//!
//! ## Processing Flow
//!
//! ```text
//! RawMessage → parse_envelope() → mark_processed() → EventStore::insert()
//! ```

pub mod batch;

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::queue::types::timestamp;
use crate::queue::{WebhookEnvelope, DEFAULT_EVENT_TYPE};
use crate::store::{EventStore, StoreError};

pub use batch::{extract_batch, BatchError, RawMessage};

/// Per-message failure.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("message body is not a JSON envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("failed to store envelope: {0}")]
    Store(#[from] StoreError),
}

impl ProcessError {
    /// Store failures are outages; everything else is a bad message that
    /// would fail again on redelivery.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessError::Store(_))
    }
}

/// Outcome tally of one batch.
///
/// `processed + errors` always equals the batch size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub processed: usize,
    pub errors: usize,
    /// Subset of `errors` caused by the store rather than the message.
    pub store_failures: usize,
}

/// Queue message body as written by the receiver.
#[derive(Debug, Deserialize)]
struct QueuedMessage {
    log_id: Option<String>,
    received_at: Option<String>,
    event_type: Option<String>,
    payload: Option<Value>,
    signature: Option<String>,
}

/// Decode one queue message body into an envelope.
pub fn parse_envelope(body: &str) -> Result<WebhookEnvelope, ProcessError> {
    let message: QueuedMessage = serde_json::from_str(body)?;

    let log_id = message.log_id.ok_or(ProcessError::MissingField("log_id"))?;
    let log_id = Uuid::parse_str(&log_id).map_err(|e| ProcessError::InvalidField {
        field: "log_id",
        reason: e.to_string(),
    })?;

    let received_at = message
        .received_at
        .ok_or(ProcessError::MissingField("received_at"))?;
    let received_at = timestamp::parse(&received_at).map_err(|e| ProcessError::InvalidField {
        field: "received_at",
        reason: e.to_string(),
    })?;

    Ok(WebhookEnvelope {
        log_id,
        received_at,
        event_type: message
            .event_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
        payload: message
            .payload
            .unwrap_or_else(|| Value::Object(Default::default())),
        signature: message.signature.unwrap_or_default(),
        processed_at: None,
    })
}

/// Persists batches of queue messages, one message at a time or a few in
/// parallel.
#[derive(Clone)]
pub struct BatchProcessor {
    store: Arc<dyn EventStore>,
    concurrency: usize,
}

impl BatchProcessor {
    /// `concurrency` bounds the stores in flight within one batch.
    pub fn new(store: Arc<dyn EventStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Decode and store one message.
    pub async fn process_message(&self, message: &RawMessage) -> Result<WebhookEnvelope, ProcessError> {
        let envelope = parse_envelope(&message.body)?;

        info!(
            message_id = %message.message_id,
            log_id = %envelope.log_id,
            event_type = %envelope.event_type,
            "message_processing"
        );

        let envelope = envelope.mark_processed(Utc::now());
        self.store.insert(&envelope).await?;

        info!(log_id = %envelope.log_id, "message_stored");
        Ok(envelope)
    }

    /// Process every message in delivery order and tally the outcomes.
    ///
    /// Never fails: per-message errors are logged and counted.
    pub async fn process_batch(&self, messages: Vec<RawMessage>) -> BatchResult {
        info!(batch_size = messages.len(), "batch_received");

        if messages.is_empty() {
            return BatchResult::default();
        }

        // `buffered` starts work in order and yields results in order.
        let outcomes: Vec<Result<WebhookEnvelope, ProcessError>> = stream::iter(messages.clone())
            .map(|message| {
                let processor = self.clone();
                async move { processor.process_message(&message).await }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut result = BatchResult::default();
        for (message, outcome) in messages.iter().zip(outcomes) {
            match outcome {
                Ok(_) => result.processed += 1,
                Err(e) => {
                    result.errors += 1;
                    if e.is_retryable() {
                        result.store_failures += 1;
                        error!(
                            message_id = %message.message_id,
                            error = %e,
                            retryable = true,
                            "message_store_failed"
                        );
                    } else {
                        warn!(
                            message_id = %message.message_id,
                            error = %e,
                            body_length = message.body.len(),
                            "message_rejected"
                        );
                    }
                }
            }
        }

        info!(
            processed = result.processed,
            errors = result.errors,
            store_failures = result.store_failures,
            "batch_complete"
        );

        result
    }
}
