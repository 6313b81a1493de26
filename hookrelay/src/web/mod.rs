//! Web module for the three HTTP surfaces.
//!
//! - Receiver: verifies and enqueues inbound webhooks
//! - Trigger: accepts queue batches for the processor
//! - Logs: read-only view of stored envelopes

pub mod handlers;
pub mod logs;
pub mod receiver;
pub mod signature;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::process::BatchProcessor;

pub use handlers::{
    health, list_logs, process_trigger, processor_health, receive_webhook, ErrorResponse,
    HealthResponse, LogsParams, LogsResponse, ProcessingResult, WebhookResponse,
};
pub use logs::{parse_limit, LogsQueryService};
pub use receiver::{Accepted, Rejection, WebhookReceiver};
pub use signature::{sign, verify};

/// Largest webhook body the receiver accepts.
pub const WEBHOOK_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Queue body size bound for one accepted webhook: the re-serialized payload
/// plus the envelope fields around it.
const ENVELOPE_OVERHEAD: usize = 4 * 1024;

/// Trigger body size bound for a batch of `max_batch_size` messages.
///
/// Each queue body arrives as a JSON string inside the trigger envelope, where
/// escaping can at most double it.
pub fn trigger_body_limit(max_batch_size: usize) -> usize {
    let per_message = 2 * (WEBHOOK_BODY_LIMIT + ENVELOPE_OVERHEAD) + ENVELOPE_OVERHEAD;
    max_batch_size.max(1).saturating_mul(per_message)
}

/// `POST /webhook`, `GET /health`.
pub fn receiver_router(receiver: WebhookReceiver) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(receive_webhook))
        .layer(DefaultBodyLimit::max(WEBHOOK_BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(receiver)
}

/// `POST /trigger`, `GET /`.
///
/// The body limit admits `max_batch_size` messages of the largest webhook
/// the receiver accepts.
pub fn trigger_router(processor: BatchProcessor, max_batch_size: usize) -> Router {
    Router::new()
        .route("/", get(processor_health))
        .route("/trigger", post(process_trigger))
        .layer(DefaultBodyLimit::max(trigger_body_limit(max_batch_size)))
        .layer(TraceLayer::new_for_http())
        .with_state(processor)
}

/// `GET /logs`, `GET /health`, CORS open to any origin.
pub fn logs_router(service: LogsQueryService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/logs", get(list_logs))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
