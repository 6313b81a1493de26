//! Hookrelay - signed webhook ingestion pipeline.
//!
//! This library provides shared modules for the Hookrelay binaries:
//! - `hookrelay-receiver`: verifies webhook signatures and enqueues envelopes
//! - `hookrelay-processor`: persists queued envelopes in batches
//! - `hookrelay-logs`: read-only query API over stored envelopes
//! - `hookrelay-sign`: signature generator for testing senders
//!
//! ## Architecture
//!
//! ```text
//! Webhook → Receiver → webhook_events → Processor → webhook_logs ← Logs API
//! ```

pub mod config;
pub mod process;
pub mod queue;
pub mod secrets;
pub mod shutdown;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use process::{extract_batch, BatchProcessor, BatchResult, RawMessage};
pub use queue::{EventQueue, MemoryQueue, Publisher, WebhookEnvelope, WEBHOOK_QUEUE};
pub use secrets::SecretProvider;
pub use store::{EventStore, MemoryStore, PgStore};
pub use web::{LogsQueryService, WebhookReceiver};
