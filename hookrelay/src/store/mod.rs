//! Persistence for processed webhook envelopes.
//!
//! The processor writes through `EventStore::insert`, the logs API reads
//! through `EventStore::query`. Rows are keyed by `log_id` and never deleted.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::queue::WebhookEnvelope;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Envelope handed to `insert` without a persistence timestamp.
    #[error("envelope {0} has no processed_at")]
    NotProcessed(uuid::Uuid),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read filter for stored envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    /// Maximum rows returned
    pub limit: u32,
    /// Exact match on `event_type`
    pub event_type: Option<String>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Durably store an envelope whose `processed_at` is set.
    ///
    /// Storing the same `log_id` twice keeps the first row and only
    /// refreshes `processed_at`.
    async fn insert(&self, envelope: &WebhookEnvelope) -> Result<(), StoreError>;

    /// Newest envelopes first, at most `query.limit` of them.
    async fn query(&self, query: &LogQuery) -> Result<Vec<WebhookEnvelope>, StoreError>;
}
