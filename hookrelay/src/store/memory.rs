//! In-process event store with the same ordering and upsert rules as
//! `PgStore`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{EventStore, LogQuery, StoreError};
use crate::queue::WebhookEnvelope;

/// Clones share the same rows.
#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<RwLock<HashMap<Uuid, WebhookEnvelope>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, log_id: Uuid) -> Option<WebhookEnvelope> {
        self.rows.read().await.get(&log_id).cloned()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert(&self, envelope: &WebhookEnvelope) -> Result<(), StoreError> {
        let processed_at = envelope
            .processed_at
            .ok_or(StoreError::NotProcessed(envelope.log_id))?;

        let mut rows = self.rows.write().await;
        rows.entry(envelope.log_id)
            .and_modify(|existing| existing.processed_at = Some(processed_at))
            .or_insert_with(|| envelope.clone());
        Ok(())
    }

    async fn query(&self, query: &LogQuery) -> Result<Vec<WebhookEnvelope>, StoreError> {
        let rows = self.rows.read().await;

        let mut matching: Vec<WebhookEnvelope> = rows
            .values()
            .filter(|e| match &query.event_type {
                Some(t) => &e.event_type == t,
                None => true,
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            b.received_at
                .cmp(&a.received_at)
                .then_with(|| b.log_id.cmp(&a.log_id))
        });
        matching.truncate(query.limit as usize);

        Ok(matching)
    }
}
