//! In-process queue that records every envelope it accepts.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{EventQueue, QueueError, WebhookEnvelope};

/// Queue double for tests and local runs.
///
/// Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    sent: Arc<Mutex<Vec<String>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail as if the broker were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        *lock(&self.unavailable) = unavailable;
    }

    /// Raw message bodies in send order.
    pub fn bodies(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    /// Sent messages decoded back into envelopes.
    pub fn envelopes(&self) -> Vec<WebhookEnvelope> {
        lock(&self.sent)
            .iter()
            .filter_map(|body| serde_json::from_str(body).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.sent).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventQueue for MemoryQueue {
    async fn send(&self, envelope: &WebhookEnvelope) -> Result<(), QueueError> {
        if *lock(&self.unavailable) {
            return Err(QueueError::Unavailable("memory queue offline".to_string()));
        }

        let body = serde_json::to_string(envelope)?;
        lock(&self.sent).push(body);
        Ok(())
    }
}

// A poisoned lock only means another test thread panicked mid-push.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
