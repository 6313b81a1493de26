//! Webhook intake: authenticate, normalize, enqueue.
//!
//! The order is fixed: fetch the secret, verify the signature over the raw
//! body, and only then parse the JSON. Unauthenticated bodies are never
//! parsed.

use std::sync::Arc;

use axum::http::HeaderMap;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::queue::{EventQueue, QueueError, WebhookEnvelope, DEFAULT_EVENT_TYPE};
use crate::secrets::{SecretError, SecretProvider};
use crate::web::signature;

/// A webhook the queue has taken responsibility for.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub log_id: Uuid,
    pub event_type: String,
}

/// Why a webhook was not accepted.
#[derive(Debug, Error)]
pub enum Rejection {
    /// Missing or wrong signature. The sender must fix it before retrying.
    #[error("invalid signature")]
    InvalidSignature,

    /// Authenticated body that is not valid JSON.
    #[error("invalid JSON payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    /// The signing secret is not set up for this deployment.
    #[error("configuration error: {0}")]
    Configuration(#[source] SecretError),

    /// The secret source could not be reached.
    #[error("secret unavailable: {0}")]
    SecretUnavailable(#[source] SecretError),

    /// The queue did not take the envelope; the sender should retry.
    #[error("failed to enqueue: {0}")]
    Enqueue(#[from] QueueError),
}

impl From<SecretError> for Rejection {
    fn from(e: SecretError) -> Self {
        if e.is_configuration() {
            Rejection::Configuration(e)
        } else {
            Rejection::SecretUnavailable(e)
        }
    }
}

impl Rejection {
    /// Whether the sender may retry the same delivery unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Rejection::Enqueue(_) | Rejection::SecretUnavailable(_) | Rejection::Configuration(_)
        )
    }
}

/// Verifies inbound webhooks and hands accepted ones to the queue.
#[derive(Clone)]
pub struct WebhookReceiver {
    queue: Arc<dyn EventQueue>,
    secrets: Arc<dyn SecretProvider>,
    signature_header: String,
}

impl WebhookReceiver {
    /// `signature_header` is matched case-insensitively.
    pub fn new(
        queue: Arc<dyn EventQueue>,
        secrets: Arc<dyn SecretProvider>,
        signature_header: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            secrets,
            signature_header: signature_header.into(),
        }
    }

    /// Accept or reject one webhook delivery.
    ///
    /// Exactly one queue send happens per accepted delivery and none for a
    /// rejected one.
    pub async fn receive(&self, headers: &HeaderMap, raw_body: &[u8]) -> Result<Accepted, Rejection> {
        // HeaderMap names are normalized to lowercase, so lookups ignore case.
        let signature_header = headers
            .get(self.signature_header.as_str())
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let secret = self.secrets.get_secret().await.map_err(|e| {
            error!(error = %e, "webhook_secret_unavailable");
            Rejection::from(e)
        })?;

        if !signature::verify(&secret, raw_body, &signature_header) {
            warn!(
                has_signature = !signature_header.is_empty(),
                signature_length = signature_header.len(),
                body_length = raw_body.len(),
                "webhook_signature_invalid"
            );
            return Err(Rejection::InvalidSignature);
        }

        let payload: Value = serde_json::from_slice(raw_body).map_err(|e| {
            warn!(error = %e, body_length = raw_body.len(), "webhook_payload_invalid");
            Rejection::InvalidPayload(e)
        })?;

        let event_type = event_type_of(&payload);
        let envelope = WebhookEnvelope::new(event_type.clone(), payload, signature_header);

        self.queue.send(&envelope).await.map_err(|e| {
            error!(log_id = %envelope.log_id, error = %e, "webhook_enqueue_failed");
            Rejection::Enqueue(e)
        })?;

        info!(
            log_id = %envelope.log_id,
            event_type = %event_type,
            "webhook_accepted"
        );

        Ok(Accepted {
            log_id: envelope.log_id,
            event_type,
        })
    }
}

/// Top-level string `event_type`, or the default for anything else.
fn event_type_of(payload: &Value) -> String {
    payload
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_EVENT_TYPE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::secrets::EnvSecret;
    use axum::http::{HeaderName, HeaderValue};
    use serde_json::json;

    const SECRET: &str = "topsecret";

    fn receiver(queue: &MemoryQueue) -> WebhookReceiver {
        WebhookReceiver::new(
            Arc::new(queue.clone()),
            Arc::new(EnvSecret::new(Some(SECRET.to_string()))),
            "x-webhook-signature",
        )
    }

    fn signed(body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        // Mixed case on the wire; the lookup must not care.
        headers.insert(
            HeaderName::from_bytes(b"X-Webhook-Signature").unwrap(),
            HeaderValue::from_str(&signature::sign(SECRET, body)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_event_type_of() {
        assert_eq!(event_type_of(&json!({"event_type": "order.paid"})), "order.paid");
        assert_eq!(event_type_of(&json!({"other": 1})), "unknown");
        assert_eq!(event_type_of(&json!({"event_type": 5})), "unknown");
        assert_eq!(event_type_of(&json!(["event_type"])), "unknown");
        assert_eq!(event_type_of(&json!("text")), "unknown");
    }

    #[tokio::test]
    async fn test_accepts_signed_body() {
        let queue = MemoryQueue::new();
        let body = br#"{"event_type":"test"}"#;

        let accepted = receiver(&queue).receive(&signed(body), body).await.unwrap();

        assert_eq!(accepted.event_type, "test");
        let sent = queue.envelopes();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].log_id, accepted.log_id);
        assert_eq!(sent[0].payload["event_type"], "test");
        assert_eq!(sent[0].signature, signature::sign(SECRET, body));
        assert_eq!(sent[0].processed_at, None);
    }

    #[tokio::test]
    async fn test_wrong_signature_enqueues_nothing() {
        let queue = MemoryQueue::new();
        let mut headers = HeaderMap::new();
        headers.insert("x-webhook-signature", HeaderValue::from_static("sha256=deadbeef"));

        let result = receiver(&queue).receive(&headers, b"{}").await;

        assert!(matches!(result, Err(Rejection::InvalidSignature)));
        assert!(!result.unwrap_err().is_retryable());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_missing_signature_is_unauthorized() {
        let queue = MemoryQueue::new();

        let result = receiver(&queue).receive(&HeaderMap::new(), b"{}").await;

        assert!(matches!(result, Err(Rejection::InvalidSignature)));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_signature_checked_before_parsing() {
        let queue = MemoryQueue::new();
        let mut headers = HeaderMap::new();
        headers.insert("x-webhook-signature", HeaderValue::from_static("sha256=00"));

        let result = receiver(&queue).receive(&headers, b"not json").await;

        assert!(matches!(result, Err(Rejection::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_signed_invalid_json_is_bad_request() {
        let queue = MemoryQueue::new();
        let body = b"{not json";

        let result = receiver(&queue).receive(&signed(body), body).await;

        assert!(matches!(result, Err(Rejection::InvalidPayload(_))));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_payload_numbers_and_key_order_survive_enqueue() {
        let queue = MemoryQueue::new();
        let body = br#"{"zeta":1,"amount":123456789012345678901234567890,"huge":1e400,"event_type":"t"}"#;

        let accepted = receiver(&queue).receive(&signed(body), body).await.unwrap();

        assert_eq!(accepted.event_type, "t");
        let queued = &queue.bodies()[0];
        assert!(queued.contains(
            r#""payload":{"zeta":1,"amount":123456789012345678901234567890,"huge":1e400,"event_type":"t"}"#
        ));
    }

    #[tokio::test]
    async fn test_missing_event_type_defaults() {
        let queue = MemoryQueue::new();
        let body = br#"[1, 2, 3]"#;

        let accepted = receiver(&queue).receive(&signed(body), body).await.unwrap();

        assert_eq!(accepted.event_type, DEFAULT_EVENT_TYPE);
        assert_eq!(queue.envelopes()[0].payload, json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_retryable() {
        let queue = MemoryQueue::new();
        queue.set_unavailable(true);
        let body = br#"{"event_type":"test"}"#;

        let err = receiver(&queue).receive(&signed(body), body).await.unwrap_err();

        assert!(matches!(err, Rejection::Enqueue(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unconfigured_secret() {
        let queue = MemoryQueue::new();
        let receiver = WebhookReceiver::new(
            Arc::new(queue.clone()),
            Arc::new(EnvSecret::new(None)),
            "x-webhook-signature",
        );
        let body = b"{}";

        let err = receiver.receive(&signed(body), body).await.unwrap_err();

        assert!(matches!(err, Rejection::Configuration(SecretError::NotConfigured)));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_custom_header_name() {
        let queue = MemoryQueue::new();
        let receiver = WebhookReceiver::new(
            Arc::new(queue.clone()),
            Arc::new(EnvSecret::new(Some(SECRET.to_string()))),
            "x-hub-signature-256",
        );
        let body = b"{}";
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(b"X-Hub-Signature-256").unwrap(),
            HeaderValue::from_str(&signature::sign(SECRET, body)).unwrap(),
        );

        assert!(receiver.receive(&headers, body).await.is_ok());
        assert_eq!(queue.len(), 1);
    }
}
