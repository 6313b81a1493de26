//! Queue message types.
//!
//! `WebhookEnvelope` is the one record that travels the whole pipeline:
//! built by the receiver, carried by the `webhook_events` queue, stamped with
//! `processed_at` by the processor and served back by the logs API.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Queue name for accepted webhook envelopes.
pub const WEBHOOK_QUEUE: &str = "webhook_events";

/// Event type recorded when the caller does not supply one.
pub const DEFAULT_EVENT_TYPE: &str = "unknown";

/// Normalized record of one received webhook event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// Identifier assigned by the receiver at ingestion
    pub log_id: Uuid,
    /// Ingestion time, UTC, microsecond precision
    #[serde(with = "timestamp")]
    pub received_at: DateTime<Utc>,
    /// Caller supplied classification
    pub event_type: String,
    /// Verbatim caller document, never interpreted
    pub payload: Value,
    /// Signature header as received, kept for audit only
    pub signature: String,
    /// Set once the envelope is durably stored
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookEnvelope {
    /// Build a fresh envelope for an authenticated payload.
    pub fn new(event_type: String, payload: Value, signature: String) -> Self {
        Self {
            log_id: Uuid::new_v4(),
            received_at: now_micros(),
            event_type,
            payload,
            signature,
            processed_at: None,
        }
    }

    /// Stamp the persistence time.
    ///
    /// Never earlier than `received_at`, even when the receiver's clock ran
    /// ahead of ours.
    pub fn mark_processed(mut self, at: DateTime<Utc>) -> Self {
        self.processed_at = Some(at.trunc_subsecs(6).max(self.received_at));
        self
    }
}

/// Current UTC time truncated to the store's microsecond precision.
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// RFC 3339 timestamps with a `Z` suffix and microsecond precision.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_str(&super::format(v)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| super::parse(&raw).map_err(de::Error::custom))
                .transpose()
        }
    }
}
