//! Read access to stored webhook envelopes.

use std::sync::Arc;

use tracing::info;

use crate::queue::WebhookEnvelope;
use crate::store::{EventStore, LogQuery, StoreError};

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 100;

/// Parse a raw `limit` parameter.
///
/// Integers of any magnitude are clamped into `1..=100`; anything
/// non-numeric (or absent) falls back to 50.
pub fn parse_limit(raw: Option<&str>) -> u32 {
    let Some(raw) = raw.map(str::trim) else {
        return DEFAULT_LIMIT;
    };

    let digits = raw.strip_prefix(&['+', '-'][..]).unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return DEFAULT_LIMIT;
    }

    // Too many digits for i64 still clamps, toward the bound of its sign
    let n = raw.parse::<i64>().unwrap_or(if raw.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    });
    n.clamp(1, i64::from(MAX_LIMIT)) as u32
}

/// Empty filters mean no filter.
pub fn parse_event_type(raw: Option<&str>) -> Option<String> {
    raw.filter(|s| !s.is_empty()).map(str::to_string)
}

#[derive(Clone)]
pub struct LogsQueryService {
    store: Arc<dyn EventStore>,
}

impl LogsQueryService {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Newest envelopes first, plus how many were returned.
    ///
    /// `limit` is clamped into `1..=100`; an empty `event_type` is ignored.
    pub async fn query(
        &self,
        limit: u32,
        event_type: Option<&str>,
    ) -> Result<(Vec<WebhookEnvelope>, usize), StoreError> {
        let query = LogQuery {
            limit: limit.clamp(1, MAX_LIMIT),
            event_type: parse_event_type(event_type),
        };

        info!(limit = query.limit, event_type = ?query.event_type, "logs_query");

        let logs = self.store.query(&query).await?;
        let total = logs.len();
        Ok((logs, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};
    use serde_json::json;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None), 50);
        assert_eq!(parse_limit(Some("abc")), 50);
        assert_eq!(parse_limit(Some("")), 50);
        assert_eq!(parse_limit(Some("2.5")), 50);
        assert_eq!(parse_limit(Some("200")), 100);
        assert_eq!(parse_limit(Some("0")), 1);
        assert_eq!(parse_limit(Some("-7")), 1);
        assert_eq!(parse_limit(Some(" 25 ")), 25);
        assert_eq!(parse_limit(Some("+30")), 30);
        assert_eq!(parse_limit(Some("-")), 50);
        assert_eq!(parse_limit(Some("1e3")), 50);
    }

    #[test]
    fn test_parse_limit_saturates_huge_integers() {
        assert_eq!(parse_limit(Some("99999999999999999999")), 100);
        assert_eq!(parse_limit(Some("-99999999999999999999")), 1);
        assert_eq!(parse_limit(Some(" 123456789012345678901234567890 ")), 100);
    }

    #[test]
    fn test_parse_event_type() {
        assert_eq!(parse_event_type(None), None);
        assert_eq!(parse_event_type(Some("")), None);
        assert_eq!(parse_event_type(Some("a.b")), Some("a.b".to_string()));
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let store = MemoryStore::new();
        for (i, event_type) in ["x", "y", "x", "x"].iter().enumerate() {
            let mut e = WebhookEnvelope::new(event_type.to_string(), json!({"i": i}), String::new());
            e.received_at -= Duration::seconds(100 - i as i64);
            store.insert(&e.mark_processed(Utc::now())).await.unwrap();
        }
        let service = LogsQueryService::new(Arc::new(store));

        let (logs, total) = service.query(2, Some("x")).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(logs[0].payload["i"], 3);
        assert_eq!(logs[1].payload["i"], 2);

        let (logs, total) = service.query(50, Some("")).await.unwrap();
        assert_eq!(total, 4);
        assert!(logs.windows(2).all(|w| w[0].received_at >= w[1].received_at));

        let (logs, total) = service.query(0, None).await.unwrap();
        assert_eq!((logs.len(), total), (1, 1));

        let (logs, total) = service.query(50, Some("none")).await.unwrap();
        assert!(logs.is_empty());
        assert_eq!(total, 0);
    }
}
