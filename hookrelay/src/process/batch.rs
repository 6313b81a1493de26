//! Trigger batch envelope extraction.
//!
//! A queue trigger delivers up to ten messages at once:
//!
//! ```json
//! {"messages": [{"details": {"message": {"message_id": "...", "body": "..."}}}]}
//! ```
//!
//! Only the outer shape is checked here. A broken entry still yields a
//! message (with an empty body) so the processor can count it as an error
//! instead of failing its siblings.

use serde_json::Value;
use thiserror::Error;

/// Placeholder id for entries that carry none.
pub const UNKNOWN_MESSAGE_ID: &str = "unknown";

/// One queue message body, still undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub message_id: String,
    pub body: String,
}

impl RawMessage {
    pub fn new(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
        }
    }
}

/// The trigger's delivery itself is broken; the whole batch must be
/// redelivered.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch envelope is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("batch envelope is not a JSON object")]
    NotAnObject,

    #[error("batch `messages` is not an array")]
    MessagesNotArray,
}

/// Pull the ordered message bodies out of a trigger request body.
///
/// A missing or null `messages` field is an empty batch.
pub fn extract_batch(raw: &[u8]) -> Result<Vec<RawMessage>, BatchError> {
    let envelope: Value = serde_json::from_slice(raw)?;
    let envelope = envelope.as_object().ok_or(BatchError::NotAnObject)?;

    let entries = match envelope.get("messages") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(BatchError::MessagesNotArray),
    };

    Ok(entries.iter().map(message_from_entry).collect())
}

fn message_from_entry(entry: &Value) -> RawMessage {
    let message = entry.pointer("/details/message");
    let field = |name: &str| {
        message
            .and_then(|m| m.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    RawMessage {
        message_id: field("message_id").unwrap_or_else(|| UNKNOWN_MESSAGE_ID.to_string()),
        body: field("body").unwrap_or_default(),
    }
}
