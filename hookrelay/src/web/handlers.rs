//! HTTP endpoint handlers.
//!
//! Handlers stay thin: they pull the request apart, call the component and
//! turn its result into a status code and JSON body.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::process::{extract_batch, BatchProcessor, BatchResult};
use crate::queue::WebhookEnvelope;
use crate::web::logs::{parse_limit, LogsQueryService};
use crate::web::receiver::{Rejection, WebhookReceiver};

/// Error body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

fn error_response(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

// =============================================================================
// Health Checks
// =============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<&'static str>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: None,
    })
}

pub async fn processor_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: Some("webhook-processor"),
    })
}

// =============================================================================
// Webhook Receiver
// =============================================================================

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub log_id: Uuid,
}

/// Status and error text for each rejection.
///
/// Retryable rejections map to 5xx so senders redeliver; the rest are the
/// sender's fault and map to 4xx.
fn rejection_status(rejection: &Rejection) -> (StatusCode, &'static str) {
    match rejection {
        Rejection::InvalidSignature => (StatusCode::UNAUTHORIZED, "Invalid signature"),
        Rejection::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "Invalid JSON payload"),
        Rejection::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error"),
        Rejection::SecretUnavailable(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal setup error")
        }
        Rejection::Enqueue(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to enqueue message"),
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let (status, error) = rejection_status(&self);
        error_response(status, error)
    }
}

/// Webhook endpoint.
///
/// Takes the body as raw bytes: the signature covers the exact wire bytes.
pub async fn receive_webhook(
    State(receiver): State<WebhookReceiver>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match receiver.receive(&headers, &body).await {
        Ok(accepted) => (
            StatusCode::OK,
            Json(WebhookResponse {
                status: "received",
                log_id: accepted.log_id,
            }),
        )
            .into_response(),
        Err(rejection) => {
            let (status, error) = rejection_status(&rejection);
            warn!(
                status = status.as_u16(),
                retryable = rejection.is_retryable(),
                error = %rejection,
                "webhook_rejected"
            );
            error_response(status, error)
        }
    }
}

// =============================================================================
// Batch Trigger
// =============================================================================

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessingResult {
    pub status: String,
    pub processed: usize,
    pub errors: usize,
}

impl From<BatchResult> for ProcessingResult {
    fn from(result: BatchResult) -> Self {
        Self {
            status: "success".to_string(),
            processed: result.processed,
            errors: result.errors,
        }
    }
}

/// Queue trigger endpoint.
///
/// Answers 200 whenever the batch envelope itself is well formed, even if
/// some messages failed. A 500 asks the trigger to redeliver the whole batch.
pub async fn process_trigger(State(processor): State<BatchProcessor>, body: Bytes) -> Response {
    let messages = match extract_batch(&body) {
        Ok(messages) => messages,
        Err(e) => {
            error!(error = %e, body_length = body.len(), "trigger_batch_malformed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal processing error");
        }
    };

    let result = processor.process_batch(messages).await;
    Json(ProcessingResult::from(result)).into_response()
}

// =============================================================================
// Logs API
// =============================================================================

/// Raw query parameters; parsed leniently so bad values fall back to defaults.
#[derive(Debug, Default, Deserialize)]
pub struct LogsParams {
    pub limit: Option<String>,
    pub event_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<WebhookEnvelope>,
    pub total: usize,
}

pub async fn list_logs(
    State(service): State<LogsQueryService>,
    Query(params): Query<LogsParams>,
) -> Response {
    let limit = parse_limit(params.limit.as_deref());

    match service.query(limit, params.event_type.as_deref()).await {
        Ok((logs, total)) => Json(LogsResponse { logs, total }).into_response(),
        Err(e) => {
            error!(error = %e, "logs_query_failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
