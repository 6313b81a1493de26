//! End-to-end tests across the three routers, wired to in-memory
//! collaborators.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use hookrelay::secrets::EnvSecret;
use hookrelay::web::{logs_router, receiver_router, sign, trigger_router, WEBHOOK_BODY_LIMIT};
use hookrelay::{
    BatchProcessor, LogsQueryService, MemoryQueue, MemoryStore, WebhookEnvelope, WebhookReceiver,
};

const SECRET: &str = "topsecret";

struct Pipeline {
    queue: MemoryQueue,
    store: MemoryStore,
    receiver: Router,
    trigger: Router,
    logs: Router,
}

fn pipeline() -> Pipeline {
    let queue = MemoryQueue::new();
    let store = MemoryStore::new();

    let receiver = WebhookReceiver::new(
        Arc::new(queue.clone()),
        Arc::new(EnvSecret::new(Some(SECRET.to_string()))),
        "x-webhook-signature",
    );

    Pipeline {
        receiver: receiver_router(receiver),
        trigger: trigger_router(BatchProcessor::new(Arc::new(store.clone()), 2), 10),
        logs: logs_router(LogsQueryService::new(Arc::new(store.clone()))),
        queue,
        store,
    }
}

fn webhook_request(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header("X-Webhook-Signature", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn trigger_request(bodies: &[String]) -> Request<Body> {
    let messages: Vec<Value> = bodies
        .iter()
        .enumerate()
        .map(|(i, body)| json!({"details": {"message": {"message_id": format!("m{i}"), "body": body}}}))
        .collect();

    Request::builder()
        .method("POST")
        .uri("/trigger")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "messages": messages }).to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

/// A signed `{"event_type":"test"}` is accepted with a fresh UUID and
/// enqueued exactly once.
#[tokio::test]
async fn test_signed_webhook_is_accepted() {
    let p = pipeline();
    let body = r#"{"event_type":"test"}"#;
    let signature = sign(SECRET, body.as_bytes());

    let (status, response) = send(&p.receiver, webhook_request(body, Some(&signature))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "received");
    let log_id = Uuid::parse_str(response["log_id"].as_str().unwrap()).unwrap();

    let sent = p.queue.envelopes();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].log_id, log_id);
    assert_eq!(sent[0].payload["event_type"], "test");
    assert_eq!(sent[0].event_type, "test");
}

#[tokio::test]
async fn test_wrong_signature_is_unauthorized() {
    let p = pipeline();

    let (status, response) = send(
        &p.receiver,
        webhook_request(r#"{"event_type":"test"}"#, Some("sha256=deadbeef")),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response, json!({"error": "Invalid signature"}));
    assert!(p.queue.is_empty());
}

#[tokio::test]
async fn test_missing_signature_is_unauthorized() {
    let p = pipeline();

    let (status, _) = send(&p.receiver, webhook_request("{}", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(p.queue.is_empty());
}

#[tokio::test]
async fn test_signed_malformed_json_is_bad_request() {
    let p = pipeline();
    let body = r#"{"event_type": "#;
    let signature = sign(SECRET, body.as_bytes());

    let (status, response) = send(&p.receiver, webhook_request(body, Some(&signature))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response, json!({"error": "Invalid JSON payload"}));
    assert!(p.queue.is_empty());
}

#[tokio::test]
async fn test_enqueue_failure_is_server_error() {
    let p = pipeline();
    p.queue.set_unavailable(true);
    let body = r#"{"event_type":"test"}"#;
    let signature = sign(SECRET, body.as_bytes());

    let (status, response) = send(&p.receiver, webhook_request(body, Some(&signature))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response, json!({"error": "Failed to enqueue message"}));
}

#[tokio::test]
async fn test_unconfigured_secret_is_server_error() {
    let queue = MemoryQueue::new();
    let app = receiver_router(WebhookReceiver::new(
        Arc::new(queue.clone()),
        Arc::new(EnvSecret::new(None)),
        "x-webhook-signature",
    ));

    let (status, response) = send(&app, webhook_request("{}", Some("sha256=00"))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response, json!({"error": "Configuration error"}));
    assert!(queue.is_empty());
}

/// Batch [A, malformed, B] stores A and B and reports one error; both are
/// then visible through the logs API with a processed_at.
#[tokio::test]
async fn test_batch_with_poison_message_end_to_end() {
    let p = pipeline();

    let mut log_ids = Vec::new();
    for event_type in ["alpha", "beta"] {
        let body = json!({"event_type": event_type, "data": {"n": 1}}).to_string();
        let signature = sign(SECRET, body.as_bytes());
        let (status, response) = send(&p.receiver, webhook_request(&body, Some(&signature))).await;
        assert_eq!(status, StatusCode::OK);
        log_ids.push(response["log_id"].as_str().unwrap().to_string());
        // Distinct received_at values
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let queued = p.queue.bodies();
    let batch = vec![queued[0].clone(), "{malformed".to_string(), queued[1].clone()];

    let (status, response) = send(&p.trigger, trigger_request(&batch)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"status": "success", "processed": 2, "errors": 1}));
    assert_eq!(p.store.len().await, 2);

    let (status, response) = send(&p.logs, get("/logs")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["total"], 2);
    let logs = response["logs"].as_array().unwrap();
    // Newest first
    assert_eq!(logs[0]["log_id"], log_ids[1].as_str());
    assert_eq!(logs[1]["log_id"], log_ids[0].as_str());
    for log in logs {
        assert!(log["processed_at"].is_string());
        assert!(log["signature"].as_str().unwrap().starts_with("sha256="));
        assert_eq!(log["payload"]["data"]["n"], 1);
    }
}

#[tokio::test]
async fn test_empty_trigger_batch() {
    let p = pipeline();

    let (status, response) = send(&p.trigger, trigger_request(&[])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"status": "success", "processed": 0, "errors": 0}));
    assert!(p.store.is_empty().await);
}

#[tokio::test]
async fn test_malformed_trigger_envelope_requests_redelivery() {
    let p = pipeline();
    let request = Request::builder()
        .method("POST")
        .uri("/trigger")
        .body(Body::from("[not, a, batch"))
        .unwrap();

    let (status, response) = send(&p.trigger, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response, json!({"error": "Internal processing error"}));
}

#[tokio::test]
async fn test_logs_limit_and_filter() {
    let p = pipeline();

    let mut bodies = Vec::new();
    for i in 0..3 {
        let event_type = if i == 1 { "other" } else { "wanted" };
        let body = json!({"event_type": event_type, "i": i}).to_string();
        let signature = sign(SECRET, body.as_bytes());
        send(&p.receiver, webhook_request(&body, Some(&signature))).await;
    }
    bodies.extend(p.queue.bodies());
    send(&p.trigger, trigger_request(&bodies)).await;

    let (_, response) = send(&p.logs, get("/logs?event_type=wanted")).await;
    assert_eq!(response["total"], 2);
    assert!(response["logs"]
        .as_array()
        .unwrap()
        .iter()
        .all(|l| l["event_type"] == "wanted"));

    let (_, response) = send(&p.logs, get("/logs?event_type=")).await;
    assert_eq!(response["total"], 3);

    let (_, response) = send(&p.logs, get("/logs?limit=0")).await;
    assert_eq!(response["total"], 1);

    let (status, response) = send(&p.logs, get("/logs?limit=abc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["total"], 3);

    let (_, response) = send(&p.logs, get("/logs?limit=99999999999999999999")).await;
    assert_eq!(response["total"], 3);

    let (_, response) = send(&p.logs, get("/logs?limit=-99999999999999999999")).await;
    assert_eq!(response["total"], 1);

    let (_, response) = send(&p.logs, get("/logs?event_type=missing")).await;
    assert_eq!(response, json!({"logs": [], "total": 0}));
}

#[tokio::test]
async fn test_logs_cors_header() {
    let p = pipeline();
    let request = Request::builder()
        .uri("/logs")
        .header(header::ORIGIN, "https://dashboard.example.com")
        .body(Body::empty())
        .unwrap();

    let response = p.logs.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_health_endpoints() {
    let p = pipeline();

    let (status, response) = send(&p.receiver, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"status": "ok"}));

    let (status, response) = send(&p.trigger, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"status": "healthy", "service": "webhook-processor"}));
}

/// Ten large but valid messages exceed axum's default 2 MB body limit; the
/// batch must still be processed rather than refused as a whole.
#[tokio::test]
async fn test_large_trigger_batch_is_processed() {
    let p = pipeline();
    let filler = "x".repeat(250_000);

    let bodies: Vec<String> = (0..10)
        .map(|i| {
            let envelope = WebhookEnvelope::new(
                "bulk".to_string(),
                json!({"event_type": "bulk", "i": i, "filler": filler}),
                "sha256=00".to_string(),
            );
            serde_json::to_string(&envelope).unwrap()
        })
        .collect();
    let request = trigger_request(&bodies);
    let size: usize = bodies.iter().map(String::len).sum();
    assert!(size > 2 * 1024 * 1024);

    let (status, response) = send(&p.trigger, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"status": "success", "processed": 10, "errors": 0}));
    assert_eq!(p.store.len().await, 10);
}

/// A trigger batch of maximum-size webhooks full of characters that need
/// escaping still fits.
#[tokio::test]
async fn test_trigger_admits_escaped_maximum_webhooks() {
    let p = pipeline();
    // Quotes double in size on every JSON string hop
    let quotes = "\"".repeat(WEBHOOK_BODY_LIMIT / 4);

    let bodies: Vec<String> = (0..2)
        .map(|_| {
            let envelope = WebhookEnvelope::new(
                "quoted".to_string(),
                json!({"text": quotes}),
                "sha256=00".to_string(),
            );
            serde_json::to_string(&envelope).unwrap()
        })
        .collect();

    let (status, response) = send(&p.trigger, trigger_request(&bodies)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["processed"], 2);
}

#[tokio::test]
async fn test_oversized_webhook_is_refused() {
    let p = pipeline();
    let body = format!(r#"{{"blob":"{}"}}"#, "a".repeat(WEBHOOK_BODY_LIMIT));
    let signature = sign(SECRET, body.as_bytes());

    let response = p
        .receiver
        .clone()
        .oneshot(webhook_request(&body, Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(p.queue.is_empty());
}

#[tokio::test]
async fn test_big_integers_are_stored_verbatim() {
    let p = pipeline();
    let body = r#"{"event_type":"ledger","amount":123456789012345678901234567890}"#;
    let signature = sign(SECRET, body.as_bytes());

    let (status, _) = send(&p.receiver, webhook_request(body, Some(&signature))).await;
    assert_eq!(status, StatusCode::OK);
    send(&p.trigger, trigger_request(&p.queue.bodies())).await;

    let (_, response) = send(&p.logs, get("/logs?event_type=ledger")).await;

    assert_eq!(
        response["logs"][0]["payload"]["amount"].to_string(),
        "123456789012345678901234567890"
    );
}
