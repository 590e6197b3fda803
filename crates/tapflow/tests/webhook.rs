mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;
use tapflow::auth::{SignatureVerifier, sign};

use common::{SECRET, TestApp, VERIFY_TOKEN, text};

const PHONE: &str = "250788000001";

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn handshake_echoes_challenge() {
    let app = TestApp::new();
    let (status, body) = app
        .get(&format!(
            "/webhook?hub.mode=subscribe&hub.verify_token={VERIFY_TOKEN}&hub.challenge=12345"
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "12345");
}

#[tokio::test]
async fn handshake_refuses_bad_token_or_mode() {
    let app = TestApp::new();
    let (status, _) = app
        .get("/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1")
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .get(&format!(
            "/webhook?hub.mode=unsubscribe&hub.verify_token={VERIFY_TOKEN}&hub.challenge=1"
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/webhook").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_endpoints() {
    let app = TestApp::new();
    assert_eq!(app.get("/livez").await, (StatusCode::OK, "ok".to_string()));
    assert_eq!(app.get("/readyz").await, (StatusCode::OK, "ok".to_string()));
    let (status, body) = app.get("/version").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(env!("CARGO_PKG_VERSION")));
}

// ============================================================================
// Signatures
// ============================================================================

#[tokio::test]
async fn valid_signature_is_processed() {
    let app = TestApp::new();
    assert_eq!(app.deliver(&text(PHONE, "wamid.1", "menu")).await, StatusCode::OK);
    assert!(!app.messenger.sent_to(PHONE).await.is_empty());
}

#[tokio::test]
async fn bad_or_missing_signature_is_rejected_without_side_effects() {
    let app = TestApp::new();
    let body = serde_json::to_vec(&text(PHONE, "wamid.1", "menu")).unwrap();

    let forged = sign("other-secret", &body);
    assert_eq!(app.post(body.clone(), Some(forged)).await, StatusCode::UNAUTHORIZED);
    assert_eq!(
        app.post(body.clone(), Some("sha256=zz".into())).await,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(app.post(body, None).await, StatusCode::UNAUTHORIZED);

    assert!(app.messenger.sent().await.is_empty());
    assert_eq!(app.store.delivery_count("wamid.1").await, 0);
}

#[tokio::test]
async fn tampered_body_is_rejected() {
    let app = TestApp::new();
    let body = serde_json::to_vec(&text(PHONE, "wamid.1", "menu")).unwrap();
    let signature = sign(SECRET, &body);
    let tampered = serde_json::to_vec(&text(PHONE, "wamid.1", "stop")).unwrap();
    assert_eq!(app.post(tampered, Some(signature)).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_secret_fails_closed() {
    let app = TestApp::with_verifier(SignatureVerifier::new(None, false));
    let body = serde_json::to_vec(&text(PHONE, "wamid.1", "menu")).unwrap();
    let signature = sign(SECRET, &body);
    assert_eq!(app.post(body, Some(signature)).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unsigned_allowed_only_when_opted_in() {
    let app = TestApp::with_verifier(SignatureVerifier::new(None, true));
    let body = serde_json::to_vec(&text(PHONE, "wamid.1", "menu")).unwrap();
    assert_eq!(app.post(body, None).await, StatusCode::OK);
    assert!(!app.messenger.sent_to(PHONE).await.is_empty());
}

// ============================================================================
// Payload shapes
// ============================================================================

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = TestApp::new();
    let body = b"{not json".to_vec();
    let signature = sign(SECRET, &body);
    assert_eq!(app.post(body, Some(signature)).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deliveries_without_a_message_are_acknowledged() {
    let app = TestApp::new();
    let status_callback = json!({
        "object": "whatsapp_business_account",
        "entry": [{ "changes": [{ "value": { "statuses": [{ "id": "wamid.9", "status": "read" }] } }] }]
    });
    assert_eq!(app.deliver(&status_callback).await, StatusCode::OK);
    assert_eq!(app.deliver(&json!({})).await, StatusCode::OK);

    let no_sender = json!({
        "entry": [{ "changes": [{ "value": { "messages": [
            { "id": "wamid.2", "type": "text", "text": { "body": "hi" } }
        ] } }] }]
    });
    assert_eq!(app.deliver(&no_sender).await, StatusCode::OK);
    assert!(app.messenger.sent().await.is_empty());
}

#[tokio::test]
async fn other_verbs_are_not_allowed() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let app = TestApp::new();
    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/webhook")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// ============================================================================
// Idempotency
// ============================================================================

#[tokio::test]
async fn redelivery_is_processed_once() {
    let app = TestApp::new();
    let delivery = text(PHONE, "wamid.dup", "menu");
    assert_eq!(app.deliver(&delivery).await, StatusCode::OK);
    let after_first = app.messenger.sent_to(PHONE).await.len();
    assert!(after_first > 0);

    assert_eq!(app.deliver(&delivery).await, StatusCode::OK);
    assert_eq!(app.messenger.sent_to(PHONE).await.len(), after_first);
    assert_eq!(app.store.delivery_count("wamid.dup").await, 1);
}

#[tokio::test]
async fn concurrent_redeliveries_run_one_handler() {
    let app = Arc::new(TestApp::new());
    let delivery = text(PHONE, "wamid.race", "menu");

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        let delivery = delivery.clone();
        tasks.push(tokio::spawn(async move { app.deliver(&delivery).await }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    // One home menu is a list plus the invite buttons.
    assert_eq!(app.messenger.sent_to(PHONE).await.len(), 2);
    assert_eq!(app.store.delivery_count("wamid.race").await, 1);
}

#[tokio::test]
async fn messages_without_id_are_always_fresh() {
    let app = TestApp::new();
    let delivery = common::envelope(
        PHONE,
        json!({ "from": PHONE, "type": "text", "text": { "body": "menu" } }),
    );
    app.deliver(&delivery).await;
    app.deliver(&delivery).await;
    assert_eq!(app.messenger.sent_to(PHONE).await.len(), 4);
}
