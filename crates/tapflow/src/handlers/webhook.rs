//! WhatsApp webhook endpoints.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use tapflow_protocol::WebhookEnvelope;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::auth::{SIGNATURE_HEADER, verify_token_matches};
use crate::server::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SubscriptionQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /webhook
pub async fn verify_subscription(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionQuery>,
) -> Response {
    let token_ok = match (&state.verify_token, &query.verify_token) {
        (Some(expected), Some(provided)) => verify_token_matches(expected, provided),
        _ => false,
    };
    if query.mode.as_deref() != Some("subscribe") || !token_ok {
        warn!(mode = ?query.mode, "Webhook subscription refused");
        return StatusCode::FORBIDDEN.into_response();
    }

    info!("Webhook subscription verified");
    (StatusCode::OK, query.challenge.unwrap_or_default()).into_response()
}

/// POST /webhook
pub async fn receive_delivery(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = state.verifier.verify(signature, &body) {
        warn!(error = %e, "Webhook signature rejected");
        return (StatusCode::UNAUTHORIZED, "invalid signature").into_response();
    }

    let envelope = match WebhookEnvelope::parse(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Webhook body is not valid JSON");
            return (StatusCode::BAD_REQUEST, "invalid payload").into_response();
        }
    };

    let Some(message) = envelope.first_message() else {
        debug!("Delivery carries no message event");
        return StatusCode::OK.into_response();
    };
    let Some(sender) = message.sender.clone() else {
        warn!(message_id = ?message.id, "Message without sender ignored");
        return StatusCode::OK.into_response();
    };

    if !state.gate.admit(message.id.as_deref()).await {
        return StatusCode::OK.into_response();
    }

    let request_id = Ulid::new().to_string();
    debug!(
        request_id = %request_id,
        message_id = ?message.id,
        event = message.type_name(),
        "Delivery admitted"
    );
    state
        .router
        .handle(&state.services, &sender, &message, &request_id)
        .await;

    StatusCode::OK.into_response()
}
