use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::timeout::TimeoutLayer;

use crate::auth::SignatureVerifier;
use crate::flows::Services;
use crate::handlers;
use crate::idempotency::IdempotencyGate;
use crate::router;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub router: Arc<router::Router>,
    pub gate: IdempotencyGate,
    pub verifier: SignatureVerifier,
    /// Token expected during the subscription handshake. Without one every
    /// handshake is refused.
    pub verify_token: Option<String>,
}

/// Build the HTTP app. `request_timeout` should come from
/// [`Config::request_timeout`](crate::config::Config::request_timeout): a delivery
/// cut off after the ledger insert is not processed again.
pub fn build_app(state: AppState, request_timeout: Duration) -> Router {
    let webhook = Router::new()
        .route(
            "/webhook",
            get(handlers::verify_subscription).post(handlers::receive_delivery),
        )
        .with_state(state);

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .merge(webhook)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
}
