//! WhatsApp Cloud API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tapflow_protocol::OutboundMessage;
use tracing::{debug, warn};

use super::{ChannelError, Messenger};
use crate::config::WhatsAppConfig;

/// Sends messages through the Graph API `/{phone_number_id}/messages` endpoint.
pub struct CloudApiClient {
    client: Client,
    api_base: String,
    access_token: String,
    phone_number_id: String,
    image_retry_delay: Duration,
}

impl CloudApiClient {
    pub fn new(
        api_base: String,
        access_token: String,
        phone_number_id: String,
        timeout: Duration,
        image_retry_delay: Duration,
    ) -> Result<Self, ChannelError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token,
            phone_number_id,
            image_retry_delay,
        })
    }

    pub fn from_config(config: &WhatsAppConfig) -> Result<Self, ChannelError> {
        Self::new(
            format!(
                "{}/{}",
                config.graph_base_url.trim_end_matches('/'),
                config.api_version
            ),
            config.access_token.clone().unwrap_or_default(),
            config.phone_number_id.clone().unwrap_or_default(),
            Duration::from_secs(config.request_timeout_seconds),
            Duration::from_millis(config.image_retry_delay_ms),
        )
    }

    async fn post_message(&self, to: &str, message: &OutboundMessage) -> Result<(), ChannelError> {
        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&message.to_cloud_payload(to))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ChannelError::Api { status, message });
        }
        Ok(())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, ChannelError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ChannelError::Api { status, message });
        }
        Ok(response.json().await?)
    }
}

#[derive(Deserialize)]
struct MediaInfo {
    url: Option<String>,
}

#[derive(Deserialize)]
struct PhoneNumberInfo {
    display_phone_number: Option<String>,
}

#[async_trait]
impl Messenger for CloudApiClient {
    async fn send(&self, to: &str, message: OutboundMessage) -> Result<(), ChannelError> {
        match self.post_message(to, &message).await {
            Ok(()) => Ok(()),
            // Media fetches on the platform side fail transiently; one retry.
            Err(e) if matches!(message, OutboundMessage::Image { .. }) && e.is_transient() => {
                warn!(to, error = %e, "Image send failed, retrying once");
                tokio::time::sleep(self.image_retry_delay).await;
                self.post_message(to, &message).await
            }
            Err(e) => Err(e),
        }
    }

    async fn media_url(&self, media_id: &str) -> Result<String, ChannelError> {
        let info: MediaInfo = self
            .get_json(&format!("{}/{}", self.api_base, media_id))
            .await?;
        info.url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ChannelError::Response(format!("media {media_id} has no url")))
    }

    async fn display_number(&self) -> Result<String, ChannelError> {
        let url = format!(
            "{}/{}?fields=display_phone_number",
            self.api_base, self.phone_number_id
        );
        let info: PhoneNumberInfo = self.get_json(&url).await?;
        let digits: String = info
            .display_phone_number
            .unwrap_or_default()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        if digits.is_empty() {
            return Err(ChannelError::Response(
                "phone number has no display_phone_number".into(),
            ));
        }
        debug!(display_number = %digits, "Resolved bot display number");
        Ok(digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct Graph {
        bodies: Arc<Mutex<Vec<Value>>>,
        auth: Arc<Mutex<Vec<String>>>,
        image_failures: Arc<AtomicUsize>,
    }

    async fn messages(
        State(graph): State<Graph>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            graph.auth.lock().await.push(auth.to_string());
        }
        let is_image = body["type"] == "image";
        let rejected = body["image"]["caption"] == "rejected";
        graph.bodies.lock().await.push(body);
        if rejected {
            return StatusCode::BAD_REQUEST;
        }
        if is_image && graph.image_failures.fetch_add(1, Ordering::SeqCst) == 0 {
            return StatusCode::BAD_GATEWAY;
        }
        StatusCode::OK
    }

    async fn object(Path(id): Path<String>) -> Json<Value> {
        if id == "PNID" {
            Json(json!({ "display_phone_number": "+250 788 000 000" }))
        } else {
            Json(json!({ "url": format!("https://cdn.example/{id}") }))
        }
    }

    async fn spawn_graph() -> (CloudApiClient, Graph) {
        let graph = Graph::default();
        let app = Router::new()
            .route("/v21.0/{id}/messages", post(messages))
            .route("/v21.0/{id}", get(object))
            .with_state(graph.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = CloudApiClient::new(
            format!("http://{addr}/v21.0"),
            "token-123".into(),
            "PNID".into(),
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .unwrap();
        (client, graph)
    }

    #[tokio::test]
    async fn sends_text_with_bearer_token() {
        let (client, graph) = spawn_graph().await;
        client.send_text("250788111222", "hello").await.unwrap();

        let bodies = graph.bodies.lock().await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["to"], "250788111222");
        assert_eq!(bodies[0]["text"]["body"], "hello");
        assert_eq!(graph.auth.lock().await[0], "Bearer token-123");
    }

    #[tokio::test]
    async fn image_send_retries_once() {
        let (client, graph) = spawn_graph().await;
        client
            .send_image("250788111222", "https://qr.example/x.png", Some("QR"))
            .await
            .unwrap();
        assert_eq!(graph.bodies.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn rejected_image_is_not_retried() {
        let (client, graph) = spawn_graph().await;
        let err = client
            .send_image("250788111222", "https://qr.example/x.png", Some("rejected"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Api { status: 400, .. }));
        assert_eq!(graph.bodies.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn media_and_display_number_lookups() {
        let (client, _graph) = spawn_graph().await;
        assert_eq!(
            client.media_url("MEDIA1").await.unwrap(),
            "https://cdn.example/MEDIA1"
        );
        assert_eq!(client.display_number().await.unwrap(), "250788000000");
    }

    #[tokio::test]
    async fn api_errors_surface_status() {
        let client = CloudApiClient::new(
            "http://127.0.0.1:9/v21.0".into(),
            "t".into(),
            "PNID".into(),
            Duration::from_millis(200),
            Duration::from_millis(1),
        )
        .unwrap();
        let err = client.send_text("1", "x").await.unwrap_err();
        assert!(matches!(err, ChannelError::Request(_)));
    }
}
