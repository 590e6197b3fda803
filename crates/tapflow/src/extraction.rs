//! Document extraction collaborator.
//!
//! Uploaded insurance documents are sent to an extraction service that returns
//! normalized fields. The user-facing reply never waits on a successful
//! extraction: any failure yields `None`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::config::EndpointConfig;

pub type ExtractedFields = Map<String, Value>;

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, file_url: &str) -> Option<ExtractedFields>;
}

#[derive(Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    fields: Option<ExtractedFields>,
}

/// POSTs `{"file_url": ...}` and expects `{"fields": {...}}`.
pub struct HttpDocumentExtractor {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpDocumentExtractor {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url,
            api_key,
        })
    }

    pub fn from_config(config: &EndpointConfig) -> reqwest::Result<Option<Self>> {
        let Some(url) = config.url.clone() else {
            return Ok(None);
        };
        Self::new(
            url,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
        .map(Some)
    }

    async fn request(&self, file_url: &str) -> Result<Option<ExtractedFields>, reqwest::Error> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&json!({ "file_url": file_url }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response: ExtractionResponse =
            request.send().await?.error_for_status()?.json().await?;
        Ok(response.fields.filter(|fields| !fields.is_empty()))
    }
}

#[async_trait]
impl DocumentExtractor for HttpDocumentExtractor {
    async fn extract(&self, file_url: &str) -> Option<ExtractedFields> {
        match self.request(file_url).await {
            Ok(fields) => fields,
            Err(e) => {
                warn!(error = %e, "Document extraction failed");
                None
            }
        }
    }
}

/// Returns a preset result. `None` stands in for a disabled service.
#[derive(Default)]
pub struct StaticDocumentExtractor {
    fields: Option<ExtractedFields>,
}

impl StaticDocumentExtractor {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn returning(fields: ExtractedFields) -> Self {
        Self {
            fields: Some(fields),
        }
    }
}

#[async_trait]
impl DocumentExtractor for StaticDocumentExtractor {
    async fn extract(&self, _file_url: &str) -> Option<ExtractedFields> {
        self.fields.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/extract")
    }

    #[tokio::test]
    async fn extracts_fields() {
        async fn extract(Json(body): Json<Value>) -> Json<Value> {
            assert_eq!(body["file_url"], "https://media.invalid/doc");
            Json(json!({ "fields": { "plate": "RAB123C", "insurer": "SONARWA" } }))
        }
        let url = serve(Router::new().route("/extract", post(extract))).await;
        let extractor = HttpDocumentExtractor::new(url, None, Duration::from_secs(5)).unwrap();

        let fields = extractor.extract("https://media.invalid/doc").await.unwrap();
        assert_eq!(fields["plate"], "RAB123C");
    }

    #[tokio::test]
    async fn server_error_yields_none() {
        async fn extract() -> StatusCode {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        let url = serve(Router::new().route("/extract", post(extract))).await;
        let extractor = HttpDocumentExtractor::new(url, None, Duration::from_secs(5)).unwrap();
        assert!(extractor.extract("https://media.invalid/doc").await.is_none());
    }

    #[tokio::test]
    async fn static_extractor() {
        assert!(StaticDocumentExtractor::disabled().extract("x").await.is_none());
        let mut fields = ExtractedFields::new();
        fields.insert("plate".into(), json!("RAA001A"));
        let extractor = StaticDocumentExtractor::returning(fields);
        assert_eq!(extractor.extract("x").await.unwrap()["plate"], "RAA001A");
    }
}
