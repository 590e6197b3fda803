//! Geospatial matching collaborator.
//!
//! Ranking nearby drivers, passengers, businesses and trips is done by an
//! external service. Failures never reach the user: they are logged and
//! treated as an empty result.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::EndpointConfig;
use crate::store::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Drivers,
    Passengers,
    Businesses,
    Trips,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchQuery {
    pub kind: MatchKind,
    pub origin: GeoPoint,
    /// The asking user, excluded from results.
    pub viewer_id: String,
    /// Vehicle type or business category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub limit: usize,
}

impl MatchQuery {
    pub fn new(kind: MatchKind, origin: GeoPoint, viewer_id: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            viewer_id: viewer_id.into(),
            filter: None,
            limit: 9,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// One ranked counterparty. `id` is a user, business or trip id depending on the query kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatchRow {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl MatchRow {
    /// Row description shown under the title.
    pub fn describe(&self) -> String {
        match self.distance_km {
            Some(km) if km < 1.0 => format!("{:.0} m away", km * 1000.0),
            Some(km) => format!("{km:.1} km away"),
            None => String::new(),
        }
    }
}

#[async_trait]
pub trait MatchingEngine: Send + Sync {
    /// Ranked matches, nearest first. Never fails.
    async fn nearby(&self, query: &MatchQuery) -> Vec<MatchRow>;
}

// ============================================================================
// HTTP client
// ============================================================================

#[derive(Deserialize)]
struct MatchResponse {
    #[serde(default)]
    rows: Vec<MatchRow>,
}

/// POSTs the query as JSON and expects `{"rows": [...]}`.
pub struct HttpMatchingEngine {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpMatchingEngine {
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

    async fn query(&self, query: &MatchQuery) -> Result<Vec<MatchRow>, reqwest::Error> {
        let mut request = self.client.post(&self.url).json(query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response: MatchResponse = request.send().await?.error_for_status()?.json().await?;
        Ok(response.rows)
    }
}

#[async_trait]
impl MatchingEngine for HttpMatchingEngine {
    async fn nearby(&self, query: &MatchQuery) -> Vec<MatchRow> {
        match self.query(query).await {
            Ok(mut rows) => {
                rows.retain(|row| row.id != query.viewer_id);
                rows.truncate(query.limit);
                rows
            }
            Err(e) => {
                warn!(kind = ?query.kind, error = %e, "Matching query failed");
                Vec::new()
            }
        }
    }
}

// ============================================================================
// Fixed results
// ============================================================================

/// Serves preset rows per kind. With no rows it stands in for a disabled service.
#[derive(Default)]
pub struct StaticMatchingEngine {
    rows: HashMap<MatchKind, Vec<MatchRow>>,
}

impl StaticMatchingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, kind: MatchKind, rows: Vec<MatchRow>) -> Self {
        self.rows.insert(kind, rows);
        self
    }
}

#[async_trait]
impl MatchingEngine for StaticMatchingEngine {
    async fn nearby(&self, query: &MatchQuery) -> Vec<MatchRow> {
        self.rows
            .get(&query.kind)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.id != query.viewer_id)
                    .take(query.limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
