use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Config (root)
// ============================================================================

/// Outbound sends a single flow step may make in sequence.
const SENDS_PER_REQUEST: u32 = 4;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }

    /// Deadline for one webhook request.
    ///
    /// The delivery is already in the ledger when the flow runs, so a request
    /// cut off here is never retried. The configured value is raised to cover
    /// the slowest step: one extraction, one match lookup, a few sends and the
    /// image retry.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds).max(self.collaborator_budget())
    }

    fn collaborator_budget(&self) -> Duration {
        let send = Duration::from_secs(self.whatsapp.request_timeout_seconds);
        Duration::from_secs(self.services.extraction.timeout_seconds)
            .saturating_add(Duration::from_secs(self.services.matching.timeout_seconds))
            .saturating_add(send.saturating_mul(SENDS_PER_REQUEST))
            .saturating_add(Duration::from_millis(self.whatsapp.image_retry_delay_ms))
    }

    /// Overlay secrets and deployment settings from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Overlay values from `lookup`, which maps an environment variable name to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = lookup("WHATSAPP_VERIFY_TOKEN") {
            self.webhook.verify_token = Some(v);
        }
        if let Some(v) = lookup("WHATSAPP_APP_SECRET") {
            self.webhook.app_secret = Some(v);
        }
        if let Some(v) = lookup("WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = Some(v);
        }
        if let Some(v) = lookup("WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = Some(v);
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.database.url = v;
        }
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

// ============================================================================
// WebhookConfig
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct WebhookConfig {
    /// Token the platform echoes during the subscription handshake.
    #[serde(default)]
    pub verify_token: Option<String>,
    /// App secret used to verify `X-Hub-Signature-256`.
    #[serde(default)]
    pub app_secret: Option<String>,
    /// Accept deliveries that cannot be verified (no secret or no signature).
    /// Development only.
    #[serde(default)]
    pub allow_unsigned: bool,
}

// ============================================================================
// WhatsAppConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub phone_number_id: Option<String>,
    /// The bot's own number for share links. Looked up from the Graph API when unset.
    #[serde(default)]
    pub display_number: Option<String>,
    #[serde(default = "default_send_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_image_retry_delay")]
    pub image_retry_delay_ms: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            graph_base_url: default_graph_base_url(),
            api_version: default_api_version(),
            access_token: None,
            phone_number_id: None,
            display_number: None,
            request_timeout_seconds: default_send_timeout(),
            image_retry_delay_ms: default_image_retry_delay(),
        }
    }
}

fn default_graph_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v21.0".to_string()
}

fn default_send_timeout() -> u64 {
    10
}

fn default_image_retry_delay() -> u64 {
    600
}

// ============================================================================
// DatabaseConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// `memory`, `sqlite://path`, or a bare file path.
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://tapflow.db".to_string()
}

fn default_pool_size() -> u32 {
    5
}

// ============================================================================
// ServicesConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub matching: EndpointConfig,
    #[serde(default)]
    pub extraction: EndpointConfig,
    /// Base URL of the QR rendering service; `data` and `size` are appended as query parameters.
    #[serde(default = "default_qr_renderer_url")]
    pub qr_renderer_url: String,
    #[serde(default = "default_admin_cache")]
    pub admin_cache_seconds: u64,
    #[serde(default = "default_identity_cache")]
    pub identity_cache_seconds: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            matching: EndpointConfig::default(),
            extraction: EndpointConfig::default(),
            qr_renderer_url: default_qr_renderer_url(),
            admin_cache_seconds: default_admin_cache(),
            identity_cache_seconds: default_identity_cache(),
        }
    }
}

fn default_qr_renderer_url() -> String {
    "https://api.qrserver.com/v1/create-qr-code/".to_string()
}

fn default_admin_cache() -> u64 {
    300
}

fn default_identity_cache() -> u64 {
    3600
}

// ============================================================================
// EndpointConfig
// ============================================================================

/// An external HTTP collaborator. Without a URL the collaborator is disabled
/// and behaves as if every call failed.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_endpoint_timeout")]
    pub timeout_seconds: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_seconds: default_endpoint_timeout(),
        }
    }
}

fn default_endpoint_timeout() -> u64 {
    8
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

// ============================================================================
// Tests
// ============================================================================
