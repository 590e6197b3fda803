//! Channel error types.

use thiserror::Error;

/// Errors that can occur when talking to the messaging platform.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error response
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response decoded but lacked a required field
    #[error("unexpected api response: {0}")]
    Response(String),
}

impl ChannelError {
    /// Whether a retry could succeed: transport failures, throttling and
    /// server-side errors. Other API rejections are final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Response(_) => false,
        }
    }
}
