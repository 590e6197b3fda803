//! Webhook authentication.
//!
//! Deliveries are signed with HMAC-SHA-256 over the raw body using the app
//! secret and sent as `X-Hub-Signature-256: sha256=<hex>`. Verification fails
//! closed: without a secret or a signature the delivery is rejected, unless
//! unsigned deliveries were explicitly allowed.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("no app secret configured")]
    MissingSecret,

    #[error("missing signature header")]
    MissingSignature,

    #[error("malformed signature header")]
    MalformedSignature,

    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies delivery signatures against the configured app secret.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: Option<String>,
    allow_unsigned: bool,
}

impl SignatureVerifier {
    pub fn new(secret: Option<String>, allow_unsigned: bool) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            allow_unsigned,
        }
    }

    /// Whether deliveries that cannot be verified are let through.
    pub fn allows_unsigned(&self) -> bool {
        self.allow_unsigned
    }

    /// Check `header` (the raw `X-Hub-Signature-256` value) against `body`.
    ///
    /// A signature that is present is always checked, even when unsigned
    /// deliveries are allowed.
    pub fn verify(&self, header: Option<&str>, body: &[u8]) -> Result<(), AuthError> {
        let header = header.map(str::trim).filter(|h| !h.is_empty());
        let (secret, header) = match (&self.secret, header) {
            (Some(secret), Some(header)) => (secret, header),
            _ if self.allow_unsigned => return Ok(()),
            (None, _) => return Err(AuthError::MissingSecret),
            (Some(_), None) => return Err(AuthError::MissingSignature),
        };

        let hex_sig = header.strip_prefix("sha256=").unwrap_or(header).trim();
        let expected = hex::decode(hex_sig).map_err(|_| AuthError::MalformedSignature)?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| AuthError::MissingSecret)?;
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| AuthError::Mismatch)
    }
}

/// Compute the header value the platform would send for `body`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of the handshake verify token.
pub fn verify_token_matches(expected: &str, provided: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
