//! Request signatures for the chat command endpoint.
//!
//! The chat platform signs each request with the app's signing secret:
//!
//! ```text
//! X-Slack-Request-Timestamp: 1531420618
//! X-Slack-Signature: v0=<hex(HMAC-SHA256(secret, "v0:" + timestamp + ":" + body))>
//! ```
//!
//! Requests older than [`MAX_REQUEST_AGE`] are rejected so a captured
//! request cannot be replayed later.

use std::time::Duration;

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Signature scheme version prefix.
const VERSION: &str = "v0";

/// Largest accepted distance between the request timestamp and now.
pub const MAX_REQUEST_AGE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing header {0}")]
    Missing(&'static str),

    #[error("malformed header {0}")]
    Malformed(&'static str),

    #[error("request timestamp outside the accepted window")]
    Stale,

    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies signed requests against a shared signing secret.
#[derive(Clone)]
pub struct RequestVerifier {
    secret: Vec<u8>,
    max_age: Duration,
}

impl std::fmt::Debug for RequestVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestVerifier")
            .field("secret", &"<redacted>")
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl RequestVerifier {
    #[must_use]
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            max_age: MAX_REQUEST_AGE,
        }
    }

    fn keyed(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| SignatureError::Mismatch)?;
        mac.update(VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Ok(mac)
    }

    /// Signature header value for `body` sent at `timestamp` (unix seconds).
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::Mismatch`] if the secret cannot key the MAC.
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
        let mac = self.keyed(&timestamp.to_string(), body)?;
        Ok(format!("{VERSION}={}", hex::encode(mac.finalize().into_bytes())))
    }

    /// Checks the signature headers against the current time.
    ///
    /// # Errors
    ///
    /// See [`RequestVerifier::verify_at`].
    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), SignatureError> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        self.verify_at(headers, body, now)
    }

    /// Checks the signature headers as of `now` (unix seconds).
    ///
    /// # Errors
    ///
    /// - [`SignatureError::Missing`] or [`SignatureError::Malformed`] for
    ///   absent or unparseable headers
    /// - [`SignatureError::Stale`] if the timestamp is too far from `now`
    /// - [`SignatureError::Mismatch`] if the signature does not match
    pub fn verify_at(&self, headers: &HeaderMap, body: &[u8], now: i64) -> Result<(), SignatureError> {
        let timestamp = header_str(headers, TIMESTAMP_HEADER)?;
        let sent_at: i64 = timestamp
            .parse()
            .map_err(|_| SignatureError::Malformed(TIMESTAMP_HEADER))?;
        if now.abs_diff(sent_at) > self.max_age.as_secs() {
            return Err(SignatureError::Stale);
        }

        let signature = header_str(headers, SIGNATURE_HEADER)?
            .strip_prefix("v0=")
            .and_then(|hex_sig| hex::decode(hex_sig).ok())
            .ok_or(SignatureError::Malformed(SIGNATURE_HEADER))?;

        // verify_slice compares in constant time.
        self.keyed(timestamp, body)?
            .verify_slice(&signature)
            .map_err(|_| SignatureError::Mismatch)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .ok_or(SignatureError::Missing(name))?
        .to_str()
        .map_err(|_| SignatureError::Malformed(name))
}
