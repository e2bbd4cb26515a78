//! Bearer credential caching.
//!
//! The provider issues short-lived bearer tokens from its token endpoint in
//! exchange for fixed service credentials. [`CredentialCache`] holds at most
//! one token and refreshes it when it is absent or close to expiry.
//!
//! # Expiry margin
//!
//! A token whose expiry is within `token_refresh_margin` of now is treated as
//! already expired, so requests never race the provider's clock.
//!
//! # Concurrency
//!
//! Refreshes are single-flight: callers that observe a stale token queue on a
//! refresh lock and re-check the cache once they hold it, so a burst of
//! callers produces one token request.
//!
//! # Failure
//!
//! A failed refresh leaves the cached credential untouched and returns
//! [`ProviderError::AuthFailure`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::config::{ConfigError, ProviderConfig};
use crate::error::ProviderError;
use crate::principal::{Envelope, TokenRequest, TokenResponse};

/// Upper bound on a token's lifetime, whatever `expires_in` claims.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// A bearer token and the instant it stops being valid.
#[derive(Clone)]
pub struct Credential {
    token: String,
    expires_at: Instant,
}

impl Credential {
    /// Creates a credential valid for `ttl` from now, capped at
    /// [`MAX_TOKEN_LIFETIME`].
    #[must_use]
    pub fn new(token: impl Into<String>, ttl: Duration) -> Self {
        let now = Instant::now();
        let ttl = ttl.min(MAX_TOKEN_LIFETIME);
        Self {
            token: token.into(),
            expires_at: now.checked_add(ttl).unwrap_or(now),
        }
    }

    /// The bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// When the token expires.
    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Returns `true` if the token is valid for longer than `margin`.
    #[must_use]
    pub fn is_fresh(&self, margin: Duration) -> bool {
        Instant::now()
            .checked_add(margin)
            .is_some_and(|deadline| deadline < self.expires_at)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Single-token cache in front of the provider's token endpoint.
pub struct CredentialCache {
    /// HTTP client, shared with the roster client.
    http_client: reqwest::Client,
    /// Token endpoint.
    token_url: Url,
    /// Service account.
    username: String,
    password: String,
    /// Safety margin before expiry.
    margin: Duration,
    /// The current credential, replaced whole on refresh.
    current: RwLock<Option<Credential>>,
    /// Serializes refreshes.
    refresh_lock: Mutex<()>,
    /// Number of token requests issued.
    refreshes: AtomicU64,
}

impl CredentialCache {
    /// Creates an empty cache for the configured token endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the token URL is malformed.
    pub fn new(config: &ProviderConfig, http_client: reqwest::Client) -> Result<Self, ConfigError> {
        Ok(Self {
            http_client,
            token_url: config.token_url()?,
            username: config.username.clone(),
            password: config.password.clone(),
            margin: config.token_refresh_margin,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            refreshes: AtomicU64::new(0),
        })
    }

    /// Returns a valid bearer token, refreshing it if needed.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::AuthFailure` if a new token is needed and the
    /// token endpoint fails, answers with an error status, or omits the token.
    pub async fn get_token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.fresh_token().await {
            tracing::trace!("Using cached provider token");
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        self.refresh().await
    }

    /// Replaces a token the provider rejected.
    ///
    /// If a concurrent caller already replaced `rejected` with a fresh token,
    /// that token is returned without another request.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::AuthFailure` if the refresh fails.
    pub async fn force_refresh(&self, rejected: &str) -> Result<String, ProviderError> {
        let _guard = self.refresh_lock.lock().await;

        {
            let current = self.current.read().await;
            if let Some(credential) = current.as_ref()
                && credential.token() != rejected
                && credential.is_fresh(self.margin)
            {
                return Ok(credential.token().to_string());
            }
        }

        self.refresh().await
    }

    /// Returns a copy of the cached credential, fresh or not.
    pub async fn snapshot(&self) -> Option<Credential> {
        self.current.read().await.clone()
    }

    /// Number of token requests issued so far.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    async fn fresh_token(&self) -> Option<String> {
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|c| c.is_fresh(self.margin))
            .map(|c| c.token().to_string())
    }

    /// Requests a new token and stores it. Must be called with the refresh
    /// lock held.
    async fn refresh(&self) -> Result<String, ProviderError> {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(url = %self.token_url, "Requesting provider token");

        let response = self
            .http_client
            .post(self.token_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&TokenRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Token endpoint unreachable");
                ProviderError::auth_failure(format!("token endpoint unreachable: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Token endpoint returned an error");
            return Err(ProviderError::auth_failure(format!(
                "token endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: Envelope<TokenResponse> = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "Malformed token response");
            ProviderError::auth_failure(format!("malformed token response: {e}"))
        })?;
        let body = body.into_inner();

        let token = body
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::auth_failure("token not received in the response"))?;
        let ttl = Duration::from_secs(body.expires_in.unwrap_or(0)).min(MAX_TOKEN_LIFETIME);

        *self.current.write().await = Some(Credential::new(token.clone(), ttl));
        tracing::info!(expires_in_secs = ttl.as_secs(), "Provider token refreshed");

        Ok(token)
    }
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("token_url", &self.token_url.as_str())
            .field("username", &self.username)
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_freshness() {
        let credential = Credential::new("t", Duration::from_secs(120));
        assert!(credential.is_fresh(Duration::from_secs(30)));
        assert!(!credential.is_fresh(Duration::from_secs(300)));

        let expired = Credential::new("t", Duration::ZERO);
        assert!(!expired.is_fresh(Duration::ZERO));
    }

    #[test]
    fn test_credential_debug_redacts_token() {
        let credential = Credential::new("super-secret", Duration::from_secs(60));
        let debug = format!("{credential:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_lifetime_is_capped() {
        let credential = Credential::new("t", Duration::from_secs(u64::MAX));
        assert!(credential.is_fresh(Duration::from_secs(60)));
        assert!(credential.expires_at() <= Instant::now() + MAX_TOKEN_LIFETIME);
        assert!(!credential.is_fresh(Duration::from_secs(u64::MAX)));
    }
}
