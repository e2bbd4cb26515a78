//! Identity provider client.
//!
//! [`IdentityProvider`] is the seam the resolver and the reconciliation job
//! depend on; [`ProviderClient`] is the HTTP implementation.
//!
//! The provider has no single-principal endpoint, so
//! [`IdentityProvider::fetch_principal`] pulls the whole roster and projects
//! one entry.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rollcall_storage::GroupSet;
use url::Url;

use crate::config::{ConfigError, ProviderConfig};
use crate::credential::CredentialCache;
use crate::ProviderResult;
use crate::error::ProviderError;
use crate::principal::{Envelope, Roster};

/// Source of truth for principal group memberships.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fetches every principal and its groups.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::AuthFailure` if no accepted credential could be
    /// obtained and `ProviderError::Unavailable` for any other failure.
    async fn fetch_all_principals(&self) -> ProviderResult<BTreeMap<String, GroupSet>>;

    /// Fetches the groups of one principal.
    ///
    /// Returns `None` if the provider does not know the principal.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_all_principals`](IdentityProvider::fetch_all_principals).
    async fn fetch_principal(&self, principal: &str) -> ProviderResult<Option<GroupSet>> {
        let mut all = self.fetch_all_principals().await?;
        Ok(all.remove(principal.trim()))
    }
}

/// Type alias for a shareable provider trait object.
pub type DynIdentityProvider = Arc<dyn IdentityProvider>;

/// Outcome of a single roster request.
enum RosterAttempt {
    Accepted(Roster),
    Rejected,
}

/// HTTP client for the provider's roster endpoint.
pub struct ProviderClient {
    http_client: reqwest::Client,
    roster_url: Url,
    credentials: Arc<CredentialCache>,
}

impl ProviderClient {
    /// Creates a client and its credential cache from configuration.
    ///
    /// Both share one HTTP client whose timeout is `request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if an endpoint URL is malformed or
    /// the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue(format!("failed to build HTTP client: {e}")))?;
        let credentials = Arc::new(CredentialCache::new(config, http_client.clone())?);
        Self::with_credentials(config, http_client, credentials)
    }

    /// Creates a client around an existing credential cache.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the roster URL is malformed.
    pub fn with_credentials(
        config: &ProviderConfig,
        http_client: reqwest::Client,
        credentials: Arc<CredentialCache>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            http_client,
            roster_url: config.roster_url()?,
            credentials,
        })
    }

    /// The credential cache used by this client.
    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }

    /// Fetches the full roster, including provider metadata.
    ///
    /// A 401 answer triggers exactly one retry with a freshly issued token.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::AuthFailure` if a token cannot be obtained or
    /// the retry is rejected too, and `ProviderError::Unavailable` for
    /// timeouts, network errors, other non-success statuses and malformed
    /// bodies.
    pub async fn fetch_roster(&self) -> ProviderResult<Roster> {
        let token = self.credentials.get_token().await?;
        if let RosterAttempt::Accepted(roster) = self.request_roster(&token).await? {
            return Ok(roster);
        }

        tracing::warn!("Provider rejected the bearer token, refreshing and retrying once");
        let token = self.credentials.force_refresh(&token).await?;
        match self.request_roster(&token).await? {
            RosterAttempt::Accepted(roster) => Ok(roster),
            RosterAttempt::Rejected => Err(ProviderError::auth_failure(
                "provider rejected a freshly issued token",
            )),
        }
    }

    async fn request_roster(&self, token: &str) -> ProviderResult<RosterAttempt> {
        tracing::debug!(url = %self.roster_url, "Fetching provider roster");

        let response = self
            .http_client
            .get(self.roster_url.clone())
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Roster request failed");
                ProviderError::from_transport(&e)
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(RosterAttempt::Rejected);
        }
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Roster endpoint returned an error");
            return Err(ProviderError::unavailable(format!(
                "roster endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: Envelope<Roster> = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "Malformed roster response");
            ProviderError::unavailable(format!("malformed roster response: {e}"))
        })?;
        let roster = body.into_inner();

        tracing::debug!(principals = roster.len(), "Fetched provider roster");
        Ok(RosterAttempt::Accepted(roster))
    }
}

#[async_trait]
impl IdentityProvider for ProviderClient {
    async fn fetch_all_principals(&self) -> ProviderResult<BTreeMap<String, GroupSet>> {
        Ok(self.fetch_roster().await?.into_memberships())
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("roster_url", &self.roster_url.as_str())
            .field("credentials", &self.credentials)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        roster: BTreeMap<String, GroupSet>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProvider for FixedProvider {
        async fn fetch_all_principals(&self) -> ProviderResult<BTreeMap<String, GroupSet>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.roster.clone())
        }
    }

    #[tokio::test]
    async fn test_fetch_principal_projects_full_roster() {
        let provider = FixedProvider {
            roster: BTreeMap::from([
                ("alice".to_string(), ["g1", "g2"].into_iter().collect()),
                ("bob".to_string(), GroupSet::new()),
            ]),
            calls: AtomicUsize::new(0),
        };

        let alice = provider.fetch_principal(" alice ").await.unwrap().unwrap();
        assert!(alice.contains("g1") && alice.contains("g2"));

        let bob = provider.fetch_principal("bob").await.unwrap();
        assert_eq!(bob, Some(GroupSet::new()));

        assert!(provider.fetch_principal("carol").await.unwrap().is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_client_rejects_bad_base_url() {
        let config = ProviderConfig::new("::not-a-url", "svc", "pw");
        assert!(ProviderClient::new(&config).is_err());
    }
}
