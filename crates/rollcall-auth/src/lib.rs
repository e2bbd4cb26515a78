//! # rollcall-auth
//!
//! Client for the upstream identity provider.
//!
//! The provider is the source of truth for group memberships. It exposes a
//! token endpoint that exchanges service credentials for a short-lived bearer
//! token, and a roster endpoint that lists every principal with its groups.
//!
//! ## Overview
//!
//! - [`CredentialCache`] - single-flight bearer token cache with an expiry margin
//! - [`ProviderClient`] - roster fetches with one retry on a rejected token
//! - [`IdentityProvider`] - the trait the resolver and reconciler depend on
//! - [`ProviderConfig`] - endpoint and timeout settings
//!
//! ## Example
//!
//! ```ignore
//! use rollcall_auth::{IdentityProvider, ProviderClient, ProviderConfig};
//!
//! let config = ProviderConfig::new("https://idp.example.com/api", "svc", "secret");
//! let client = ProviderClient::new(&config)?;
//!
//! let groups = client.fetch_principal("alice").await?;
//! ```

pub mod config;
pub mod credential;
pub mod error;
pub mod principal;
pub mod provider;

pub use config::{ConfigError, ProviderConfig};
pub use credential::{Credential, CredentialCache, MAX_TOKEN_LIFETIME};
pub use error::ProviderError;
pub use principal::{Principal, Roster};
pub use provider::{DynIdentityProvider, IdentityProvider, ProviderClient};

/// Type alias for a provider result.
pub type ProviderResult<T> = Result<T, ProviderError>;
