//! Identity provider connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Upstream identity provider configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [provider]
/// base_url = "https://idp.example.com/api"
/// username = "rollcall-service"
/// request_timeout = "10s"
/// token_refresh_margin = "30s"
/// ```
///
/// The password is normally supplied through `ROLLCALL__PROVIDER__PASSWORD`
/// or the legacy `API_PASSWORD` variable rather than the file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the provider API. Endpoint paths are appended to it.
    pub base_url: String,

    /// Service account username used to obtain bearer tokens.
    pub username: String,

    /// Service account password.
    #[serde(skip_serializing)]
    pub password: String,

    /// Path of the token endpoint (POST).
    pub token_path: String,

    /// Path of the roster endpoint (GET).
    pub roster_path: String,

    /// Timeout applied to every outbound request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Tokens this close to expiry are treated as already expired.
    #[serde(with = "humantime_serde")]
    pub token_refresh_margin: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            token_path: "/auth/get-token".to_string(),
            roster_path: "/admin/users".to_string(),
            request_timeout: Duration::from_secs(10),
            token_refresh_margin: Duration::from_secs(30),
        }
    }
}

impl ProviderConfig {
    /// Creates a configuration for the given base URL and service account.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the token refresh margin.
    #[must_use]
    pub fn with_token_refresh_margin(mut self, margin: Duration) -> Self {
        self.token_refresh_margin = margin;
        self
    }

    /// Full URL of the token endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the base URL does not parse.
    pub fn token_url(&self) -> Result<Url, ConfigError> {
        self.endpoint(&self.token_path)
    }

    /// Full URL of the roster endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the base URL does not parse.
    pub fn roster_url(&self) -> Result<Url, ConfigError> {
        self.endpoint(&self.roster_path)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined)
            .map_err(|e| ConfigError::InvalidValue(format!("invalid provider URL '{joined}': {e}")))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the base URL or credentials are empty,
    /// and `ConfigError::InvalidValue` if the URL is malformed or the timeout
    /// is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("provider.base_url".to_string()));
        }
        if self.username.is_empty() {
            return Err(ConfigError::Missing("provider.username".to_string()));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing("provider.password".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "provider.request_timeout must be > 0".to_string(),
            ));
        }
        self.token_url()?;
        self.roster_url()?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.token_path, "/auth/get-token");
        assert_eq!(config.roster_path, "/admin/users");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.token_refresh_margin, Duration::from_secs(30));
    }

    #[test]
    fn test_endpoint_join() {
        let config = ProviderConfig::new("https://idp.example.com/api/", "svc", "pw");
        assert_eq!(
            config.token_url().unwrap().as_str(),
            "https://idp.example.com/api/auth/get-token"
        );
        assert_eq!(
            config.roster_url().unwrap().as_str(),
            "https://idp.example.com/api/admin/users"
        );
    }

    #[test]
    fn test_validate() {
        assert!(
            ProviderConfig::new("https://idp.example.com", "svc", "pw")
                .validate()
                .is_ok()
        );

        let err = ProviderConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref f) if f == "provider.base_url"));

        let err = ProviderConfig::new("https://idp.example.com", "svc", "")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref f) if f == "provider.password"));

        let err = ProviderConfig::new("not a url", "svc", "pw")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));

        let err = ProviderConfig::new("https://idp.example.com", "svc", "pw")
            .with_request_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("request_timeout"));
    }

    #[test]
    fn test_password_not_serialized() {
        let config = ProviderConfig::new("https://idp.example.com", "svc", "secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"request_timeout\":\"10s\""));
    }
}
