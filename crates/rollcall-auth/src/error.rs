//! Identity provider error types.

/// Errors that can occur while talking to the identity provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// A bearer credential could not be obtained, or the provider rejected
    /// the request twice in a row.
    #[error("Authentication failure: {message}")]
    AuthFailure {
        /// Description of why authentication failed.
        message: String,
    },

    /// The provider could not be reached, timed out, answered with a
    /// non-success status, or returned a malformed body.
    #[error("Provider unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

impl ProviderError {
    /// Creates an `AuthFailure` error.
    #[must_use]
    pub fn auth_failure(message: impl Into<String>) -> Self {
        Self::AuthFailure {
            message: message.into(),
        }
    }

    /// Creates an `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Maps a transport error from the roster endpoint.
    ///
    /// Timeouts, connection failures and body decoding errors all mean the
    /// provider is unavailable.
    #[must_use]
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::unavailable(format!("request timed out: {err}"))
        } else if err.is_decode() {
            Self::unavailable(format!("malformed response: {err}"))
        } else {
            Self::unavailable(format!("network error: {err}"))
        }
    }

    /// Returns `true` if this is an authentication failure.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthFailure { .. })
    }

    /// Returns `true` if the provider was unavailable.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::auth_failure("token endpoint returned 500");
        assert_eq!(
            err.to_string(),
            "Authentication failure: token endpoint returned 500"
        );

        let err = ProviderError::unavailable("HTTP 503");
        assert_eq!(err.to_string(), "Provider unavailable: HTTP 503");
    }

    #[test]
    fn test_error_predicates() {
        assert!(ProviderError::auth_failure("x").is_auth_failure());
        assert!(!ProviderError::auth_failure("x").is_unavailable());
        assert!(ProviderError::unavailable("x").is_unavailable());
    }
}
