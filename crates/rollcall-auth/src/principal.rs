//! Provider wire types.
//!
//! The provider wraps both of its responses in a `data` envelope:
//!
//! ```json
//! { "data": { "token": "abc", "expires_in": 3600 } }
//! { "data": { "alice": { "username": "alice", "groups": ["ops"] } } }
//! ```

use std::collections::BTreeMap;

use rollcall_storage::GroupSet;
use serde::{Deserialize, Serialize};

/// Response body envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    data: T,
}

impl<T> Envelope<T> {
    pub(crate) fn into_inner(self) -> T {
        self.data
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub token: Option<String>,
    /// Lifetime in seconds. A missing value yields a token that is used once.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Token endpoint request body.
#[derive(Debug, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// A principal record as served by the provider.
///
/// Only `groups` is interpreted. Every other field is carried through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Provider-side UUID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Username. Matches the roster key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the account is enabled upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Upstream account status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Upstream creation timestamp, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Upstream update timestamp, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    /// Group memberships. Required.
    pub groups: GroupSet,

    /// Any other provider metadata.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The full roster, keyed by principal identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster(BTreeMap<String, Principal>);

impl Roster {
    /// Number of principals in the roster.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the roster lists nobody.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Projects the roster onto identifier to group set.
    #[must_use]
    pub fn into_memberships(self) -> BTreeMap<String, GroupSet> {
        self.0
            .into_iter()
            .map(|(id, principal)| (id, principal.groups))
            .collect()
    }
}

impl FromIterator<(String, Principal)> for Roster {
    fn from_iter<I: IntoIterator<Item = (String, Principal)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_envelope() {
        let wrapped: Envelope<TokenResponse> =
            serde_json::from_value(json!({"data": {"token": "t1", "expires_in": 60}})).unwrap();
        let token = wrapped.into_inner();
        assert_eq!(token.token.as_deref(), Some("t1"));
        assert_eq!(token.expires_in, Some(60));

        let bare = serde_json::from_value::<Envelope<TokenResponse>>(
            json!({"token": "t2", "expires_in": 5}),
        );
        assert!(bare.is_err());
    }

    #[test]
    fn test_principal_named_data_stays_in_envelope() {
        let body = json!({"data": {"data": {"username": "data", "groups": ["ops"]}}});
        let roster = serde_json::from_value::<Envelope<Roster>>(body)
            .unwrap()
            .into_inner();
        assert_eq!(roster.len(), 1);
        assert!(roster.into_memberships()["data"].contains("ops"));

        let bare = json!({"data": {"username": "data", "groups": ["ops"]}});
        assert!(serde_json::from_value::<Envelope<Roster>>(bare).is_err());
    }

    #[test]
    fn test_token_missing_fields() {
        let body: Envelope<TokenResponse> =
            serde_json::from_value(json!({"data": {"expires_in": 60}})).unwrap();
        assert!(body.into_inner().token.is_none());
    }

    #[test]
    fn test_roster_parses_and_keeps_metadata() {
        let body = json!({
            "data": {
                "alice": {
                    "uuid": "u-1",
                    "username": "alice",
                    "email": "alice@example.com",
                    "enabled": true,
                    "status": "active",
                    "site_ids": [1, 2],
                    "created_at": "2024-01-01T00:00:00Z",
                    "updated_at": "2024-02-01T00:00:00Z",
                    "groups": ["ops", "admins", "ops"]
                },
                "bob": { "groups": [] }
            }
        });

        let roster = serde_json::from_value::<Envelope<Roster>>(body)
            .unwrap()
            .into_inner();
        assert_eq!(roster.len(), 2);
        assert!(!roster.is_empty());

        let alice = &roster.0["alice"];
        assert_eq!(alice.groups.len(), 2);
        assert_eq!(alice.extra.get("site_ids"), Some(&json!([1, 2])));

        let memberships = roster.into_memberships();
        assert!(memberships["bob"].is_empty());
    }

    #[test]
    fn test_roster_requires_groups() {
        let body = json!({"data": {"carol": {"username": "carol"}}});
        assert!(serde_json::from_value::<Envelope<Roster>>(body).is_err());
    }
}
