//! Read-through group resolution.
//!
//! The membership store is consulted first. On a miss the provider is asked
//! and a found group set is written back before it is returned. A principal
//! the provider does not know is reported as [`Resolution::NotFound`] and
//! nothing is written.

use rollcall_auth::DynIdentityProvider;
use rollcall_storage::{DynMembershipStore, GroupSet, normalize_principal};
use tracing::{debug, info, instrument};

use crate::error::SyncError;

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The principal exists. The set may be empty.
    Found(GroupSet),
    /// Neither the store nor the provider knows the principal.
    NotFound,
}

impl Resolution {
    /// Returns `true` for [`Resolution::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// The group set, if found.
    #[must_use]
    pub fn groups(&self) -> Option<&GroupSet> {
        match self {
            Self::Found(groups) => Some(groups),
            Self::NotFound => None,
        }
    }
}

/// Read-through resolver over a membership store and an identity provider.
#[derive(Clone)]
pub struct GroupResolver {
    store: DynMembershipStore,
    provider: DynIdentityProvider,
}

impl GroupResolver {
    #[must_use]
    pub fn new(store: DynMembershipStore, provider: DynIdentityProvider) -> Self {
        Self { store, provider }
    }

    /// Resolves the groups of `principal`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] for a blank principal or when the store or the
    /// provider fails. Nothing is written on error.
    #[instrument(skip(self))]
    pub async fn resolve(&self, principal: &str) -> Result<Resolution, SyncError> {
        let principal = normalize_principal(principal)?;

        if let Some(entry) = self.store.get(principal).await? {
            debug!(groups = entry.groups.len(), "Resolved from store");
            return Ok(Resolution::Found(entry.groups));
        }

        match self.provider.fetch_principal(principal).await? {
            Some(groups) => {
                self.store.upsert(principal, &groups).await?;
                info!(groups = groups.len(), "Backfilled membership from provider");
                Ok(Resolution::Found(groups))
            }
            None => {
                debug!("Principal unknown to provider");
                Ok(Resolution::NotFound)
            }
        }
    }
}
