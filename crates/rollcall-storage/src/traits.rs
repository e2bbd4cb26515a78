//! The membership store trait.

use async_trait::async_trait;

use crate::StoreResult;
use crate::types::{GroupSet, MembershipEntry};

/// Persistent mapping from principal identifier to group set.
///
/// Implementations must be thread-safe (`Send + Sync`) and must make
/// [`upsert`](MembershipStore::upsert) atomic per key: a concurrent
/// [`get`](MembershipStore::get) observes either the whole old group set or
/// the whole new one. No cross-key transaction is required.
///
/// # Example
///
/// ```ignore
/// use rollcall_storage::{GroupSet, MembershipStore, StoreError};
///
/// async fn groups_of(store: &dyn MembershipStore, who: &str) -> Result<Option<GroupSet>, StoreError> {
///     Ok(store.get(who).await?.map(|entry| entry.groups))
/// }
/// ```
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Looks up a principal.
    ///
    /// Returns `None` when the principal has never been written. An entry with
    /// an empty group set is a real value, not an absence.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidInput` for a blank principal and
    /// `StoreError::Unavailable` for backend failures.
    async fn get(&self, principal: &str) -> StoreResult<Option<MembershipEntry>>;

    /// Creates or replaces the group set of a principal.
    ///
    /// The stored set is replaced, never merged, and `updated_at` is always
    /// set to the current time.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidInput` for a blank principal and
    /// `StoreError::Unavailable` for backend failures.
    async fn upsert(
        &self,
        principal: &str,
        groups: &GroupSet,
    ) -> StoreResult<MembershipEntry>;

    /// Counts stored principals.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` for backend failures.
    async fn count(&self) -> StoreResult<u64>;

    /// Lists stored entries ordered by principal.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` for backend failures.
    async fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<MembershipEntry>>;
}
