//! In-memory membership store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use crate::StoreResult;
use crate::traits::MembershipStore;
use crate::types::{GroupSet, MembershipEntry, normalize_principal};

/// In-memory membership store backed by a sharded concurrent map.
///
/// Each upsert replaces the whole entry under the shard lock, so readers never
/// see a partially written group set. Contents are lost on restart; use the
/// PostgreSQL backend for persistence.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMembershipStore {
    entries: Arc<DashMap<String, MembershipEntry>>,
}

impl InMemoryMembershipStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored principals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a point-in-time copy of every entry, sorted by principal.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MembershipEntry> {
        let mut entries: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.principal.cmp(&b.principal));
        entries
    }
}

#[async_trait]
impl MembershipStore for InMemoryMembershipStore {
    async fn get(&self, principal: &str) -> StoreResult<Option<MembershipEntry>> {
        let principal = normalize_principal(principal)?;
        Ok(self.entries.get(principal).map(|e| e.value().clone()))
    }

    async fn upsert(
        &self,
        principal: &str,
        groups: &GroupSet,
    ) -> StoreResult<MembershipEntry> {
        let principal = normalize_principal(principal)?;
        let entry = MembershipEntry {
            principal: principal.to_string(),
            groups: groups.clone(),
            updated_at: OffsetDateTime::now_utc(),
        };
        self.entries.insert(principal.to_string(), entry.clone());
        tracing::trace!(principal, groups = groups.len(), "Membership upserted in memory");
        Ok(entry)
    }

    async fn count(&self) -> StoreResult<u64> {
        Ok(self.entries.len() as u64)
    }

    async fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<MembershipEntry>> {
        Ok(self
            .snapshot()
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }
}
