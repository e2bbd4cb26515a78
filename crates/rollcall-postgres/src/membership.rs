//! PostgreSQL membership store.
//!
//! One row per principal in `principal_membership`. Upserts are single
//! `INSERT ... ON CONFLICT` statements, so each key is replaced atomically.

use std::sync::Arc;

use async_trait::async_trait;
use rollcall_storage::{GroupSet, MembershipEntry, MembershipStore, StoreError, normalize_principal};
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use tracing::instrument;

use crate::PgPool;
use crate::error::PostgresError;

/// Row shape shared by every query.
type MembershipRow = (String, Vec<String>, OffsetDateTime);

fn entry_from_row((principal, groups, updated_at): MembershipRow) -> MembershipEntry {
    MembershipEntry {
        principal,
        groups: GroupSet::from(groups),
        updated_at,
    }
}

fn store_error(err: sqlx_core::Error) -> StoreError {
    PostgresError::from(err).into()
}

/// Arc-owning PostgreSQL membership store.
#[derive(Clone)]
pub struct PostgresMembershipStore {
    pool: Arc<PgPool>,
}

impl PostgresMembershipStore {
    /// Creates a store over an existing pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<PgPool> {
        &self.pool
    }
}

#[async_trait]
impl MembershipStore for PostgresMembershipStore {
    #[instrument(skip(self))]
    async fn get(&self, principal: &str) -> Result<Option<MembershipEntry>, StoreError> {
        let principal = normalize_principal(principal)?;

        let row: Option<MembershipRow> = query_as(
            r#"
            SELECT principal, groups, updated_at
            FROM principal_membership
            WHERE principal = $1
            "#,
        )
        .bind(principal)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(store_error)?;

        Ok(row.map(entry_from_row))
    }

    #[instrument(skip(self, groups), fields(groups = groups.len()))]
    async fn upsert(
        &self,
        principal: &str,
        groups: &GroupSet,
    ) -> Result<MembershipEntry, StoreError> {
        let principal = normalize_principal(principal)?;

        let row: MembershipRow = query_as(
            r#"
            INSERT INTO principal_membership (principal, groups, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (principal) DO UPDATE
                SET groups = EXCLUDED.groups,
                    updated_at = NOW()
            RETURNING principal, groups, updated_at
            "#,
        )
        .bind(principal)
        .bind(groups.to_vec())
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(store_error)?;

        Ok(entry_from_row(row))
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM principal_membership")
            .fetch_one(self.pool.as_ref())
            .await
            .map_err(store_error)?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<MembershipEntry>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);

        let rows: Vec<MembershipRow> = query_as(
            r#"
            SELECT principal, groups, updated_at
            FROM principal_membership
            ORDER BY principal
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(entry_from_row).collect())
    }
}

impl std::fmt::Debug for PostgresMembershipStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresMembershipStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}
