//! PostgreSQL backend for the rollcall membership store.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rollcall_postgres::{PostgresConfig, PostgresMembershipStore};
//!
//! let config = PostgresConfig::new("postgres://localhost/rollcall");
//! let store = PostgresMembershipStore::connect(&config).await?;
//! let entry = store.get("alice").await?;
//! ```

pub mod config;
pub mod error;
pub mod membership;
pub mod migrations;
pub mod pool;

use std::sync::Arc;

use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use config::PostgresConfig;
pub use error::{PostgresError, Result};
pub use membership::PostgresMembershipStore;
pub use pool::{create_pool, mask_password};

impl PostgresMembershipStore {
    /// Creates a pool, applies migrations if configured, and wraps the pool
    /// in a store.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot connect or a migration fails.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        if config.run_migrations {
            migrations::run(&pool).await?;
        }
        Ok(Self::new(Arc::new(pool)))
    }
}
