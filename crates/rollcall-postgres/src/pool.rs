//! Connection pool setup.

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result};

/// Type alias for PostgreSQL pool options.
pub type PgPoolOptions = PoolOptions<Postgres>;

/// Connections are recycled after this long.
const MAX_CONNECTION_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Opens a pool for the membership store.
///
/// # Errors
///
/// Returns `PostgresError::Config` for an empty URL or pool size and
/// `PostgresError::Database` if the first connection cannot be made.
#[instrument(skip(config), fields(url = %mask_password(&config.url)))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    if config.url.trim().is_empty() {
        return Err(PostgresError::config("storage.postgres.url is empty"));
    }
    if config.pool_size == 0 {
        return Err(PostgresError::config("storage.postgres.pool_size must be > 0"));
    }

    info!(
        pool_size = config.pool_size,
        connect_timeout_ms = config.connect_timeout_ms,
        "Opening membership store pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .min_connections((config.pool_size / 4).max(1))
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
        .idle_timeout(config.idle_timeout_ms.map(Duration::from_millis))
        .max_lifetime(MAX_CONNECTION_LIFETIME)
        .connect(&config.url)
        .await?;

    debug!(size = pool.size(), "Membership store pool ready");
    Ok(pool)
}

/// Replaces the password in a database URL with `****` for logging.
///
/// Strings that do not parse as URLs are returned as `<unparseable url>`.
pub fn mask_password(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return "<unparseable url>".to_string();
    };
    if url.password().is_some() && url.set_password(Some("****")).is_err() {
        return "<unparseable url>".to_string();
    }
    url.to_string()
}
