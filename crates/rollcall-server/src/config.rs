use rollcall_auth::ProviderConfig;
use rollcall_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

use crate::reconcile::UpsertFailurePolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream identity provider
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Scheduled full-roster reconciliation
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self
            .server
            .cron_secret
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            return Err("server.cron_secret must not be blank when set".into());
        }
        if self
            .server
            .signing_secret
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            return Err("server.signing_secret must not be blank when set".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Provider validation
        self.provider
            .validate()
            .map_err(|e| format!("provider config error: {e}"))?;
        // Storage validation
        if self.storage.backend == StorageBackend::Postgres {
            if self.storage.postgres.url.trim().is_empty() {
                return Err("storage.postgres.url must not be empty".into());
            }
            if self.storage.postgres.pool_size == 0 {
                return Err("storage.postgres.pool_size must be > 0".into());
            }
        }
        // Reconciliation validation
        if let Err(e) = croner::Cron::new(&self.reconcile.schedule).parse() {
            return Err(format!(
                "reconcile.schedule '{}' is not a valid cron expression: {e}",
                self.reconcile.schedule
            ));
        }
        if self.reconcile.concurrency == 0 {
            return Err("reconcile.concurrency must be > 0".into());
        }
        if self.reconcile.max_run_duration.is_zero() {
            return Err("reconcile.max_run_duration must be > 0".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// Bearer secret guarding `POST /reconcile`. When unset the endpoint
    /// rejects every request.
    #[serde(default, skip_serializing)]
    pub cron_secret: Option<String>,
    /// Shared secret used to verify chat command signatures. When unset the
    /// command endpoint accepts unsigned requests.
    #[serde(default, skip_serializing)]
    pub signing_secret: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            cron_secret: None,
            signing_secret: None,
        }
    }
}

/// Membership store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local map; contents are lost on restart.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub postgres: PostgresConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Run the background scheduler in `serve` mode.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cron expression, evaluated in UTC.
    #[serde(default = "default_schedule")]
    pub schedule: String,
    /// Run once immediately when the scheduler starts.
    #[serde(default)]
    pub run_on_startup: bool,
    /// Maximum number of upserts in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Upper bound on a single run.
    #[serde(default = "default_max_run_duration", with = "humantime_serde")]
    pub max_run_duration: Duration,
    #[serde(default)]
    pub on_upsert_failure: UpsertFailurePolicy,
}

fn default_true() -> bool {
    true
}
fn default_schedule() -> String {
    "0 0 * * *".into()
}
fn default_concurrency() -> usize {
    4
}
fn default_max_run_duration() -> Duration {
    Duration::from_secs(30 * 60)
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            schedule: default_schedule(),
            run_on_startup: false,
            concurrency: default_concurrency(),
            max_run_duration: default_max_run_duration(),
            on_upsert_failure: UpsertFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Variables from the original deployment and the keys they fill when
    /// neither the file nor a `ROLLCALL__*` variable sets them.
    const LEGACY_ENV: &[(&str, &str)] = &[
        ("API_BASE_URL", "provider.base_url"),
        ("API_USERNAME", "provider.username"),
        ("API_PASSWORD", "provider.password"),
        ("CRON_SECRET", "server.cron_secret"),
        ("SLACK_SIGNING_SECRET", "server.signing_secret"),
        ("DATABASE_URL", "storage.postgres.url"),
    ];

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        for (var, key) in LEGACY_ENV {
            if let Ok(value) = std::env::var(var)
                && !value.is_empty()
            {
                builder = builder
                    .set_default(*key, value)
                    .map_err(|e| format!("config default error: {e}"))?;
            }
        }
        let path = PathBuf::from(path.unwrap_or("rollcall.toml"));
        if path.exists() {
            builder = builder.add_source(File::from(path));
        }
        // Environment variable overrides, e.g., ROLLCALL__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("ROLLCALL")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        AppConfig {
            provider: ProviderConfig::new("https://idp.example.com", "svc", "pw"),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.storage.backend, StorageBackend::Postgres);
        assert_eq!(cfg.reconcile.schedule, "0 0 * * *");
        assert_eq!(cfg.reconcile.concurrency, 4);
        assert_eq!(cfg.reconcile.max_run_duration, Duration::from_secs(1800));
        assert_eq!(cfg.reconcile.on_upsert_failure, UpsertFailurePolicy::Abort);
        assert!(cfg.server.cron_secret.is_none());
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());

        let err = AppConfig::default().validate().unwrap_err();
        assert!(err.contains("provider.base_url"));

        let mut cfg = valid();
        cfg.reconcile.schedule = "every day".into();
        assert!(cfg.validate().unwrap_err().contains("reconcile.schedule"));

        let mut cfg = valid();
        cfg.reconcile.concurrency = 0;
        assert!(cfg.validate().unwrap_err().contains("concurrency"));

        let mut cfg = valid();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().unwrap_err().contains("logging.level"));

        let mut cfg = valid();
        cfg.server.cron_secret = Some("  ".into());
        assert!(cfg.validate().unwrap_err().contains("cron_secret"));

        let mut cfg = valid();
        cfg.server.signing_secret = Some(String::new());
        assert!(cfg.validate().unwrap_err().contains("signing_secret"));

        let mut cfg = valid();
        cfg.storage.backend = StorageBackend::Memory;
        cfg.storage.postgres.url = String::new();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_addr() {
        let mut cfg = AppConfig::default();
        cfg.server.host = "127.0.0.1".into();
        cfg.server.port = 9000;
        assert_eq!(cfg.addr().to_string(), "127.0.0.1:9000");

        cfg.server.host = "not-an-ip".into();
        assert_eq!(cfg.addr().to_string(), "0.0.0.0:9000");
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut cfg = valid();
        cfg.server.cron_secret = Some("hunter2".into());
        cfg.server.signing_secret = Some("correct-horse".into());
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("correct-horse"));
    }
}
