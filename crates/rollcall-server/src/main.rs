use std::env;

use rollcall_server::config::loader::load_config;
use rollcall_server::server::{connect_store, provider_from_config};
use rollcall_server::{Reconciler, ServerBuilder};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From ROLLCALL_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (rollcall.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (ROLLCALL_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// What the process does after loading configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// HTTP server plus the background scheduler
    Serve,
    /// A single reconciliation run, then exit
    Reconcile,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    rollcall_server::observability::init_tracing();

    let mode = match resolve_mode() {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    let (config_path, source) = resolve_config_path();

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );
    rollcall_server::observability::apply_logging_level(&cfg.logging.level);

    match mode {
        Mode::Serve => {
            let server = match ServerBuilder::new().with_config(cfg).build().await {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Server initialization failed: {e:#}");
                    std::process::exit(2);
                }
            };
            if let Err(err) = server.run().await {
                eprintln!("Server error: {err:#}");
                std::process::exit(1);
            }
        }
        Mode::Reconcile => {
            if let Err(err) = reconcile_once(&cfg).await {
                eprintln!("Reconciliation failed: {err:#}");
                std::process::exit(1);
            }
        }
    }
}

async fn reconcile_once(cfg: &rollcall_server::AppConfig) -> anyhow::Result<()> {
    let store = connect_store(&cfg.storage).await?;
    let provider = provider_from_config(&cfg.provider)?;
    let reconciler = Reconciler::new(provider, store, &cfg.reconcile);

    let report = reconciler.reconcile_once().await?;
    if !report.is_complete() {
        anyhow::bail!(
            "{} of {} principals failed to upsert",
            report.failures.len(),
            report.fetched
        );
    }
    Ok(())
}

/// The first positional argument selects the mode; `serve` is the default.
fn resolve_mode() -> Result<Mode, String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                args.next();
            }
            "serve" => return Ok(Mode::Serve),
            "reconcile" => return Ok(Mode::Reconcile),
            other => return Err(format!("unknown argument '{other}' (expected serve or reconcile)")),
        }
    }
    Ok(Mode::Serve)
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: ROLLCALL_CONFIG
/// 3. Default: rollcall.toml
fn resolve_config_path() -> (String, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config"
            && let Some(path) = args.next()
        {
            return (path, ConfigSource::CliArgument);
        }
    }

    if let Ok(path) = env::var("ROLLCALL_CONFIG")
        && !path.is_empty()
    {
        return (path, ConfigSource::EnvironmentVariable);
    }

    ("rollcall.toml".to_string(), ConfigSource::Default)
}
