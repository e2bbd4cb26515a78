//! Layered configuration loading: file, `ROLLCALL__*` overrides and legacy variables.

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use rollcall_server::config::loader::load_config;
use rollcall_server::{StorageBackend, UpsertFailurePolicy};

// Tests in this file mutate process environment.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

const BASE: &str = r#"
[server]
port = 9090

[provider]
base_url = "https://idp.example.com/api"
username = "svc"
password = "pw"
request_timeout = "5s"

[storage]
backend = "memory"

[reconcile]
schedule = "30 2 * * *"
max_run_duration = "10m"
on_upsert_failure = "continue"
"#;

#[test]
fn test_load_from_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    let file = write_config(BASE);

    let cfg = load_config(file.path().to_str()).unwrap();

    assert_eq!(cfg.server.port, 9090);
    assert_eq!(cfg.provider.base_url, "https://idp.example.com/api");
    assert_eq!(cfg.provider.request_timeout, Duration::from_secs(5));
    assert_eq!(cfg.storage.backend, StorageBackend::Memory);
    assert_eq!(cfg.reconcile.schedule, "30 2 * * *");
    assert_eq!(cfg.reconcile.max_run_duration, Duration::from_secs(600));
    assert_eq!(cfg.reconcile.on_upsert_failure, UpsertFailurePolicy::Continue);
}

#[test]
fn test_env_overrides_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    let file = write_config(BASE);

    unsafe {
        std::env::set_var("ROLLCALL__SERVER__PORT", "7070");
        std::env::set_var("ROLLCALL__RECONCILE__CONCURRENCY", "9");
    }
    let cfg = load_config(file.path().to_str());
    unsafe {
        std::env::remove_var("ROLLCALL__SERVER__PORT");
        std::env::remove_var("ROLLCALL__RECONCILE__CONCURRENCY");
    }

    let cfg = cfg.unwrap();
    assert_eq!(cfg.server.port, 7070);
    assert_eq!(cfg.reconcile.concurrency, 9);
}

#[test]
fn test_legacy_variables_fill_gaps() {
    let _guard = ENV_LOCK.lock().unwrap();
    let file = write_config("[storage]\nbackend = \"memory\"\n");

    unsafe {
        std::env::set_var("API_BASE_URL", "https://legacy.example.com");
        std::env::set_var("API_USERNAME", "legacy");
        std::env::set_var("API_PASSWORD", "pw");
        std::env::set_var("CRON_SECRET", "s3cret");
        std::env::set_var("SLACK_SIGNING_SECRET", "sign-me");
    }
    let cfg = load_config(file.path().to_str());
    unsafe {
        for var in [
            "API_BASE_URL",
            "API_USERNAME",
            "API_PASSWORD",
            "CRON_SECRET",
            "SLACK_SIGNING_SECRET",
        ] {
            std::env::remove_var(var);
        }
    }

    let cfg = cfg.unwrap();
    assert_eq!(cfg.provider.base_url, "https://legacy.example.com");
    assert_eq!(cfg.provider.username, "legacy");
    assert_eq!(cfg.server.cron_secret.as_deref(), Some("s3cret"));
    assert_eq!(cfg.server.signing_secret.as_deref(), Some("sign-me"));
}

#[test]
fn test_file_wins_over_legacy_variables() {
    let _guard = ENV_LOCK.lock().unwrap();
    let file = write_config(BASE);

    unsafe { std::env::set_var("API_BASE_URL", "https://legacy.example.com") };
    let cfg = load_config(file.path().to_str());
    unsafe { std::env::remove_var("API_BASE_URL") };

    assert_eq!(cfg.unwrap().provider.base_url, "https://idp.example.com/api");
}

#[test]
fn test_invalid_schedule_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    let file = write_config(&BASE.replace("30 2 * * *", "whenever"));

    let err = load_config(file.path().to_str()).unwrap_err();
    assert!(err.contains("reconcile.schedule"), "{err}");
}
