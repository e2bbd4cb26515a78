//! Credential cache behavior against a mock token endpoint.

use std::sync::Arc;
use std::time::Duration;

use rollcall_auth::{CredentialCache, MAX_TOKEN_LIFETIME, ProviderConfig};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cache_for(server: &MockServer) -> CredentialCache {
    let config = ProviderConfig::new(server.uri(), "svc", "pw");
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    CredentialCache::new(&config, http).unwrap()
}

fn token_body(token: &str, expires_in: u64) -> serde_json::Value {
    json!({ "data": { "token": token, "expires_in": expires_in } })
}

#[tokio::test]
async fn test_token_reused_while_fresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/get-token"))
        .and(body_json(json!({"username": "svc", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t1", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    assert_eq!(cache.get_token().await.unwrap(), "t1");
    assert_eq!(cache.get_token().await.unwrap(), "t1");
    assert_eq!(cache.refresh_count(), 1);
}

#[tokio::test]
async fn test_token_inside_margin_is_refreshed() {
    let server = MockServer::start().await;
    // 10s lifetime is inside the default 30s margin.
    Mock::given(method("POST"))
        .and(path("/auth/get-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("short", 10)))
        .expect(2)
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    cache.get_token().await.unwrap();
    cache.get_token().await.unwrap();
    assert_eq!(cache.refresh_count(), 2);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/get-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("shared", 3600))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(cache_for(&server));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move { cache.get_token().await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "shared");
    }
}

#[tokio::test]
async fn test_error_status_is_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/get-token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    let err = cache.get_token().await.unwrap_err();
    assert!(err.is_auth_failure());
    assert!(cache.snapshot().await.is_none());
}

#[tokio::test]
async fn test_missing_token_is_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/get-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"expires_in": 60}})))
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    let err = cache.get_token().await.unwrap_err();
    assert!(err.is_auth_failure());
    assert!(err.to_string().contains("token not received"));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_auth_failure() {
    // Nothing listens on the discard port.
    let config = ProviderConfig::new("http://127.0.0.1:9", "svc", "pw");
    let cache = CredentialCache::new(&config, reqwest::Client::new()).unwrap();
    assert!(cache.get_token().await.unwrap_err().is_auth_failure());
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/get-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t1", 3600)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/get-token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    assert_eq!(cache.get_token().await.unwrap(), "t1");

    let err = cache.force_refresh("t1").await.unwrap_err();
    assert!(err.is_auth_failure());

    let kept = cache.snapshot().await.unwrap();
    assert_eq!(kept.token(), "t1");
}

#[tokio::test]
async fn test_force_refresh_skips_request_when_already_replaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/get-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t1", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    cache.get_token().await.unwrap();

    // "t0" was rejected, but the cache already holds a different fresh token.
    assert_eq!(cache.force_refresh("t0").await.unwrap(), "t1");
    assert_eq!(cache.refresh_count(), 1);
}

#[tokio::test]
async fn test_huge_expires_in_is_capped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/get-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("forever", u64::MAX)))
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    assert_eq!(cache.get_token().await.unwrap(), "forever");
    assert_eq!(cache.get_token().await.unwrap(), "forever");

    let credential = cache.snapshot().await.unwrap();
    assert!(credential.expires_at() <= std::time::Instant::now() + MAX_TOKEN_LIFETIME);
}
