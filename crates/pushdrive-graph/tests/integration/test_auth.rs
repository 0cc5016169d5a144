//! Integration tests for the device-code authenticator
//!
//! The mock server plays both the identity platform (device code and token
//! endpoints) and the Graph `/me` endpoint.

use pushdrive_core::domain::AuthError;
use pushdrive_core::ports::IAuthenticator;
use pushdrive_graph::auth::{GraphAuthenticator, TokenCache};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_expiring_token_is_refreshed_and_persisted() {
    let server = MockServer::start().await;
    common::mount_refresh(&server, "refreshed-access-token").await;
    common::mount_me(&server).await;

    let dir = TempDir::new().unwrap();
    let cache_path = dir.path().join("token_cache.bin");

    let authenticator = GraphAuthenticator::new(
        common::auth_config(&server),
        common::expiring_cache(&cache_path),
    )
    .unwrap();

    let credential = authenticator.authenticate().await.expect("refresh failed");
    assert_eq!(credential.access_token(), "refreshed-access-token");
    assert!(!credential.is_expired());

    authenticator.persist().await.unwrap();

    let reloaded = TokenCache::load(&cache_path);
    let account = reloaded.account(common::CLIENT_ID).unwrap();
    assert_eq!(account.access_token, "refreshed-access-token");
    assert_eq!(account.refresh_token.as_deref(), Some("rotated-refresh-token"));
    assert_eq!(account.username.as_deref(), Some("test@example.com"));
}

#[tokio::test]
async fn test_identity_check_rejection_is_fatal() {
    let server = MockServer::start().await;
    common::mount_refresh(&server, "refreshed-access-token").await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"code": "InvalidAuthenticationToken", "message": "nope"}
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let authenticator = GraphAuthenticator::new(
        common::auth_config(&server),
        common::expiring_cache(&dir.path().join("token_cache.bin")),
    )
    .unwrap();

    let err = authenticator.authenticate().await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<AuthError>(),
        Some(&AuthError::IdentityCheck { status: 401 })
    );
}

#[tokio::test]
async fn test_failed_identity_check_keeps_rotated_refresh_token() {
    let server = MockServer::start().await;
    common::mount_refresh(&server, "refreshed-access-token").await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache_path = dir.path().join("token_cache.bin");
    let authenticator = GraphAuthenticator::new(
        common::auth_config(&server),
        common::expiring_cache(&cache_path),
    )
    .unwrap();

    let err = authenticator.authenticate().await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<AuthError>(),
        Some(&AuthError::IdentityCheck { status: 503 })
    );

    authenticator.persist().await.unwrap();

    let reloaded = TokenCache::load(&cache_path);
    let account = reloaded.account(common::CLIENT_ID).unwrap();
    assert_eq!(account.access_token, "refreshed-access-token");
    assert_eq!(account.refresh_token.as_deref(), Some("rotated-refresh-token"));
    assert!(account.username.is_none());
}

#[tokio::test]
async fn test_device_code_flow_after_failed_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "The refresh token has expired."
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/devicecode"))
        .and(body_string_contains("client_id=client-test-001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "device_code": "device-code-001",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 900,
            "interval": 1,
            "message": "To sign in, use a web browser..."
        })))
        .expect(1)
        .mount(&server)
        .await;

    // First poll: user has not finished yet
    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .and(body_string_contains("device_code=device-code-001"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "authorization_pending"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .and(body_string_contains("device_code=device-code-001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body("device-access-token")))
        .mount(&server)
        .await;

    common::mount_me(&server).await;

    let dir = TempDir::new().unwrap();
    let cache_path = dir.path().join("token_cache.bin");
    let authenticator = GraphAuthenticator::new(
        common::auth_config(&server),
        common::expiring_cache(&cache_path),
    )
    .unwrap();

    let credential = authenticator
        .authenticate()
        .await
        .expect("device flow failed");
    assert_eq!(credential.access_token(), "device-access-token");

    // Dropping the authenticator persists the changed cache
    drop(authenticator);
    let reloaded = TokenCache::load(&cache_path);
    assert_eq!(
        reloaded.account(common::CLIENT_ID).unwrap().access_token,
        "device-access-token"
    );
}

#[tokio::test]
async fn test_device_flow_initiation_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/devicecode"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_client",
            "error_description": "Unknown application."
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let authenticator = GraphAuthenticator::new(
        common::auth_config(&server),
        TokenCache::load(dir.path().join("token_cache.bin")),
    )
    .unwrap();

    let err = authenticator.authenticate().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AuthError>(),
        Some(AuthError::DeviceFlow(_))
    ));
}

#[tokio::test]
async fn test_reauthenticate_skips_rejected_cached_token() {
    let server = MockServer::start().await;
    common::mount_refresh(&server, "replacement-access-token").await;
    common::mount_me(&server).await;

    let dir = TempDir::new().unwrap();
    let mut cache = TokenCache::load(dir.path().join("token_cache.bin"));
    cache.upsert(
        common::CLIENT_ID,
        &pushdrive_graph::auth::Tokens {
            access_token: "revoked-access-token".to_string(),
            refresh_token: Some("cached-refresh-token".to_string()),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
        },
        &["User.Read".to_string()],
    );

    let config = common::auth_config(&server).with_verify_identity(false);
    let authenticator = GraphAuthenticator::new(config, cache).unwrap();

    let first = authenticator.authenticate().await.unwrap();
    assert_eq!(first.access_token(), "revoked-access-token");

    let second = authenticator.reauthenticate(&first).await.unwrap();
    assert_eq!(second.access_token(), "replacement-access-token");
}
