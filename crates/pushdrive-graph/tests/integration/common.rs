//! Shared test helpers for Graph API integration tests
//!
//! Provides wiremock-based mock server setup for Microsoft Graph API and
//! identity platform endpoints.

use std::path::Path;

use chrono::{Duration, Utc};
use pushdrive_core::domain::{Credential, RemotePath, SourceEntry};
use pushdrive_graph::auth::{AuthConfig, TokenCache, Tokens};
use pushdrive_graph::client::GraphClient;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_ID: &str = "client-test-001";

/// Starts a mock server answering `GET /me` and returns a client pointing at it
pub async fn setup_graph_mock() -> (MockServer, GraphClient) {
    let server = MockServer::start().await;
    mount_me(&server).await;
    let client = GraphClient::with_base_url(server.uri());
    (server, client)
}

/// Mounts `GET /me` returning the test user's profile
pub async fn mount_me(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "displayName": "Test User",
            "mail": "test@example.com",
            "userPrincipalName": "test@example.com",
            "id": "user-test-001"
        })))
        .mount(server)
        .await;
}

/// Mounts the token endpoint answering a refresh-token grant
pub async fn mount_refresh(server: &MockServer, access_token: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access_token)))
        .mount(server)
        .await;
}

/// JSON body of a successful token response
pub fn token_body(access_token: &str) -> serde_json::Value {
    serde_json::json!({
        "token_type": "Bearer",
        "scope": "Files.ReadWrite.All User.Read",
        "expires_in": 3600,
        "access_token": access_token,
        "refresh_token": "rotated-refresh-token"
    })
}

/// Authenticator config whose identity and Graph endpoints are the mock server
pub fn auth_config(server: &MockServer) -> AuthConfig {
    AuthConfig::new(CLIENT_ID)
        .with_authority(server.uri())
        .with_graph_base_url(server.uri())
}

/// Token cache at `path` holding a token that expires within the reuse margin
pub fn expiring_cache(path: &Path) -> TokenCache {
    let mut cache = TokenCache::load(path);
    cache.upsert(
        CLIENT_ID,
        &Tokens {
            access_token: "stale-access-token".to_string(),
            refresh_token: Some("cached-refresh-token".to_string()),
            expires_at: Utc::now() + Duration::minutes(1),
        },
        &["User.Read".to_string()],
    );
    cache
}

pub fn credential(token: &str) -> Credential {
    Credential::new(token, Utc::now() + Duration::hours(1))
}

pub fn source(local: &Path, remote: &str, small: bool) -> SourceEntry {
    SourceEntry::new(local.to_path_buf(), RemotePath::new(remote).unwrap(), small).unwrap()
}
