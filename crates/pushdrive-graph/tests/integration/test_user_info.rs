//! Integration test for Graph API user info endpoint
//!
//! Verifies that GraphClient::get_user_info() correctly fetches and parses
//! the /me response and classifies error statuses.

use pushdrive_graph::client::GraphClient;
use pushdrive_graph::GraphError;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_get_user_info_returns_profile() {
    let (_server, client) = common::setup_graph_mock().await;

    let user_info = client
        .get_user_info(&common::credential("test-access-token"))
        .await
        .expect("get_user_info failed");

    assert_eq!(user_info.email, "test@example.com");
    assert_eq!(user_info.display_name, "Test User");
    assert_eq!(user_info.id, "user-test-001");
}

#[tokio::test]
async fn test_get_user_info_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "userPrincipalName": "upn@example.com",
            "id": "user-002"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GraphClient::with_base_url(server.uri());
    let user_info = client
        .get_user_info(&common::credential("test-access-token"))
        .await
        .expect("get_user_info failed");

    assert_eq!(user_info.email, "upn@example.com");
    assert_eq!(user_info.display_name, "Unknown User");
}

#[tokio::test]
async fn test_get_user_info_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"code": "InvalidAuthenticationToken", "message": "Access token has expired."}
        })))
        .mount(&server)
        .await;

    let client = GraphClient::with_base_url(server.uri());
    let err = client
        .get_user_info(&common::credential("expired"))
        .await
        .unwrap_err();

    assert!(matches!(err, GraphError::Unauthorized(_)));
    assert_eq!(err.status(), Some(401));
}
