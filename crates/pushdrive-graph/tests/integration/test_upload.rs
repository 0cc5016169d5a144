//! Integration tests for small file uploads
//!
//! Verifies the request the uploader sends (path, headers, body) and that
//! the raw answer is handed back uninterpreted.

use pushdrive_core::domain::UploadError;
use pushdrive_core::ports::IUploader;
use pushdrive_graph::client::GraphClient;
use pushdrive_graph::upload::{GraphUploader, SMALL_UPLOAD_LIMIT};
use tempfile::TempDir;
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_upload_sends_encoded_path_headers_and_body() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("todo.md");
    std::fs::write(&local, b"- buy milk\n").unwrap();

    Mock::given(method("PUT"))
        .and(path("/me/drive/root:/My%20Documents/todo%20%231.md:/content"))
        .and(header("authorization", "Bearer test-access-token"))
        .and(header("content-type", "application/binary"))
        .and(body_bytes(b"- buy milk\n".to_vec()))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "item-001",
            "name": "todo #1.md",
            "size": 11
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uploader = GraphUploader::new(GraphClient::with_base_url(server.uri()));
    let response = uploader
        .upload(
            &common::source(&local, "My Documents/todo #1.md", true),
            &common::credential("test-access-token"),
        )
        .await
        .expect("upload failed");

    assert_eq!(response.status, 201);
    assert!(response.is_success());
    assert_eq!(response.body["id"], "item-001");
}

#[tokio::test]
async fn test_upload_returns_expired_token_body() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("a.txt");
    std::fs::write(&local, b"a").unwrap();

    Mock::given(method("PUT"))
        .and(path("/me/drive/root:/Docs/a.txt:/content"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {
                "code": "InvalidAuthenticationToken",
                "message": "Access token has expired or is not yet valid."
            }
        })))
        .mount(&server)
        .await;

    let uploader = GraphUploader::new(GraphClient::with_base_url(server.uri()));
    let response = uploader
        .upload(
            &common::source(&local, "Docs/a.txt", true),
            &common::credential("expired"),
        )
        .await
        .expect("a rejected upload is still a response");

    assert_eq!(response.status, 401);
    assert!(response.is_auth_invalid());
}

#[tokio::test]
async fn test_upload_non_json_body_is_null() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("a.txt");
    std::fs::write(&local, b"a").unwrap();

    Mock::given(method("PUT"))
        .and(path("/me/drive/root:/a.txt:/content"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad gateway</html>"))
        .mount(&server)
        .await;

    let uploader = GraphUploader::new(GraphClient::with_base_url(server.uri()));
    let response = uploader
        .upload(&common::source(&local, "a.txt", true), &common::credential("t"))
        .await
        .expect("upload failed");

    assert_eq!(response.status, 502);
    assert!(response.body.is_null());
    assert_eq!(response.error_code(), None);
}

#[tokio::test]
async fn test_empty_file_is_uploaded() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("empty.txt");
    std::fs::write(&local, b"").unwrap();

    Mock::given(method("PUT"))
        .and(path("/me/drive/root:/empty.txt:/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "e"})))
        .expect(1)
        .mount(&server)
        .await;

    let uploader = GraphUploader::new(GraphClient::with_base_url(server.uri()));
    let response = uploader
        .upload(&common::source(&local, "empty.txt", true), &common::credential("t"))
        .await
        .expect("upload failed");
    assert!(response.is_success());
}

#[tokio::test]
async fn test_unsupported_files_never_reach_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let flagged_large = dir.path().join("flagged.bin");
    std::fs::write(&flagged_large, b"small content").unwrap();
    let oversized = dir.path().join("oversized.bin");
    std::fs::File::create(&oversized)
        .unwrap()
        .set_len(SMALL_UPLOAD_LIMIT + 1)
        .unwrap();

    let uploader = GraphUploader::new(GraphClient::with_base_url(server.uri()));
    let credential = common::credential("t");

    for entry in [
        common::source(&flagged_large, "flagged.bin", false),
        common::source(&oversized, "oversized.bin", true),
    ] {
        let err = uploader.upload(&entry, &credential).await.unwrap_err();
        let upload_err = err
            .downcast_ref::<UploadError>()
            .expect("expected an UploadError");
        assert!(upload_err.is_unsupported());
    }
}
