//! Upload operations for Microsoft Graph API (OneDrive)
//!
//! Provides single-request uploads of small files:
//! - [`upload_small`] - `PUT` of an in-memory buffer to an item path
//! - [`GraphUploader`] - [`IUploader`] adapter that checks the size class,
//!   reads the file and calls [`upload_small`]
//!
//! Files that are not flagged small, or that reach [`SMALL_UPLOAD_LIMIT`],
//! are refused before any I/O or request. Resumable upload sessions are not
//! implemented.
//!
//! ## Microsoft Graph API References
//!
//! - [Upload small files](https://learn.microsoft.com/en-us/graph/api/driveitem-put-content)

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use pushdrive_core::domain::{Credential, RemotePath, SourceEntry, UploadError};
use pushdrive_core::ports::{IUploader, UploadResponse};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::client::GraphClient;
use crate::GraphError;

/// Largest body accepted by the simple upload API: 4 MiB (exclusive)
pub const SMALL_UPLOAD_LIMIT: u64 = 4 * 1024 * 1024;

/// Content type sent with every upload body
const UPLOAD_CONTENT_TYPE: &str = "application/binary";

// ============================================================================
// API path construction helper
// ============================================================================

/// Builds the Graph API path for an item addressed by its drive path
///
/// The remote path is percent-encoded segment by segment:
/// `Docs/a b.txt` with suffix `content` becomes
/// `/me/drive/root:/Docs/a%20b.txt:/content`.
pub fn build_item_path(remote_path: &RemotePath, suffix: &str) -> String {
    format!("/me/drive/root:/{}:/{}", remote_path.encoded(), suffix)
}

// ============================================================================
// upload_small
// ============================================================================

/// Uploads `data` to `remote_path` in a single PUT request
///
/// Uses the simple upload API: `PUT /me/drive/root:/{path}:/content` with the
/// bytes as the request body. The response is not interpreted: whatever the
/// status, the raw status and JSON body are returned. A body that is not
/// JSON becomes `Value::Null`.
///
/// # Errors
/// Returns an error only if the request could not be sent or the response
/// body could not be read
pub async fn upload_small(
    client: &GraphClient,
    remote_path: &RemotePath,
    data: Vec<u8>,
    credential: &Credential,
) -> Result<UploadResponse, GraphError> {
    let path = build_item_path(remote_path, "content");
    debug!(
        name = remote_path.file_name(),
        bytes = data.len(),
        path = %path,
        "Uploading small file"
    );

    let response = client
        .request(Method::PUT, &path, credential)
        .header(reqwest::header::CONTENT_TYPE, UPLOAD_CONTENT_TYPE)
        .body(data)
        .send()
        .await?;

    let status = response.status().as_u16();
    let bytes = response.bytes().await?;
    let body = serde_json::from_slice::<Value>(&bytes).unwrap_or(Value::Null);

    debug!(status, path = %path, "Upload answered");
    Ok(UploadResponse::new(status, body))
}

// ============================================================================
// GraphUploader
// ============================================================================

/// [`IUploader`] that sends small files through the Graph simple upload API
#[derive(Debug, Clone)]
pub struct GraphUploader {
    client: GraphClient,
}

impl GraphUploader {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }
}

/// Checks the size class of `entry` and reads it into memory
async fn read_small_file(entry: &SourceEntry) -> Result<Vec<u8>, UploadError> {
    let path = entry.local_path();
    if !entry.is_small() {
        return Err(UploadError::NotSmall {
            path: path.to_path_buf(),
        });
    }

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|source| read_error(path, source))?;
    check_size(path, metadata.len())?;

    let data = tokio::fs::read(path)
        .await
        .map_err(|source| read_error(path, source))?;
    // The file may have grown between stat and read
    check_size(path, data.len() as u64)?;

    Ok(data)
}

fn check_size(path: &Path, size: u64) -> Result<(), UploadError> {
    if size >= SMALL_UPLOAD_LIMIT {
        return Err(UploadError::TooLarge {
            path: path.to_path_buf(),
            size,
            limit: SMALL_UPLOAD_LIMIT,
        });
    }
    Ok(())
}

fn read_error(path: &Path, source: std::io::Error) -> UploadError {
    UploadError::Read {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl IUploader for GraphUploader {
    async fn upload(&self, entry: &SourceEntry, credential: &Credential) -> Result<UploadResponse> {
        let data = read_small_file(entry).await?;
        let response = upload_small(&self.client, entry.remote_path(), data, credential).await?;
        Ok(response)
    }
}
