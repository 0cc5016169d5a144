//! Upload port (driven/secondary port)
//!
//! ## Design Notes
//!
//! - The uploader does not interpret the remote answer. It hands back the
//!   raw status and JSON body in an [`UploadResponse`] and leaves the
//!   decision (success, expired token, other rejection) to the caller.
//! - Refusals that happen before any request is sent are reported as
//!   [`UploadError`](crate::domain::UploadError) inside the `anyhow::Error`.

use serde_json::Value;

use crate::domain::{Credential, SourceEntry};

/// Error code the remote API puts in the body when the bearer token expired
pub const INVALID_AUTHENTICATION_TOKEN: &str = "InvalidAuthenticationToken";

/// Raw answer to an upload request
#[derive(Debug, Clone, PartialEq)]
pub struct UploadResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed JSON body (`Value::Null` if the body was not JSON)
    pub body: Value,
}

impl UploadResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `error.code` member of the body, if present
    pub fn error_code(&self) -> Option<&str> {
        self.body
            .get("error")
            .and_then(|error| error.get("code"))
            .and_then(Value::as_str)
    }

    /// Returns true if the body reports an expired or invalid bearer token
    pub fn is_auth_invalid(&self) -> bool {
        self.error_code() == Some(INVALID_AUTHENTICATION_TOKEN)
    }
}

/// Port trait for sending one file to its remote destination
#[async_trait::async_trait]
pub trait IUploader: Send + Sync {
    /// Uploads the current contents of `entry` using `credential`
    async fn upload(
        &self,
        entry: &SourceEntry,
        credential: &Credential,
    ) -> anyhow::Result<UploadResponse>;
}
