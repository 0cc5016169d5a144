//! Domain error types
//!
//! This module defines the error taxonomy shared by every crate:
//! validation failures on domain values, authentication failures and
//! upload refusals. Adapters return them wrapped in `anyhow::Error`;
//! callers that need to branch on them use `downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid local path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid remote path format
    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Failures while obtaining an access credential
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The device-code flow could not be started
    #[error("Failed to create device flow: {0}")]
    DeviceFlow(String),

    /// The identity provider answered without an access token
    #[error("No access token in result")]
    NoToken,

    /// The token endpoint rejected the request or could not be reached
    #[error("Token endpoint error: {0}")]
    TokenEndpoint(String),

    /// The freshly obtained token was rejected by the identity check
    #[error("Identity check failed with status {status}")]
    IdentityCheck {
        /// HTTP status returned by `GET /me`
        status: u16,
    },

    /// The persisted token cache could not be read or written
    #[error("Token cache error: {0}")]
    Cache(String),
}

/// Reasons an upload is refused before any request is made
#[derive(Debug, Error)]
pub enum UploadError {
    /// The source is not configured as a small file
    #[error("Large file uploading not implemented yet: {path} is not configured as small")]
    NotSmall {
        /// Local path of the refused source
        path: PathBuf,
    },

    /// The source is flagged small but has outgrown the single-request limit
    #[error("Large file uploading not implemented yet: {path} is {size} bytes (limit {limit})")]
    TooLarge {
        /// Local path of the refused source
        path: PathBuf,
        /// Size of the file on disk
        size: u64,
        /// Single-request upload limit
        limit: u64,
    },

    /// The local file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Local path that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    /// Returns true if the upload was refused because of its size class
    pub fn is_unsupported(&self) -> bool {
        matches!(self, UploadError::NotSmall { .. } | UploadError::TooLarge { .. })
    }
}
