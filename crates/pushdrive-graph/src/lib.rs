//! PushDrive Graph - Microsoft Graph API adapters
//!
//! Provides async adapters for:
//! - OAuth2 device-code authentication with a persisted token cache
//! - The `/me` identity check
//! - Single-request uploads of small files
//!
//! ## Modules
//!
//! - [`auth`] - Device-code flow, token cache and the [`auth::GraphAuthenticator`]
//! - [`client`] - Microsoft Graph API HTTP client
//! - [`upload`] - Small file upload and the [`upload::GraphUploader`]

pub mod auth;
pub mod client;
pub mod upload;

use thiserror::Error;

/// Errors that can occur when communicating with the Microsoft Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded
    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    /// A server-side error occurred (5xx)
    #[error("Server error ({status}): {body}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },

    /// Any other non-2xx status
    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GraphError {
    /// Classifies a non-2xx status and its body
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => GraphError::Unauthorized(body),
            403 => GraphError::Forbidden(body),
            404 => GraphError::NotFound(body),
            429 => GraphError::TooManyRequests(body),
            500..=599 => GraphError::ServerError { status, body },
            _ => GraphError::UnexpectedStatus { status, body },
        }
    }

    /// HTTP status behind this error, if it came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            GraphError::Unauthorized(_) => Some(401),
            GraphError::Forbidden(_) => Some(403),
            GraphError::NotFound(_) => Some(404),
            GraphError::TooManyRequests(_) => Some(429),
            GraphError::ServerError { status, .. }
            | GraphError::UnexpectedStatus { status, .. } => Some(*status),
            GraphError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            GraphError::InvalidResponse(_) => None,
        }
    }
}
