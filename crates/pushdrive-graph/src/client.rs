//! Microsoft Graph API client
//!
//! Provides a typed HTTP client for interacting with the Microsoft Graph API.
//! Handles authentication headers, JSON deserialization, and endpoint
//! construction. The client holds no token of its own: every request is
//! signed with the [`Credential`] supplied by the caller, so a refreshed
//! credential takes effect on the very next call.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use pushdrive_core::domain::Credential;
//! use pushdrive_graph::client::GraphClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = GraphClient::new();
//! let credential = Credential::new("access-token-here", Utc::now());
//! let user_info = client.get_user_info(&credential).await?;
//! println!("Hello, {}", user_info.display_name);
//! # Ok(())
//! # }
//! ```

use pushdrive_core::config::DEFAULT_GRAPH_BASE_URL;
use pushdrive_core::domain::Credential;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;

use crate::GraphError;

// ============================================================================
// Graph API response types
// ============================================================================

/// Response from the /me endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeResponse {
    /// User's display name
    display_name: Option<String>,
    /// User's email (mail field)
    mail: Option<String>,
    /// User's principal name (typically email)
    user_principal_name: Option<String>,
    /// User ID
    id: Option<String>,
}

/// Profile of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    /// Mail address, or the principal name when no mailbox is attached
    pub email: String,
    pub display_name: String,
    pub id: String,
}

// ============================================================================
// GraphClient
// ============================================================================

/// HTTP client for Microsoft Graph API calls
///
/// Wraps `reqwest::Client` with base URL construction and bearer
/// authentication for the Microsoft Graph API.
#[derive(Debug, Clone)]
pub struct GraphClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
}

impl GraphClient {
    /// Creates a new GraphClient against the public Graph endpoint
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_GRAPH_BASE_URL)
    }

    /// Creates a new GraphClient with a custom base URL (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Creates an authenticated request builder for the given method and path
    ///
    /// Prepends the base URL and adds the Authorization header.
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, PUT, ...)
    /// * `path` - API path relative to base URL (e.g., "/me")
    /// * `credential` - Credential whose bearer token signs the request
    pub fn request(&self, method: Method, path: &str, credential: &Credential) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, &url)
            .bearer_auth(credential.access_token())
    }

    /// Retrieves the profile of the user owning `credential`
    ///
    /// Makes `GET /me`. Any non-2xx status is returned as a classified
    /// [`GraphError`].
    pub async fn get_user_info(&self, credential: &Credential) -> Result<UserInfo, GraphError> {
        debug!("Fetching user info from /me");

        let response = self
            .request(Method::GET, "/me", credential)
            .send()
            .await?;
        let response = check_status(response).await?;

        let me: MeResponse = response
            .json()
            .await
            .map_err(|e| GraphError::InvalidResponse(format!("Failed to parse /me response: {e}")))?;

        let email = me
            .mail
            .or(me.user_principal_name)
            .unwrap_or_else(|| "unknown@unknown.com".to_string());

        let display_name = me
            .display_name
            .unwrap_or_else(|| "Unknown User".to_string());

        Ok(UserInfo {
            email,
            display_name,
            id: me.id.unwrap_or_default(),
        })
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for GraphClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns a non-2xx response into a [`GraphError`], passing 2xx through
async fn check_status(response: Response) -> Result<Response, GraphError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_string());
    Err(GraphError::from_status(status.as_u16(), body))
}
