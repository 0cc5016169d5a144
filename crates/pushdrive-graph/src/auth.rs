//! OAuth2 device-code authentication for Microsoft Graph API
//!
//! Implements the Device Authorization Grant (RFC 8628) against the
//! Microsoft identity platform, backed by a token cache persisted on disk so
//! that restarts do not prompt the user again.
//!
//! ## Components
//!
//! - [`AuthConfig`] - Client id, authority, scopes and identity-check settings
//! - [`TokenCache`] - JSON token store written back only when it changed
//! - [`OAuthFlow`] - Device-code and refresh-token exchanges via `oauth2`
//! - [`GraphAuthenticator`] - Silent acquisition, device flow fallback and
//!   the `/me` identity check behind the [`IAuthenticator`] port

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{
    ClientId, DeviceAuthorizationUrl, EndpointNotSet, EndpointSet, RefreshToken, Scope,
    StandardDeviceAuthorizationResponse, TokenResponse, TokenUrl,
};
use pushdrive_core::config::{Settings, DEFAULT_AUTHORITY, DEFAULT_GRAPH_BASE_URL, DEFAULT_SCOPES};
use pushdrive_core::domain::{AuthError, Credential};
use pushdrive_core::ports::IAuthenticator;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::GraphClient;

/// A cached access token is reused only if it outlives this margin
const EXPIRY_MARGIN_MINUTES: i64 = 5;

// ============================================================================
// AuthConfig
// ============================================================================

/// Configuration for the device-code authentication flow
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Application (client) ID from the Azure AD app registration
    pub client_id: String,
    /// Identity authority, e.g. `https://login.microsoftonline.com/consumers`
    pub authority: String,
    /// OAuth scopes to request
    pub scopes: Vec<String>,
    /// Graph base URL used for the `/me` identity check
    pub graph_base_url: String,
    /// Whether a newly acquired token is checked against `/me`
    pub verify_identity: bool,
}

impl AuthConfig {
    /// Creates a config for `client_id` with default endpoints and scopes
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            authority: DEFAULT_AUTHORITY.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            verify_identity: true,
        }
    }

    /// Builds the config from loaded settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            authority: settings.auth.authority.clone(),
            scopes: settings.auth.scopes.clone(),
            graph_base_url: settings.graph.base_url.clone(),
            verify_identity: settings.auth.verify_identity,
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    pub fn with_graph_base_url(mut self, url: impl Into<String>) -> Self {
        self.graph_base_url = url.into();
        self
    }

    pub fn with_verify_identity(mut self, verify: bool) -> Self {
        self.verify_identity = verify;
        self
    }

    /// Device authorization endpoint of the authority
    pub fn device_code_url(&self) -> String {
        format!("{}/oauth2/v2.0/devicecode", self.authority.trim_end_matches('/'))
    }

    /// Token endpoint of the authority
    pub fn token_url(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority.trim_end_matches('/'))
    }
}

// ============================================================================
// Tokens
// ============================================================================

/// OAuth tokens received from the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokens {
    /// Bearer token for authenticating API requests
    pub access_token: String,
    /// Token for refreshing the access token without user interaction
    /// (requires `offline_access` scope)
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Returns true if the access token will expire within the given duration
    pub fn expires_within(&self, duration: Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }

    /// Converts into the credential handed to the uploader
    pub fn to_credential(&self) -> Credential {
        Credential::new(self.access_token.clone(), self.expires_at)
    }
}

// ============================================================================
// TokenCache
// ============================================================================

/// One signed-in account as stored in the token cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAccount {
    pub client_id: String,
    /// Username reported by `/me`, once known
    pub username: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl CachedAccount {
    fn tokens(&self) -> Tokens {
        Tokens {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    accounts: Vec<CachedAccount>,
}

/// Token store persisted as JSON at a fixed path
///
/// Every mutation sets the `state_changed` flag; [`TokenCache::flush_if_changed`]
/// writes the file only when the flag is set, then clears it.
#[derive(Debug)]
pub struct TokenCache {
    path: PathBuf,
    accounts: Vec<CachedAccount>,
    state_changed: bool,
}

impl TokenCache {
    /// Loads the cache from `path`
    ///
    /// A missing file yields an empty cache. An unreadable or corrupt file is
    /// logged and also treated as empty; the next flush overwrites it.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let accounts = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<CacheDocument>(&text) {
                Ok(document) => document.accounts,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Token cache is corrupt, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No token cache found");
                Vec::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read token cache, starting empty");
                Vec::new()
            }
        };

        debug!(path = %path.display(), accounts = accounts.len(), "Loaded token cache");
        Self {
            path,
            accounts,
            state_changed: false,
        }
    }

    /// Path the cache is persisted to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the account registered under `client_id`, if any
    pub fn account(&self, client_id: &str) -> Option<&CachedAccount> {
        self.accounts.iter().find(|a| a.client_id == client_id)
    }

    /// Stores `tokens` for `client_id`, replacing any previous entry
    ///
    /// A known username is kept. A refresh response without a new refresh
    /// token keeps the old one.
    pub fn upsert(&mut self, client_id: &str, tokens: &Tokens, scopes: &[String]) {
        let previous = self
            .accounts
            .iter()
            .position(|a| a.client_id == client_id)
            .map(|i| self.accounts.remove(i));

        let (username, old_refresh) = match previous {
            Some(account) => (account.username, account.refresh_token),
            None => (None, None),
        };

        self.accounts.push(CachedAccount {
            client_id: client_id.to_string(),
            username,
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone().or(old_refresh),
            expires_at: tokens.expires_at,
            scopes: scopes.to_vec(),
        });
        self.state_changed = true;
    }

    /// Records the username for `client_id`
    pub fn set_username(&mut self, client_id: &str, username: &str) {
        if let Some(account) = self.accounts.iter_mut().find(|a| a.client_id == client_id) {
            if account.username.as_deref() != Some(username) {
                account.username = Some(username.to_string());
                self.state_changed = true;
            }
        }
    }

    /// Marks `access_token` as unusable so the next acquisition refreshes
    ///
    /// Only acts if the cached token for `client_id` still equals the given
    /// one. Returns true if the cache changed.
    pub fn forget_access_token(&mut self, client_id: &str, access_token: &str) -> bool {
        match self
            .accounts
            .iter_mut()
            .find(|a| a.client_id == client_id && a.access_token == access_token)
        {
            Some(account) => {
                account.expires_at = DateTime::<Utc>::default();
                self.state_changed = true;
                true
            }
            None => false,
        }
    }

    /// Returns true if the cache was mutated since load or the last flush
    pub fn has_state_changed(&self) -> bool {
        self.state_changed
    }

    /// Writes the cache to disk if it changed
    ///
    /// The file is written to a sibling temp file and renamed into place. On
    /// unix it is readable by the owner only. Returns whether a write
    /// happened.
    pub fn flush_if_changed(&mut self) -> Result<bool, AuthError> {
        if !self.state_changed {
            return Ok(false);
        }

        let document = CacheDocument {
            accounts: self.accounts.clone(),
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| AuthError::Cache(format!("failed to serialize token cache: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AuthError::Cache(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        write_private(&tmp_path, json.as_bytes())
            .and_then(|()| fs::rename(&tmp_path, &self.path))
            .map_err(|e| {
                AuthError::Cache(format!("failed to write {}: {e}", self.path.display()))
            })?;

        self.state_changed = false;
        debug!(path = %self.path.display(), "Token cache persisted");
        Ok(true)
    }
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// ============================================================================
// OAuthFlow
// ============================================================================

/// Device-code and refresh-token exchanges using the `oauth2` crate
pub struct OAuthFlow {
    client: BasicClient<EndpointNotSet, EndpointSet, EndpointNotSet, EndpointNotSet, EndpointSet>,
    http: reqwest::Client,
    scopes: Vec<String>,
}

impl OAuthFlow {
    /// Creates the flow for the given configuration
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_device_authorization_url(
                DeviceAuthorizationUrl::new(config.device_code_url())
                    .context("Invalid device authorization URL")?,
            )
            .set_token_uri(TokenUrl::new(config.token_url()).context("Invalid token URL")?);

        // Following redirects would leak the token request to another host
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client for the token endpoint")?;

        Ok(Self {
            client,
            http,
            scopes: config.scopes.clone(),
        })
    }

    /// Runs the interactive device-code flow
    ///
    /// Logs the sign-in instruction and polls the token endpoint until the
    /// user completes authorization or the code expires.
    pub async fn device_code(&self) -> Result<Tokens> {
        let mut request = self.client.exchange_device_code();
        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        let details: StandardDeviceAuthorizationResponse = request
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::DeviceFlow(e.to_string()))?;

        info!("{}", device_flow_message(&details));

        let token_result = self
            .client
            .exchange_device_access_token(&details)
            .request_async(&self.http, tokio::time::sleep, None)
            .await
            .map_err(|e| AuthError::TokenEndpoint(e.to_string()))?;

        let access_token = token_result.access_token().secret().to_string();
        if access_token.is_empty() {
            return Err(AuthError::NoToken.into());
        }

        info!("Device authorization completed");
        Ok(Tokens {
            access_token,
            refresh_token: token_result.refresh_token().map(|t| t.secret().to_string()),
            expires_at: expiry_from(token_result.expires_in()),
        })
    }

    /// Redeems a refresh token for a fresh access token
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Tokens> {
        debug!("Refreshing access token");

        let refresh = RefreshToken::new(refresh_token.to_string());
        let mut request = self.client.exchange_refresh_token(&refresh);
        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        let token_result = request
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::TokenEndpoint(e.to_string()))?;

        let access_token = token_result.access_token().secret().to_string();
        if access_token.is_empty() {
            return Err(AuthError::NoToken.into());
        }

        Ok(Tokens {
            access_token,
            refresh_token: token_result
                .refresh_token()
                .map(|t| t.secret().to_string())
                .or_else(|| Some(refresh_token.to_string())),
            expires_at: expiry_from(token_result.expires_in()),
        })
    }
}

fn expiry_from(expires_in: Option<std::time::Duration>) -> DateTime<Utc> {
    expires_in
        .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64))
        .unwrap_or_else(|| Utc::now() + Duration::hours(1))
}

/// User-facing instruction for the device-code prompt
fn device_flow_message(details: &StandardDeviceAuthorizationResponse) -> String {
    format!(
        "To sign in, use a web browser to open the page {} and enter the code {} to authenticate.",
        details.verification_uri().as_str(),
        details.user_code().secret()
    )
}

// ============================================================================
// GraphAuthenticator
// ============================================================================

/// How a token was obtained
enum Acquired {
    /// Returned from the cache untouched
    Cached(Tokens),
    /// Obtained from the token endpoint (refresh or device flow)
    Fresh(Tokens),
}

/// [`IAuthenticator`] backed by the token cache and the device-code flow
///
/// The cache is flushed by [`GraphAuthenticator::persist`] and again when the
/// authenticator is dropped, in both cases only if it changed.
pub struct GraphAuthenticator {
    config: AuthConfig,
    flow: OAuthFlow,
    graph: GraphClient,
    cache: Mutex<TokenCache>,
}

impl GraphAuthenticator {
    /// Creates the authenticator around an already loaded cache
    pub fn new(config: AuthConfig, cache: TokenCache) -> Result<Self> {
        let flow = OAuthFlow::new(&config)?;
        let graph = GraphClient::with_base_url(config.graph_base_url.clone());
        Ok(Self {
            config,
            flow,
            graph,
            cache: Mutex::new(cache),
        })
    }

    /// Writes the token cache to disk if it changed
    pub async fn persist(&self) -> Result<(), AuthError> {
        let mut cache = self.cache.lock().await;
        if cache.flush_if_changed()? {
            info!(path = %cache.path().display(), "Token cache saved");
        }
        Ok(())
    }

    /// Tries the cache, then the refresh token
    async fn acquire_silent(&self, cache: &TokenCache) -> Option<Acquired> {
        let account = cache.account(&self.config.client_id)?;
        let tokens = account.tokens();

        if !tokens.expires_within(Duration::minutes(EXPIRY_MARGIN_MINUTES)) {
            debug!("Using cached access token");
            return Some(Acquired::Cached(tokens));
        }

        let refresh_token = tokens.refresh_token.as_deref()?;
        match self.flow.refresh_token(refresh_token).await {
            Ok(fresh) => {
                info!("Access token refreshed");
                Some(Acquired::Fresh(fresh))
            }
            Err(e) => {
                warn!(error = %e, "Silent token refresh failed");
                None
            }
        }
    }

    /// Checks the token against `/me` and returns the username
    async fn verify_identity(&self, tokens: &Tokens) -> Result<String> {
        let user = self
            .graph
            .get_user_info(&tokens.to_credential())
            .await
            .map_err(|e| match e.status() {
                Some(status) => anyhow::Error::new(AuthError::IdentityCheck { status }),
                None => anyhow::Error::new(e).context("Identity check failed"),
            })?;

        info!(
            user = %user.email,
            name = %user.display_name,
            id = %user.id,
            "Signed in"
        );
        Ok(user.email)
    }
}

#[async_trait]
impl IAuthenticator for GraphAuthenticator {
    async fn authenticate(&self) -> Result<Credential> {
        let mut cache = self.cache.lock().await;

        let acquired = match self.acquire_silent(&cache).await {
            Some(acquired) => acquired,
            None => {
                info!("No usable cached token, starting device code flow");
                Acquired::Fresh(self.flow.device_code().await?)
            }
        };

        let (tokens, fresh) = match acquired {
            Acquired::Cached(tokens) => (tokens, false),
            Acquired::Fresh(tokens) => (tokens, true),
        };

        // Stored before the identity check so a failed check cannot lose a
        // rotated refresh token or a completed device login
        if fresh {
            cache.upsert(&self.config.client_id, &tokens, &self.config.scopes);
        }

        if self.config.verify_identity {
            let username = self.verify_identity(&tokens).await?;
            cache.set_username(&self.config.client_id, &username);
        }

        Ok(tokens.to_credential())
    }

    async fn reauthenticate(&self, rejected: &Credential) -> Result<Credential> {
        {
            let mut cache = self.cache.lock().await;
            if cache.forget_access_token(&self.config.client_id, rejected.access_token()) {
                debug!("Discarded rejected access token");
            }
        }
        self.authenticate().await
    }
}

impl Drop for GraphAuthenticator {
    fn drop(&mut self) {
        if let Err(e) = self.cache.get_mut().flush_if_changed() {
            warn!(error = %e, "Failed to persist token cache on drop");
        }
    }
}
