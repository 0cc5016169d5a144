//! Settings module for PushDrive.
//!
//! Provides typed settings structs that map to `settings.yml`, with loading,
//! validation, defaults, and a builder pattern for programmatic use.
//!
//! Only `CLIENT_ID` and `sources` are required; every other section falls
//! back to its defaults when omitted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::{resolve_local_path, DomainError, RemotePath, SourceEntry, SourceSet};

/// Default settings file, relative to the working directory.
pub const DEFAULT_SETTINGS_PATH: &str = "settings.yml";

/// Default token cache file, relative to the working directory.
pub const DEFAULT_TOKEN_CACHE_PATH: &str = "token_cache.bin";

/// Default identity authority (personal Microsoft accounts).
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/consumers";

/// Default Microsoft Graph endpoint.
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default OAuth scopes for uploading to the drive.
pub const DEFAULT_SCOPES: &[&str] = &["Files.ReadWrite.All", "User.Read", "offline_access"];

// ---------------------------------------------------------------------------
// Settings struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level settings for PushDrive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Azure AD application (client) ID.
    #[serde(rename = "CLIENT_ID")]
    pub client_id: String,
    /// Watched files keyed by local path.
    pub sources: BTreeMap<PathBuf, SourceSettings>,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub watch: WatchSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub graph: GraphSettings,
}

/// One entry of the `sources` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Destination inside the drive, relative to its root.
    pub remote_path: String,
    /// Whether the file stays under the single-request upload limit.
    pub small: bool,
}

/// Authentication / token cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Identity authority; the device-code and token endpoints hang off it.
    pub authority: String,
    /// OAuth scopes to request.
    pub scopes: Vec<String>,
    /// Where the token cache is persisted between runs.
    pub token_cache: PathBuf,
    /// Call `GET /me` after obtaining a token to make sure it works.
    pub verify_identity: bool,
}

/// Change watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Milliseconds per polling tick; changes within one tick are merged.
    pub tick_ms: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Base URL every API path is appended to.
    pub base_url: String,
}

// ---------------------------------------------------------------------------
// Settings::load()
// ---------------------------------------------------------------------------

impl Settings {
    /// Load settings from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        Ok(settings)
    }

    /// Builds the immutable source table, resolving relative local paths
    /// against `base_dir`.
    pub fn source_set(&self, base_dir: &Path) -> Result<SourceSet, DomainError> {
        let entries = self
            .sources
            .iter()
            .map(|(local, source)| {
                SourceEntry::new(
                    resolve_local_path(base_dir, local),
                    RemotePath::new(source.remote_path.clone())?,
                    source.small,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        SourceSet::new(entries)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            token_cache: PathBuf::from(DEFAULT_TOKEN_CACHE_PATH),
            verify_identity: true,
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self { tick_ms: 300 }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"watch.tick_ms"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

impl Settings {
    /// Validate the settings and return all errors found.
    ///
    /// An empty vector means the settings are valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.client_id.trim().is_empty() {
            errors.push(ValidationError {
                field: "CLIENT_ID".into(),
                message: "must not be empty".into(),
            });
        }

        // --- sources ---
        if self.sources.is_empty() {
            errors.push(ValidationError {
                field: "sources".into(),
                message: "at least one source must be configured".into(),
            });
        }
        for (local, source) in &self.sources {
            if let Err(e) = RemotePath::new(source.remote_path.clone()) {
                errors.push(ValidationError {
                    field: format!("sources.{}.remote_path", local.display()),
                    message: e.to_string(),
                });
            }
        }

        // --- auth ---
        if !is_http_url(&self.auth.authority) {
            errors.push(ValidationError {
                field: "auth.authority".into(),
                message: format!("not an http(s) URL: {}", self.auth.authority),
            });
        }
        if self.auth.scopes.is_empty() {
            errors.push(ValidationError {
                field: "auth.scopes".into(),
                message: "at least one scope is required".into(),
            });
        }
        if self.auth.token_cache.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "auth.token_cache".into(),
                message: "must not be empty".into(),
            });
        }

        // --- watch ---
        if self.watch.tick_ms == 0 {
            errors.push(ValidationError {
                field: "watch.tick_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        // --- graph ---
        if !is_http_url(&self.graph.base_url) {
            errors.push(ValidationError {
                field: "graph.base_url".into(),
                message: format!("not an http(s) URL: {}", self.graph.base_url),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// SettingsBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing [`Settings`] programmatically.
///
/// Starts from [`Settings::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use pushdrive_core::config::SettingsBuilder;
///
/// let settings = SettingsBuilder::new()
///     .client_id("00000000-0000-0000-0000-000000000000")
///     .source("notes/todo.md", "Documents/todo.md", true)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Create a new builder initialised with [`Settings::default`] values.
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
        }
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.settings.client_id = client_id.into();
        self
    }

    pub fn source(
        mut self,
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
        small: bool,
    ) -> Self {
        self.settings.sources.insert(
            local_path.into(),
            SourceSettings {
                remote_path: remote_path.into(),
                small,
            },
        );
        self
    }

    pub fn auth_authority(mut self, authority: impl Into<String>) -> Self {
        self.settings.auth.authority = authority.into();
        self
    }

    pub fn auth_verify_identity(mut self, verify: bool) -> Self {
        self.settings.auth.verify_identity = verify;
        self
    }

    pub fn watch_tick_ms(mut self, tick_ms: u64) -> Self {
        self.settings.watch.tick_ms = tick_ms;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.settings.logging.level = level.into();
        self
    }

    pub fn graph_base_url(mut self, url: impl Into<String>) -> Self {
        self.settings.graph.base_url = url.into();
        self
    }

    /// Consume the builder and return the settings without validation.
    pub fn build(self) -> Settings {
        self.settings
    }

    /// Consume the builder, validate, and return the settings or all errors.
    pub fn build_validated(self) -> Result<Settings, Vec<ValidationError>> {
        let errors = self.settings.validate();
        if errors.is_empty() {
            Ok(self.settings)
        } else {
            Err(errors)
        }
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
