//! PushDrive Daemon - watch local files and push them to OneDrive
//!
//! This binary runs in the foreground until killed and handles:
//! - Loading and validating `settings.yml`
//! - Authenticating (cached token, refresh or device-code prompt)
//! - Watching every configured source and uploading it when it changes
//! - Graceful shutdown on SIGTERM/SIGINT, persisting the token cache
//!
//! # Architecture
//!
//! Everything runs on a single-threaded tokio runtime. The notify backend
//! has its own OS threads and feeds the [`ChangeStream`]; the [`SyncLoop`]
//! pulls from it until the `CancellationToken` is triggered by a signal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pushdrive_core::config::{Settings, DEFAULT_SETTINGS_PATH};
use pushdrive_core::ports::IAuthenticator;
use pushdrive_graph::auth::{AuthConfig, GraphAuthenticator, TokenCache};
use pushdrive_graph::client::GraphClient;
use pushdrive_graph::upload::GraphUploader;
use pushdrive_sync::{ChangeStream, MultiRootWatcher, SyncLoop};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Command line
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "pushdrive", version, about = "Push local files to OneDrive as they change")]
struct Cli {
    /// Settings file
    #[arg(long, default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    /// Token cache file (defaults to `auth.token_cache` from the settings)
    #[arg(long)]
    token_cache: Option<PathBuf>,
}

// ============================================================================
// Startup helpers
// ============================================================================

/// A valid `RUST_LOG` directive wins over the configured level
fn env_filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

fn init_tracing(level: &str) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(rust_log.as_deref(), level))
        .with_target(true)
        .init();
}

/// Loads the settings and rejects them if any field is invalid
fn load_settings(path: &Path) -> Result<Settings> {
    let settings = Settings::load(path)?;

    let errors = settings.validate();
    if !errors.is_empty() {
        let details = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        anyhow::bail!("Invalid settings in {}: {}", path.display(), details);
    }

    Ok(settings)
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Daemon
// ============================================================================

async fn run(cli: Cli, settings: Settings) -> Result<()> {
    let base_dir = std::env::current_dir().context("Failed to determine working directory")?;
    let sources = settings
        .source_set(&base_dir)
        .context("Failed to build source table")?;

    let cache_path = cli
        .token_cache
        .unwrap_or_else(|| settings.auth.token_cache.clone());
    let authenticator = Arc::new(GraphAuthenticator::new(
        AuthConfig::from_settings(&settings),
        TokenCache::load(&cache_path),
    )?);

    let credential = authenticator
        .authenticate()
        .await
        .context("Startup authentication failed")?;
    info!(expires_at = %credential.expires_at(), "Authenticated");

    let uploader = Arc::new(GraphUploader::new(GraphClient::with_base_url(
        settings.graph.base_url.clone(),
    )));

    let watcher = MultiRootWatcher::new(sources.paths().map(Path::to_path_buf))
        .context("Failed to start file watchers")?;
    let mut stream = ChangeStream::new(watcher, Duration::from_millis(settings.watch.tick_ms));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let mut sync = SyncLoop::new(authenticator.clone(), uploader, sources, credential);
    sync.run(&mut stream, shutdown).await;

    authenticator
        .persist()
        .await
        .context("Failed to persist token cache")?;
    Ok(())
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match load_settings(&cli.settings) {
        Ok(settings) => {
            init_tracing(&settings.logging.level);
            settings
        }
        Err(e) => {
            init_tracing("info");
            error!(error = %format!("{e:#}"), "Cannot start");
            return Err(e);
        }
    };

    info!(settings = %cli.settings.display(), "PushDrive starting");

    let result = run(cli, settings).await;

    match &result {
        Ok(()) => info!("PushDrive shut down gracefully"),
        Err(e) => error!(error = %format!("{e:#}"), "PushDrive exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
