//! Push synchronization loop
//!
//! The [`SyncLoop`] consumes change events and uploads every modified source
//! file to its configured remote path.
//!
//! ## Event Flow
//!
//! 1. **Filter**: only `Modified` events are acted on
//! 2. **Lookup**: the event path is mapped to its [`SourceEntry`]; unknown
//!    paths are logged and skipped
//! 3. **Upload**: the file is sent with the current credential
//! 4. **Re-authentication**: an `InvalidAuthenticationToken` answer triggers
//!    one re-authentication and one retried upload, never more
//!
//! Every error is contained to the event that caused it; the loop always
//! moves on to the next event and never requeues.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pushdrive_core::domain::{Credential, SourceEntry, SourceSet, UploadError};
use pushdrive_core::ports::{IAuthenticator, IUploader, UploadResponse};

use crate::watcher::{ChangeEvent, ChangeKind, ChangeSource};

// ============================================================================
// UploadOutcome
// ============================================================================

/// Result of processing one `Modified` event for a known source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The server accepted the upload (2xx)
    Uploaded {
        /// HTTP status returned by the server
        status: u16,
    },
    /// The server answered with a non-2xx status unrelated to the token
    Rejected {
        /// HTTP status returned by the server
        status: u16,
        /// `error.code` from the response body, if any
        code: Option<String>,
    },
    /// The file is not eligible for single-request upload
    Unsupported,
    /// The token was rejected and obtaining a new one failed
    ReauthFailed,
    /// The token was rejected again after re-authenticating
    AuthRetryExhausted,
    /// The upload could not be performed (I/O, network)
    Failed(String),
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded { .. })
    }

    fn from_response(response: &UploadResponse) -> Self {
        if response.is_success() {
            UploadOutcome::Uploaded {
                status: response.status,
            }
        } else {
            UploadOutcome::Rejected {
                status: response.status,
                code: response.error_code().map(str::to_string),
            }
        }
    }

    fn from_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<UploadError>() {
            Some(upload_err) if upload_err.is_unsupported() => UploadOutcome::Unsupported,
            _ => UploadOutcome::Failed(format!("{err:#}")),
        }
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadOutcome::Uploaded { status } => write!(f, "uploaded ({status})"),
            UploadOutcome::Rejected { status, code } => match code {
                Some(code) => write!(f, "rejected ({status}, {code})"),
                None => write!(f, "rejected ({status})"),
            },
            UploadOutcome::Unsupported => write!(f, "unsupported"),
            UploadOutcome::ReauthFailed => write!(f, "re-authentication failed"),
            UploadOutcome::AuthRetryExhausted => write!(f, "token rejected after re-authentication"),
            UploadOutcome::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

// ============================================================================
// SyncReport
// ============================================================================

/// Counters accumulated over a run of the loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Events pulled from the source, whatever their kind
    pub events_seen: u64,
    /// Uploads tried, excluding unsupported refusals
    pub uploads_attempted: u64,
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
    /// Files refused before any request (not small, or over the limit)
    pub uploads_unsupported: u64,
    pub reauthentications: u64,
}

impl SyncReport {
    fn record(&mut self, outcome: &UploadOutcome) {
        if *outcome == UploadOutcome::Unsupported {
            self.uploads_unsupported += 1;
            return;
        }
        self.uploads_attempted += 1;
        if outcome.is_success() {
            self.uploads_succeeded += 1;
        } else {
            self.uploads_failed += 1;
        }
    }
}

// ============================================================================
// SyncLoop
// ============================================================================

/// Uploads modified source files as change events arrive
///
/// Holds the current credential. It is replaced wholesale after a
/// successful re-authentication and left untouched by every other failure.
pub struct SyncLoop {
    authenticator: Arc<dyn IAuthenticator>,
    uploader: Arc<dyn IUploader>,
    sources: SourceSet,
    credential: Credential,
    report: SyncReport,
}

impl SyncLoop {
    /// Creates the loop with a credential obtained at startup
    pub fn new(
        authenticator: Arc<dyn IAuthenticator>,
        uploader: Arc<dyn IUploader>,
        sources: SourceSet,
        credential: Credential,
    ) -> Self {
        Self {
            authenticator,
            uploader,
            sources,
            credential,
            report: SyncReport::default(),
        }
    }

    /// The credential uploads are currently signed with
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Counters accumulated so far
    pub fn report(&self) -> &SyncReport {
        &self.report
    }

    /// Handles one change event
    ///
    /// Returns `None` for events that are ignored (not `Modified`, or for a
    /// path that is not a configured source).
    pub async fn process_event(&mut self, event: &ChangeEvent) -> Option<UploadOutcome> {
        self.report.events_seen += 1;

        if event.kind != ChangeKind::Modified {
            debug!(path = %event.path.display(), kind = ?event.kind, "Ignoring change");
            return None;
        }

        let entry = match self.sources.get(&event.path) {
            Some(entry) => entry.clone(),
            None => {
                warn!(path = %event.path.display(), "Change for unknown source, skipping");
                return None;
            }
        };

        let outcome = self.upload_with_reauth(&entry).await;
        self.report.record(&outcome);
        log_outcome(&entry, &outcome);
        Some(outcome)
    }

    /// Uploads `entry`, re-authenticating and retrying once on a rejected token
    async fn upload_with_reauth(&mut self, entry: &SourceEntry) -> UploadOutcome {
        let response = match self.uploader.upload(entry, &self.credential).await {
            Ok(response) => response,
            Err(e) => return UploadOutcome::from_error(&e),
        };

        if !response.is_auth_invalid() {
            return UploadOutcome::from_response(&response);
        }

        info!(
            path = %entry.local_path().display(),
            "Access token rejected, re-authenticating"
        );
        self.report.reauthentications += 1;
        match self.authenticator.reauthenticate(&self.credential).await {
            Ok(credential) => self.credential = credential,
            Err(e) => {
                error!(error = %format!("{e:#}"), "Re-authentication failed, keeping old credential");
                return UploadOutcome::ReauthFailed;
            }
        }

        match self.uploader.upload(entry, &self.credential).await {
            Ok(response) if response.is_auth_invalid() => UploadOutcome::AuthRetryExhausted,
            Ok(response) => UploadOutcome::from_response(&response),
            Err(e) => UploadOutcome::from_error(&e),
        }
    }

    /// Processes events until the source is exhausted or `shutdown` fires
    ///
    /// Shutdown also abandons the event being handled, so a device-code
    /// prompt waiting for the user cannot hold the process open.
    pub async fn run<S>(&mut self, source: &mut S, shutdown: CancellationToken) -> SyncReport
    where
        S: ChangeSource + ?Sized,
    {
        info!(sources = self.sources.len(), "Sync loop started");

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping sync loop");
                    break;
                }
                event = source.next() => event,
            };

            match event {
                Some(event) => {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => {
                            info!(
                                path = %event.path.display(),
                                "Shutdown requested, abandoning change in progress"
                            );
                            break;
                        }
                        _ = self.process_event(&event) => {}
                    }
                }
                None => {
                    info!("Change source exhausted, stopping sync loop");
                    break;
                }
            }
        }

        info!(
            events = self.report.events_seen,
            uploaded = self.report.uploads_succeeded,
            failed = self.report.uploads_failed,
            unsupported = self.report.uploads_unsupported,
            reauthentications = self.report.reauthentications,
            "Sync loop stopped"
        );
        self.report.clone()
    }
}

fn log_outcome(entry: &SourceEntry, outcome: &UploadOutcome) {
    let local = entry.local_path().display();
    let remote = entry.remote_path();
    match outcome {
        UploadOutcome::Uploaded { status } => {
            info!(path = %local, remote = %remote, status, "Uploaded");
        }
        UploadOutcome::Unsupported => {
            warn!(path = %local, remote = %remote, "Large file uploading not implemented yet");
        }
        other => {
            error!(path = %local, remote = %remote, outcome = %other, "Upload failed");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
