//! PushDrive Sync - one-way push synchronization
//!
//! Provides:
//! - Per-root filesystem watching with per-tick deduplication
//! - The event loop that uploads modified sources and recovers from
//!   expired tokens
//!
//! ## Modules
//!
//! - [`watcher`] - notify-backed watchers and the [`watcher::ChangeStream`]
//! - [`engine`] - The [`engine::SyncLoop`] and its per-event outcomes

pub mod engine;
pub mod watcher;

pub use engine::{SyncLoop, SyncReport, UploadOutcome};
pub use watcher::{ChangeEvent, ChangeKind, ChangeSource, ChangeStream, MultiRootWatcher};
