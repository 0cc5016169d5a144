//! File watching and per-tick change collection
//!
//! Provides a [`RootWatcher`] per configured local path that wraps the
//! `notify` crate, a [`MultiRootWatcher`] that unions them, and the
//! [`ChangeStream`] the sync loop pulls events from.
//!
//! ## Architecture
//!
//! ```text
//! inotify / FSEvents (notify thread, one per root)
//!       │
//!       ▼
//!  RootWatcher  ──→  mpsc::channel  ──→  check() ──┐
//!  RootWatcher  ──→  mpsc::channel  ──→  check() ──┼─→ MultiRootWatcher ──→ ChangeStream
//!  ...                                             ┘
//! ```
//!
//! A file root is watched through its parent directory so that editors
//! saving by rename-over keep being observed; events for siblings are
//! dropped. Every path handed out is expressed in the configured form of
//! the root, so it can be looked up in the source table as is.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Capacity of the channel between a notify thread and its root watcher
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// ChangeEvent
// ============================================================================

/// What happened to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    /// Content or metadata changed, or the path was the target of a rename
    Modified,
    /// The path was created
    Added,
    /// The path was removed or renamed away
    Deleted,
}

/// A filesystem change detected by the watcher
///
/// These events are the internal representation used by the sync loop,
/// decoupled from the `notify` crate's raw event types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Modified, path)
    }
}

// ============================================================================
// Event mapping - notify::Event → ChangeEvent
// ============================================================================

/// Converts a `notify::Event` into zero or more `ChangeEvent`s
///
/// Maps the notify event kinds as follows:
/// - `Create(*)` -> `Added`
/// - `Modify(Name(Both))` with 2 paths -> `Deleted` (source) + `Modified` (destination)
/// - `Modify(Name(From))` -> `Deleted`
/// - `Modify(Name(To))` and every other `Modify(*)` -> `Modified`
/// - `Remove(*)` -> `Deleted`
///
/// Access events and events without paths produce nothing.
pub fn map_notify_event(event: &notify::Event) -> Vec<ChangeEvent> {
    let paths = &event.paths;
    let all = |kind: ChangeKind| -> Vec<ChangeEvent> {
        paths
            .iter()
            .map(|p| ChangeEvent::new(kind, p.clone()))
            .collect()
    };

    match &event.kind {
        EventKind::Create(_) => all(ChangeKind::Added),

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => {
            debug!(
                from = %paths[0].display(),
                to = %paths[1].display(),
                "Mapped rename event"
            );
            vec![
                ChangeEvent::new(ChangeKind::Deleted, paths[0].clone()),
                ChangeEvent::new(ChangeKind::Modified, paths[1].clone()),
            ]
        }

        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(ChangeKind::Deleted),

        EventKind::Modify(_) => all(ChangeKind::Modified),

        EventKind::Remove(_) => all(ChangeKind::Deleted),

        // Access events and unclassified kinds
        _ => {
            debug!(kind = ?event.kind, "Ignoring event kind");
            Vec::new()
        }
    }
}

// ============================================================================
// RootWatcher
// ============================================================================

/// Watches one configured root using the OS-native mechanism
///
/// On Linux this typically uses inotify. Raw events are mapped on the notify
/// thread and queued in a channel until [`RootWatcher::check`] drains them.
/// Dropping the watcher stops watching.
pub struct RootWatcher {
    /// Root exactly as configured
    root: PathBuf,
    /// Canonical form of the root, if it could be resolved at start
    canonical_root: Option<PathBuf>,
    /// Whether the root is a directory (watched recursively)
    is_dir: bool,
    /// Keeps the OS watch alive
    _watcher: RecommendedWatcher,
    event_rx: mpsc::Receiver<ChangeEvent>,
}

impl RootWatcher {
    /// Starts watching `root`
    ///
    /// A directory is watched recursively. Anything else is treated as a
    /// file and watched through its parent directory, non-recursively.
    ///
    /// # Errors
    /// Returns an error if the underlying OS watcher cannot be created or
    /// the watched directory does not exist
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let is_dir = root.is_dir();
        let (event_tx, event_rx) = mpsc::channel::<ChangeEvent>(EVENT_CHANNEL_CAPACITY);

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for change in map_notify_event(&event) {
                        if let Err(e) = event_tx.blocking_send(change) {
                            warn!(error = %e, "Failed to queue change event (receiver dropped)");
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        let (target, mode) = if is_dir {
            (root.clone(), RecursiveMode::Recursive)
        } else {
            let parent = match root.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            (parent, RecursiveMode::NonRecursive)
        };

        watcher
            .watch(&target, mode)
            .with_context(|| format!("Failed to watch path: {}", target.display()))?;

        info!(
            root = %root.display(),
            watched = %target.display(),
            recursive = is_dir,
            "Watching source"
        );

        let canonical_root = std::fs::canonicalize(&root).ok();
        Ok(Self {
            root,
            canonical_root,
            is_dir,
            _watcher: watcher,
            event_rx,
        })
    }

    /// Root exactly as configured
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drains queued events and returns those that concern this root
    ///
    /// Repeated events for the same path and kind collapse into one.
    pub fn check(&mut self) -> HashSet<ChangeEvent> {
        let mut seen = HashSet::new();
        while let Ok(event) = self.event_rx.try_recv() {
            if let Some(path) = self.to_configured(&event.path) {
                seen.insert(ChangeEvent::new(event.kind, path));
            }
        }
        seen
    }

    /// Re-expresses an event path in the configured form of the root
    ///
    /// Returns `None` for paths outside the root (siblings of a file root).
    fn to_configured(&self, path: &Path) -> Option<PathBuf> {
        let relative = path.strip_prefix(&self.root).ok().or_else(|| {
            self.canonical_root
                .as_deref()
                .and_then(|canonical| path.strip_prefix(canonical).ok())
        })?;

        if relative.as_os_str().is_empty() {
            return Some(self.root.clone());
        }
        if !self.is_dir {
            return None;
        }
        Some(self.root.join(relative))
    }
}

// ============================================================================
// MultiRootWatcher
// ============================================================================

/// Owns one [`RootWatcher`] per configured root
pub struct MultiRootWatcher {
    roots: Vec<RootWatcher>,
}

impl MultiRootWatcher {
    /// Starts a watcher for every root
    ///
    /// # Errors
    /// Fails on the first root that cannot be watched
    pub fn new<I, P>(roots: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let roots = roots
            .into_iter()
            .map(RootWatcher::new)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { roots })
    }

    /// Union of every root's changes since the last call
    pub fn check(&mut self) -> HashSet<ChangeEvent> {
        let mut union = HashSet::new();
        for root in &mut self.roots {
            union.extend(root.check());
        }
        union
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

// ============================================================================
// ChangeSource / ChangeStream
// ============================================================================

/// Pull-based source of change events consumed by the sync loop
#[async_trait]
pub trait ChangeSource: Send {
    /// Waits for the next event; `None` once the source is exhausted
    async fn next(&mut self) -> Option<ChangeEvent>;
}

/// Infinite event stream over a [`MultiRootWatcher`]
///
/// Polls the watcher once per tick. When a tick yields changes they are
/// buffered in a stable order and handed out one by one before the next
/// poll, so several writes to one file within a tick surface once.
pub struct ChangeStream {
    watcher: MultiRootWatcher,
    tick: Duration,
    buffer: VecDeque<ChangeEvent>,
}

impl ChangeStream {
    pub fn new(watcher: MultiRootWatcher, tick: Duration) -> Self {
        Self {
            watcher,
            tick,
            buffer: VecDeque::new(),
        }
    }

    /// Moves the next non-empty tick into the buffer
    async fn fill(&mut self) {
        loop {
            let batch = self.watcher.check();
            if !batch.is_empty() {
                let mut batch: Vec<_> = batch.into_iter().collect();
                batch.sort();
                debug!(count = batch.len(), "Collected change events");
                self.buffer.extend(batch);
                return;
            }
            tokio::time::sleep(self.tick).await;
        }
    }
}

#[async_trait]
impl ChangeSource for ChangeStream {
    async fn next(&mut self) -> Option<ChangeEvent> {
        if self.buffer.is_empty() {
            self.fill().await;
        }
        self.buffer.pop_front()
    }
}

// ============================================================================
// Unit tests
// ============================================================================
