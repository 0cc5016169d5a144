//! Watched sources
//!
//! A [`SourceEntry`] maps one local file to its destination in the drive.
//! [`SourceSet`] is the immutable lookup table built from the settings file
//! and consulted by the sync loop for every change event.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use super::errors::DomainError;
use super::newtypes::RemotePath;

/// One configured local file and where it goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    local_path: PathBuf,
    remote_path: RemotePath,
    is_small: bool,
}

impl SourceEntry {
    /// Creates a new entry
    ///
    /// # Errors
    /// Returns error if `local_path` is not absolute
    pub fn new(
        local_path: PathBuf,
        remote_path: RemotePath,
        is_small: bool,
    ) -> Result<Self, DomainError> {
        if !local_path.is_absolute() {
            return Err(DomainError::InvalidPath(format!(
                "Source path must be absolute: {}",
                local_path.display()
            )));
        }

        Ok(Self {
            local_path,
            remote_path,
            is_small,
        })
    }

    /// Absolute local path being watched
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Destination inside the drive
    pub fn remote_path(&self) -> &RemotePath {
        &self.remote_path
    }

    /// Whether the file qualifies for single-request upload
    pub fn is_small(&self) -> bool {
        self.is_small
    }
}

/// Immutable set of sources keyed by absolute local path
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    entries: BTreeMap<PathBuf, SourceEntry>,
}

impl SourceSet {
    /// Builds the set, rejecting duplicate local paths
    ///
    /// # Errors
    /// Returns error if two entries resolve to the same local path
    pub fn new(entries: impl IntoIterator<Item = SourceEntry>) -> Result<Self, DomainError> {
        let mut map = BTreeMap::new();
        for entry in entries {
            let key = entry.local_path.clone();
            if map.insert(key, entry).is_some() {
                return Err(DomainError::ValidationFailed(
                    "Two sources resolve to the same local path".to_string(),
                ));
            }
        }
        Ok(Self { entries: map })
    }

    /// Looks up the entry for an event path
    pub fn get(&self, path: &Path) -> Option<&SourceEntry> {
        self.entries.get(path)
    }

    /// Local paths in a stable order
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    /// All entries in a stable order
    pub fn iter(&self) -> impl Iterator<Item = &SourceEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves a configured local path against `base_dir`
///
/// Relative paths are joined onto `base_dir`; `.` and `..` components are
/// folded lexically so the result matches the paths reported by the OS
/// watcher. Symlinks are not followed.
pub fn resolve_local_path(base_dir: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };

    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}
