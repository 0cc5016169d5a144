//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the values that flow between the watcher,
//! the uploader and the settings file. Each newtype ensures data validity at
//! construction time.

use std::fmt::{self, Display, Formatter};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Characters left untouched when encoding a remote path.
///
/// Everything except ASCII alphanumerics, the unreserved marks `-._~` and the
/// path separator is escaped.
const REMOTE_PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

// ============================================================================
// RemotePath
// ============================================================================

/// A path inside the user's drive, relative to the drive root
///
/// Stored with a leading `/`. Both `Documents/a.txt` and `/Documents/a.txt`
/// are accepted and normalize to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemotePath(String);

impl RemotePath {
    /// Create a new RemotePath
    ///
    /// # Errors
    /// Returns error if the path is empty, names the drive root itself,
    /// contains empty segments or `..` traversal
    pub fn new(path: impl Into<String>) -> Result<Self, DomainError> {
        let path = path.into();
        let trimmed = path.trim_start_matches('/');

        if trimmed.is_empty() {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path must name a file below the drive root: {path:?}"
            )));
        }

        if trimmed.split('/').any(|segment| segment.is_empty()) {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path contains empty segments: {path}"
            )));
        }

        if trimmed.split('/').any(|segment| segment == "..") {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path contains invalid traversal: {path}"
            )));
        }

        Ok(Self(format!("/{trimmed}")))
    }

    /// Get the inner string reference (always starts with `/`)
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Percent-encoded form without the leading `/`, ready to be spliced into
    /// a `root:/{path}:` item address
    #[must_use]
    pub fn encoded(&self) -> String {
        utf8_percent_encode(&self.0[1..], REMOTE_PATH_ENCODE_SET).to_string()
    }

    /// Get the file name component
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl Display for RemotePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RemotePath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_path_normalizes_leading_slash() {
        let a = RemotePath::new("Documents/todo.md").unwrap();
        let b = RemotePath::new("/Documents/todo.md").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "/Documents/todo.md");
    }

    #[test]
    fn test_remote_path_rejects_root() {
        assert!(RemotePath::new("").is_err());
        assert!(RemotePath::new("/").is_err());
        assert!(RemotePath::new("///").is_err());
    }

    #[test]
    fn test_remote_path_rejects_double_slash() {
        let err = RemotePath::new("/Documents//todo.md").unwrap_err();
        assert!(matches!(err, DomainError::InvalidRemotePath(_)));
    }

    #[test]
    fn test_remote_path_rejects_traversal() {
        assert!(RemotePath::new("/Documents/../secret").is_err());
        // Dots inside a name are fine
        assert!(RemotePath::new("/Documents/a..b.txt").is_ok());
    }

    #[test]
    fn test_encoded_keeps_separators_and_unreserved() {
        let path = RemotePath::new("/Backups/my-notes_v1.2~old.md").unwrap();
        assert_eq!(path.encoded(), "Backups/my-notes_v1.2~old.md");
    }

    #[test]
    fn test_encoded_escapes_spaces_and_reserved() {
        let path = RemotePath::new("/My Documents/a&b #1.txt").unwrap();
        assert_eq!(path.encoded(), "My%20Documents/a%26b%20%231.txt");
    }

    #[test]
    fn test_encoded_escapes_non_ascii() {
        let path = RemotePath::new("/Notas/café.md").unwrap();
        assert_eq!(path.encoded(), "Notas/caf%C3%A9.md");
    }

    #[test]
    fn test_file_name() {
        let path = RemotePath::new("/Documents/Projects/report.pdf").unwrap();
        assert_eq!(path.file_name(), "report.pdf");
        let path = RemotePath::new("readme.md").unwrap();
        assert_eq!(path.file_name(), "readme.md");
    }

    #[test]
    fn test_serde_roundtrip_validates() {
        let path: RemotePath = serde_json::from_str(r#""Documents/a.txt""#).unwrap();
        assert_eq!(path.as_str(), "/Documents/a.txt");
        let bad: Result<RemotePath, _> = serde_json::from_str(r#""/""#);
        assert!(bad.is_err());
    }
}
