//! Domain entities and business logic
//!
//! This module contains the core domain types for PushDrive:
//! - Newtypes for validated remote paths
//! - Watched source entries and their lookup table
//! - The access credential passed to uploads
//! - Domain-specific error types

pub mod credential;
pub mod errors;
pub mod newtypes;
pub mod source;

// Re-export commonly used types
pub use credential::Credential;
pub use errors::{AuthError, DomainError, UploadError};
pub use newtypes::RemotePath;
pub use source::{resolve_local_path, SourceEntry, SourceSet};
