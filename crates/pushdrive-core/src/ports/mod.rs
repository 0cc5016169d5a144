//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the sync loop depends on; their implementations
//! live in adapter crates (`pushdrive-graph`) or in test doubles.
//!
//! ## Ports Overview
//!
//! - [`IAuthenticator`] - Obtains access credentials
//! - [`IUploader`] - Sends a file's bytes to its remote destination

pub mod authenticator;
pub mod uploader;

pub use authenticator::IAuthenticator;
pub use uploader::{IUploader, UploadResponse, INVALID_AUTHENTICATION_TOKEN};
