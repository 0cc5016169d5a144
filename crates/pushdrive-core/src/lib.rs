//! PushDrive Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Settings** - `Settings` loaded from `settings.yml`
//! - **Domain types** - `SourceEntry`, `SourceSet`, `RemotePath`, `Credential`
//! - **Error taxonomy** - `AuthError`, `UploadError`, `DomainError`
//! - **Port definitions** - `IAuthenticator`, `IUploader`
//!
//! # Architecture
//!
//! The domain module holds plain data with validation and no I/O.
//! Ports define the trait interfaces that adapter crates implement and that
//! the sync loop in `pushdrive-sync` is written against.

pub mod config;
pub mod domain;
pub mod ports;
