//! Integration tests for pushdrive-graph
//!
//! Uses wiremock to simulate the Microsoft Graph API and the identity
//! platform, and verifies end-to-end behavior of the GraphClient, the
//! uploader and the authenticator.

mod common;

mod test_auth;
mod test_upload;
mod test_user_info;
