//! Authentication port (driven/secondary port)
//!
//! The sync loop only needs "give me a working credential"; how the token is
//! obtained (cache, refresh, interactive device flow) is the adapter's
//! business.

use crate::domain::Credential;

/// Port trait for obtaining access credentials
///
/// Implementations own the token cache. Each call returns a credential that
/// is believed to be valid right now, prompting the user if nothing cached
/// can be reused. Failures carry an
/// [`AuthError`](crate::domain::AuthError) inside the `anyhow::Error`.
#[async_trait::async_trait]
pub trait IAuthenticator: Send + Sync {
    /// Obtains a credential, silently if possible
    async fn authenticate(&self) -> anyhow::Result<Credential>;

    /// Obtains a replacement for a credential the server just rejected
    ///
    /// Adapters that cache tokens should not hand `rejected` back out. The
    /// default simply authenticates again.
    async fn reauthenticate(&self, rejected: &Credential) -> anyhow::Result<Credential> {
        let _ = rejected;
        self.authenticate().await
    }
}
