//! Identity gate: credential to owner resolution.
//!
//! The record store never takes a bare owner id string. Every owner-scoped
//! call takes an [`Owner`], and an `Owner` can only be built inside this
//! crate after a gate has verified a credential and the account behind it
//! has been looked up. See [`crate::service::VaultService::authenticate`].

use crate::error::IdentityError;

/// Resolves a request credential to the email of a verified caller.
///
/// Implementations do the actual credential checking (token signatures,
/// sessions); the core only consumes the result.
#[async_trait::async_trait]
pub trait IdentityGate: Send + Sync {
    /// Verify `credential` and return the caller's email.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] if the credential is missing, invalid or
    /// expired.
    async fn resolve(&self, credential: &str) -> Result<String, IdentityError>;
}

/// A verified account identity that scopes record store calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    id: String,
}

impl Owner {
    pub(crate) fn new(id: String) -> Self {
        Self { id }
    }

    /// The owning account's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}
