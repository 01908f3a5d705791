//! Bearer credential sources.
//!
//! The engine never issues or refreshes credentials. It asks a
//! [`CredentialProvider`] before every remote call and treats `None` as
//! anonymous, local-only mode.

use parking_lot::RwLock;
use std::sync::Arc;

/// Supplies the opaque bearer credential for remote calls.
pub trait CredentialProvider: Send + Sync {
    /// Returns the current credential, or `None` when signed out.
    fn credential(&self) -> Option<String>;
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn credential(&self) -> Option<String> {
        self()
    }
}

/// A provider that never has a credential.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl CredentialProvider for Anonymous {
    fn credential(&self) -> Option<String> {
        None
    }
}

/// A fixed credential.
#[derive(Debug, Clone)]
pub struct StaticCredential(String);

impl StaticCredential {
    /// Creates a provider that always returns `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// A credential slot updated at sign-in and sign-out.
///
/// Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct SharedCredential {
    token: Arc<RwLock<Option<String>>>,
}

impl SharedCredential {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a credential.
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Forgets the credential.
    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl CredentialProvider for SharedCredential {
    fn credential(&self) -> Option<String> {
        self.token.read().clone()
    }
}
