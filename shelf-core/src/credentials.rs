//! Credential pair and the persistence interface it is stored through.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::ShelfResult;

/// Which of the two persisted secrets to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// An access/refresh token pair.
///
/// Both tokens are opaque to the client. They are wrapped in
/// `SecretString` so they never show up in `Debug` output or logs.
#[derive(Debug, Clone)]
pub struct Credentials {
    access: SecretString,
    refresh: SecretString,
}

impl Credentials {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: SecretString::from(access.into()),
            refresh: SecretString::from(refresh.into()),
        }
    }

    pub fn access(&self) -> &SecretString {
        &self.access
    }

    pub fn refresh(&self) -> &SecretString {
        &self.refresh
    }

    pub fn token(&self, kind: TokenKind) -> &SecretString {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.access.expose_secret() == other.access.expose_secret()
            && self.refresh.expose_secret() == other.refresh.expose_secret()
    }
}

impl Eq for Credentials {}

/// Persistent storage for exactly two named secrets.
///
/// Implementations must survive process restarts when used in production;
/// in-memory variants exist for tests.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read one token, or `None` when signed out.
    async fn get(&self, kind: TokenKind) -> ShelfResult<Option<SecretString>>;

    /// Replace both tokens.
    async fn set(&self, credentials: &Credentials) -> ShelfResult<()>;

    /// Remove both tokens.
    async fn clear(&self) -> ShelfResult<()>;
}
