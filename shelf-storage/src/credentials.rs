//! Credential store implementations.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use shelf_core::{CacheError, CredentialStore, Credentials, ShelfResult, TokenKind};
use tokio::sync::RwLock;

/// Keeps the token pair in memory only. Used in tests and for sessions that
/// should not outlive the process.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<Option<Credentials>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start out signed in.
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            inner: RwLock::new(Some(credentials)),
        }
    }

    /// Current pair, if any.
    pub async fn current(&self) -> Option<Credentials> {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, kind: TokenKind) -> ShelfResult<Option<SecretString>> {
        Ok(self
            .inner
            .read()
            .await
            .as_ref()
            .map(|credentials| credentials.token(kind).clone()))
    }

    async fn set(&self, credentials: &Credentials) -> ShelfResult<()> {
        *self.inner.write().await = Some(credentials.clone());
        Ok(())
    }

    async fn clear(&self) -> ShelfResult<()> {
        *self.inner.write().await = None;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedCredentials {
    access_token: String,
    refresh_token: String,
}

/// Persists the token pair as a JSON file readable only by the owner.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: RwLock<()>,
}

fn persistence_error(path: &Path, err: impl std::fmt::Display) -> CacheError {
    CacheError::Persistence {
        reason: format!("{}: {}", path.display(), err),
    }
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Option<Credentials>, CacheError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(persistence_error(&self.path, e)),
        };
        let persisted: PersistedCredentials =
            serde_json::from_str(&contents).map_err(|e| persistence_error(&self.path, e))?;
        Ok(Some(Credentials::new(
            persisted.access_token,
            persisted.refresh_token,
        )))
    }

    async fn save(&self, credentials: &Credentials) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| persistence_error(parent, e))?;
            }
        }
        let persisted = PersistedCredentials {
            access_token: credentials.access().expose_secret().to_string(),
            refresh_token: credentials.refresh().expose_secret().to_string(),
        };
        let contents =
            serde_json::to_string_pretty(&persisted).map_err(|e| persistence_error(&self.path, e))?;
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| persistence_error(&self.path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| persistence_error(&self.path, e))?;
        }

        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, kind: TokenKind) -> ShelfResult<Option<SecretString>> {
        let _guard = self.lock.read().await;
        let credentials = self.load().await?;
        Ok(credentials.map(|credentials| credentials.token(kind).clone()))
    }

    async fn set(&self, credentials: &Credentials) -> ShelfResult<()> {
        let _guard = self.lock.write().await;
        self.save(credentials).await?;
        tracing::debug!(path = %self.path.display(), "Credentials persisted");
        Ok(())
    }

    async fn clear(&self) -> ShelfResult<()> {
        let _guard = self.lock.write().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(persistence_error(&self.path, e).into()),
        }
    }
}
