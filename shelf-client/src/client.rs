//! `ShelfClient`: wires transport, credentials, refresh coordination and the
//! stores together.

use std::sync::Arc;

use shelf_core::{CredentialStore, Credentials, ShelfResult, Transport};
use shelf_storage::{CacheConfig, FileCredentialStore};

use crate::api::ShelfApi;
use crate::config::ClientConfig;
use crate::gateway::RequestGateway;
use crate::library::TrackedLibraryStore;
use crate::refresh::{HttpRenewer, RefreshCoordinator, SessionStatus};
use crate::social::SocialStore;
use crate::transport::ReqwestTransport;

pub struct ShelfClient {
    coordinator: Arc<RefreshCoordinator>,
    api: ShelfApi,
    library: TrackedLibraryStore,
    social: SocialStore,
}

impl ShelfClient {
    /// Build a client over HTTP with tokens persisted at
    /// `config.credentials_path`, and restore any saved session.
    pub async fn connect(config: &ClientConfig) -> ShelfResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(config)?);
        let store = Arc::new(FileCredentialStore::new(&config.credentials_path));
        let client = Self::with_parts(config, transport, store);
        let status = client.coordinator.restore_session().await?;
        tracing::debug!(?status, "Session restored");
        Ok(client)
    }

    /// Build a client over explicit collaborators. The session starts
    /// signed out until [`restore_session`](Self::restore_session) or
    /// [`sign_in`](Self::sign_in).
    pub fn with_parts(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let renewer = Arc::new(HttpRenewer::new(
            transport.clone(),
            config.renewal_path.clone(),
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(store, renewer));
        let gateway = Arc::new(RequestGateway::new(
            transport,
            coordinator.clone(),
            config.renewal_path.clone(),
        ));
        let api = ShelfApi::new(gateway);
        let cache_config = CacheConfig::new().with_ttl(config.entity_ttl());

        let library = TrackedLibraryStore::new(
            api.clone(),
            coordinator.subscribe(),
            cache_config.clone(),
            config.library_freshness(),
        );
        let social = SocialStore::new(api.clone(), coordinator.subscribe(), cache_config);

        Self {
            coordinator,
            api,
            library,
            social,
        }
    }

    pub fn library(&self) -> &TrackedLibraryStore {
        &self.library
    }

    pub fn social(&self) -> &SocialStore {
        &self.social
    }

    pub fn api(&self) -> &ShelfApi {
        &self.api
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn session_status(&self) -> SessionStatus {
        self.coordinator.session_status()
    }

    pub async fn restore_session(&self) -> ShelfResult<SessionStatus> {
        self.coordinator.restore_session().await
    }

    /// Persist a credential pair and load the library for it.
    pub async fn sign_in(&self, credentials: &Credentials) -> ShelfResult<()> {
        self.library.clear();
        self.social.clear();
        self.coordinator.sign_in(credentials).await?;
        self.library.on_reauthenticated().await?;
        Ok(())
    }

    pub async fn sign_out(&self) -> ShelfResult<()> {
        self.coordinator.sign_out().await?;
        self.library.clear();
        self.social.clear();
        Ok(())
    }

    /// Wait for every background reconciliation to finish.
    pub async fn settle(&self) {
        self.library.settle().await;
        self.social.settle().await;
    }
}
