//! Single-flight renewal of the access credential.
//!
//! The coordinator is a two-state machine (`Idle`, `Refreshing`). The first
//! request to observe a rejected access credential becomes the leader and
//! performs the renewal; every request that observes the rejection while
//! the leader is running is parked in the waiter queue and released with
//! the leader's outcome. The state flag and the queue live under one lock,
//! so two requests can never both decide to lead.
//!
//! Each completed renewal episode bumps a generation counter. Requests
//! remember the generation of the token they sent; a rejection reported
//! against an older generation is answered with the current token instead
//! of starting another renewal.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use shelf_core::{
    ApiRequest, AuthError, CredentialStore, Credentials, ShelfError, ShelfResult, TokenKind,
    Transport, TransportError,
};
use tokio::sync::{oneshot, watch};

use crate::gateway::body_text;

/// Whether the user currently holds a usable session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Authenticated,
    SignedOut,
}

/// Exchanges a refresh credential for a new credential pair.
#[async_trait]
pub trait Renewer: Send + Sync {
    async fn renew(&self, refresh: &SecretString) -> ShelfResult<Credentials>;
}

/// Calls the renewal endpoint directly on the transport. It never goes
/// through the gateway, so a rejected renewal cannot trigger another one.
pub struct HttpRenewer {
    transport: Arc<dyn Transport>,
    renewal_path: String,
}

#[derive(Deserialize)]
struct RenewalResponse {
    access_token: String,
    refresh_token: String,
}

impl HttpRenewer {
    pub fn new(transport: Arc<dyn Transport>, renewal_path: impl Into<String>) -> Self {
        Self {
            transport,
            renewal_path: renewal_path.into(),
        }
    }
}

#[async_trait]
impl Renewer for HttpRenewer {
    async fn renew(&self, refresh: &SecretString) -> ShelfResult<Credentials> {
        let request = ApiRequest::post(self.renewal_path.as_str())
            .with_body(json!({ "refresh_token": refresh.expose_secret() }));
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(TransportError::Status {
                path: self.renewal_path.clone(),
                status: response.status,
                body: body_text(&response.body),
            }
            .into());
        }
        let renewed: RenewalResponse =
            serde_json::from_value(response.body).map_err(|e| TransportError::Decode {
                path: self.renewal_path.clone(),
                reason: e.to_string(),
            })?;
        Ok(Credentials::new(renewed.access_token, renewed.refresh_token))
    }
}

type RenewalOutcome = ShelfResult<SecretString>;

enum RefreshState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RenewalOutcome>>,
    },
}

struct Inner {
    state: RefreshState,
    generation: u64,
    renewals: u64,
}

/// The access token to send, tagged with the renewal generation it belongs
/// to.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub token: Option<SecretString>,
    pub generation: u64,
}

enum Role {
    Leader,
    Waiter(oneshot::Receiver<RenewalOutcome>),
    Replaced,
}

pub struct RefreshCoordinator {
    store: Arc<dyn CredentialStore>,
    renewer: Arc<dyn Renewer>,
    inner: Mutex<Inner>,
    session: watch::Sender<SessionStatus>,
}

impl RefreshCoordinator {
    /// Starts out `SignedOut` until [`restore_session`](Self::restore_session)
    /// or [`sign_in`](Self::sign_in) says otherwise.
    pub fn new(store: Arc<dyn CredentialStore>, renewer: Arc<dyn Renewer>) -> Self {
        let (session, _) = watch::channel(SessionStatus::SignedOut);
        Self {
            store,
            renewer,
            inner: Mutex::new(Inner {
                state: RefreshState::Idle,
                generation: 0,
                renewals: 0,
            }),
            session,
        }
    }

    // Never held across an await.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------------

    pub fn session_status(&self) -> SessionStatus {
        *self.session.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.session.subscribe()
    }

    /// Derive the session status from whatever the store holds.
    pub async fn restore_session(&self) -> ShelfResult<SessionStatus> {
        let status = match self.store.get(TokenKind::Refresh).await? {
            Some(_) => SessionStatus::Authenticated,
            None => SessionStatus::SignedOut,
        };
        self.session.send_replace(status);
        Ok(status)
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> ShelfResult<()> {
        self.store.set(credentials).await?;
        self.lock().generation += 1;
        self.session.send_replace(SessionStatus::Authenticated);
        tracing::info!("Signed in");
        Ok(())
    }

    pub async fn sign_out(&self) -> ShelfResult<()> {
        self.store.clear().await?;
        self.lock().generation += 1;
        self.session.send_replace(SessionStatus::SignedOut);
        tracing::info!("Signed out");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub fn is_refreshing(&self) -> bool {
        matches!(self.lock().state, RefreshState::Refreshing { .. })
    }

    /// Number of callers parked behind the running renewal.
    pub fn waiter_count(&self) -> usize {
        match &self.lock().state {
            RefreshState::Refreshing { waiters } => waiters.len(),
            RefreshState::Idle => 0,
        }
    }

    /// Number of renewal exchanges started since construction.
    pub fn renewal_count(&self) -> u64 {
        self.lock().renewals
    }

    // ------------------------------------------------------------------------
    // Renewal protocol
    // ------------------------------------------------------------------------

    pub async fn access_grant(&self) -> ShelfResult<AccessGrant> {
        let generation = self.lock().generation;
        let token = self.store.get(TokenKind::Access).await?;
        Ok(AccessGrant { token, generation })
    }

    /// Called when a request sent with a token of `rejected_generation` came
    /// back unauthorized. Resolves to the token to retry with.
    pub async fn recover(&self, rejected_generation: u64) -> RenewalOutcome {
        let role = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            if inner.generation != rejected_generation {
                Role::Replaced
            } else {
                match &mut inner.state {
                    RefreshState::Refreshing { waiters } => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push(tx);
                        Role::Waiter(rx)
                    }
                    RefreshState::Idle => {
                        inner.state = RefreshState::Refreshing {
                            waiters: Vec::new(),
                        };
                        inner.renewals += 1;
                        Role::Leader
                    }
                }
            }
        };

        match role {
            Role::Leader => self.lead_renewal().await,
            Role::Waiter(rx) => {
                tracing::debug!("Renewal already in flight, waiting for it");
                rx.await
                    .unwrap_or_else(|_| Err(AuthError::CredentialExpired.into()))
            }
            Role::Replaced => {
                tracing::debug!(
                    generation = rejected_generation,
                    "Rejected credential already replaced, retrying with current one"
                );
                self.store
                    .get(TokenKind::Access)
                    .await?
                    .ok_or_else(|| AuthError::NotSignedIn.into())
            }
        }
    }

    async fn lead_renewal(&self) -> RenewalOutcome {
        let guard = RenewalGuard {
            coordinator: self,
            finished: false,
        };
        tracing::info!("Access credential expired, renewing");

        let outcome = match self.renew_and_persist().await {
            Ok(token) => {
                tracing::info!("Access credential renewed");
                Ok(token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Credential renewal failed, clearing session");
                if let Err(clear_err) = self.store.clear().await {
                    tracing::warn!(error = %clear_err, "Failed to clear credentials");
                }
                Err(match e {
                    ShelfError::Auth(AuthError::SessionInvalid { .. }) => e,
                    other => AuthError::SessionInvalid {
                        reason: other.to_string(),
                    }
                    .into(),
                })
            }
        };

        guard.finish(&outcome);
        outcome
    }

    async fn renew_and_persist(&self) -> RenewalOutcome {
        let refresh = self
            .store
            .get(TokenKind::Refresh)
            .await?
            .ok_or(AuthError::NotSignedIn)?;
        let credentials = self.renewer.renew(&refresh).await?;
        self.store.set(&credentials).await?;
        Ok(credentials.access().clone())
    }

    fn complete(&self, outcome: &RenewalOutcome) {
        let waiters = {
            let mut inner = self.lock();
            inner.generation += 1;
            take_waiters(&mut inner)
        };
        if outcome.is_err() {
            self.session.send_replace(SessionStatus::SignedOut);
        }
        tracing::debug!(waiters = waiters.len(), "Releasing renewal waiters");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// The leader went away mid-renewal. Nothing was learned about the
    /// session, so credentials stay and the next rejection starts over.
    fn abandon(&self) {
        let waiters = take_waiters(&mut self.lock());
        tracing::warn!(
            waiters = waiters.len(),
            "Credential renewal abandoned before completion"
        );
        for waiter in waiters {
            let _ = waiter.send(Err(AuthError::CredentialExpired.into()));
        }
    }
}

fn take_waiters(inner: &mut Inner) -> Vec<oneshot::Sender<RenewalOutcome>> {
    match std::mem::replace(&mut inner.state, RefreshState::Idle) {
        RefreshState::Refreshing { waiters } => waiters,
        RefreshState::Idle => Vec::new(),
    }
}

struct RenewalGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    finished: bool,
}

impl RenewalGuard<'_> {
    fn finish(mut self, outcome: &RenewalOutcome) {
        self.finished = true;
        self.coordinator.complete(outcome);
    }
}

impl Drop for RenewalGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.coordinator.abandon();
        }
    }
}
