//! Shelf Client - Consistency Layer
//!
//! Keeps local state correct while the access credential expires under
//! concurrent load and while user actions are shown before the server has
//! confirmed them:
//!
//! - [`RefreshCoordinator`]: single-flight credential renewal with a waiter
//!   queue.
//! - [`RequestGateway`]: attaches credentials and retries once after
//!   renewal.
//! - [`OptimisticMutator`]: apply, remember, call, commit or roll back,
//!   then reconcile in the background.
//! - [`TrackedLibraryStore`] and [`SocialStore`]: the domain instances.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod library;
pub mod mutator;
pub mod refresh;
pub mod social;
pub mod transport;

pub use api::ShelfApi;
pub use client::ShelfClient;
pub use config::{ClientConfig, ConfigError};
pub use error::AppError;
pub use gateway::{RequestGateway, ResponseClass};
pub use library::{TrackedLibraryStore, LIBRARY_FRESHNESS};
pub use mutator::OptimisticMutator;
pub use refresh::{AccessGrant, HttpRenewer, RefreshCoordinator, Renewer, SessionStatus};
pub use social::SocialStore;
pub use transport::ReqwestTransport;
