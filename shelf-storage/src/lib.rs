//! Shelf Storage - Local State
//!
//! The in-memory entity cache the client reads from synchronously, and the
//! credential stores the refresh coordinator persists tokens through.

pub mod cache;
pub mod credentials;

pub use cache::{
    CacheConfig, CacheEntry, CacheKey, CacheRead, EntityCache, EntityFetcher, FetchTicket,
    Freshness, PendingFetch,
};
pub use credentials::{FileCredentialStore, InMemoryCredentialStore};
