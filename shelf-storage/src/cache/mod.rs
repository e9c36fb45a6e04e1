//! Entity cache with explicit freshness and stale-read rejection.
//!
//! Cached values carry the moment they were fetched and a TTL. Callers state
//! their staleness tolerance via [`Freshness`], and read-through reads return
//! [`CacheRead<T>`] which says whether the value came from memory or the
//! server.
//!
//! # Ordering
//!
//! Every fetch takes a [`FetchTicket`] before it goes to the network. A
//! result is only applied if nothing newer has been written for that key, so
//! a slow response can never overwrite an optimistic write or the result of
//! a later fetch.
//!
//! # Example
//!
//! ```ignore
//! let read = cache
//!     .get_or_fetch(&book_id, Freshness::best_effort(Duration::from_secs(60)), &fetcher)
//!     .await?;
//!
//! if let Some(read) = read {
//!     if read.was_cache_miss() {
//!         tracing::debug!(fetched_at = %read.cached_at(), "Loaded from server");
//!     }
//! }
//! ```

pub mod entity_cache;
pub mod entry;
pub mod freshness;
pub mod ticket;

pub use entity_cache::{CacheConfig, CacheKey, EntityCache, EntityFetcher, PendingFetch};
pub use entry::CacheEntry;
pub use freshness::{CacheRead, Freshness};
pub use ticket::FetchTicket;
