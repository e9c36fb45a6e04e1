//! Freshness contracts for cache reads.
//!
//! Callers state how stale a value they are willing to show, and reads
//! return [`CacheRead<T>`] which says where the value came from.

use shelf_core::Timestamp;
use std::time::Duration;

/// Freshness requirement for read-through cache reads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Use the cached value while it is within its own TTL.
    #[default]
    WithinTtl,

    /// Accept cached data up to the specified age, regardless of TTL.
    BestEffort {
        /// Maximum acceptable staleness for cached data.
        max_staleness: Duration,
    },

    /// Always go to the server. Used for reconciliation after a mutation.
    Refetch,
}

impl Freshness {
    /// Create a BestEffort freshness with the given max staleness.
    pub fn best_effort(max_staleness: Duration) -> Self {
        Self::BestEffort { max_staleness }
    }

    /// Whether a cached value of the given age and TTL satisfies this
    /// requirement.
    pub fn accepts(&self, age: Duration, ttl: Duration) -> bool {
        match self {
            Self::WithinTtl => age <= ttl,
            Self::BestEffort { max_staleness } => age <= *max_staleness,
            Self::Refetch => false,
        }
    }

    pub fn is_refetch(&self) -> bool {
        matches!(self, Self::Refetch)
    }
}

/// Result of a cache read, with its fetch time.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    /// The cached value.
    value: T,
    /// When this value was fetched from the server.
    cached_at: Timestamp,
    /// Whether this was a cache hit or miss.
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// Create a new cache read from a cache hit.
    pub fn from_cache(value: T, cached_at: Timestamp) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: true,
        }
    }

    /// Create a new cache read from a server fetch (cache miss).
    pub fn from_server(value: T, cached_at: Timestamp) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: false,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Get a reference to the underlying value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Get when this value was fetched.
    pub fn cached_at(&self) -> Timestamp {
        self.cached_at
    }

    /// Check if this was a cache hit.
    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    /// Check if this was a cache miss (fetched from the server).
    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            was_cache_hit: self.was_cache_hit,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
