//! Cache entries: a value plus the moment it was fetched and how long it
//! stays usable.

use chrono::Utc;
use shelf_core::Timestamp;
use std::time::Duration;

/// A cached value. Entries are always replaced wholesale, never patched in
/// place, so a reader can never observe a half-applied update.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    data: T,
    fetched_at: Timestamp,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// Create an entry fetched now.
    pub fn new(data: T, ttl: Duration) -> Self {
        Self::with_fetched_at(data, Utc::now(), ttl)
    }

    /// Create an entry with an explicit fetch time.
    pub fn with_fetched_at(data: T, fetched_at: Timestamp, ttl: Duration) -> Self {
        Self {
            data,
            fetched_at,
            ttl,
        }
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Time elapsed since the fetch. Zero if the clock moved backwards.
    pub fn age_at(&self, now: Timestamp) -> Duration {
        now.signed_duration_since(self.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }

    /// `now - fetched_at > ttl`
    pub fn is_stale_at(&self, now: Timestamp) -> bool {
        self.age_at(now) > self.ttl
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    /// Map the inner value, keeping fetch metadata.
    pub fn map<U, F>(self, f: F) -> CacheEntry<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheEntry {
            data: f(self.data),
            fetched_at: self.fetched_at,
            ttl: self.ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_entry_is_not_stale() {
        let entry = CacheEntry::new("value", Duration::from_secs(60));
        assert!(!entry.is_stale());
        assert!(entry.age() < Duration::from_secs(5));
    }

    #[test]
    fn test_entry_is_stale_strictly_after_ttl() {
        let fetched_at = Utc::now();
        let entry = CacheEntry::with_fetched_at(1, fetched_at, Duration::from_secs(30));
        assert!(!entry.is_stale_at(fetched_at + chrono::Duration::seconds(30)));
        assert!(entry.is_stale_at(fetched_at + chrono::Duration::seconds(31)));
    }

    #[test]
    fn test_clock_skew_yields_zero_age() {
        let fetched_at = Utc::now();
        let entry = CacheEntry::with_fetched_at(1, fetched_at, Duration::ZERO);
        assert_eq!(
            entry.age_at(fetched_at - chrono::Duration::seconds(10)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_map_keeps_metadata() {
        let entry = CacheEntry::new(21, Duration::from_secs(5));
        let fetched_at = entry.fetched_at();
        let mapped = entry.map(|v| v * 2);
        assert_eq!(*mapped.data(), 42);
        assert_eq!(mapped.fetched_at(), fetched_at);
        assert_eq!(mapped.ttl(), Duration::from_secs(5));
    }
}
