//! Keyed entity cache with read-through fetches.
//!
//! Values are held in memory behind a synchronous lock so that pure reads
//! (`get`, `contains`, `snapshot`) never suspend. Network fetches go through
//! [`FetchTicket`]s so that a result which arrives after a newer write is
//! discarded rather than applied.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use shelf_core::{CacheError, ShelfResult};

use super::entry::CacheEntry;
use super::freshness::{CacheRead, Freshness};
use super::ticket::FetchTicket;

/// Key types usable with [`EntityCache`]. `Display` is used in logs and
/// error messages.
pub trait CacheKey: Clone + Eq + Hash + Display + Send + Sync + 'static {}

impl<K> CacheKey for K where K: Clone + Eq + Hash + Display + Send + Sync + 'static {}

/// Configuration for an entity cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL stamped on every entry written by this cache.
    pub entry_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(300), // 5 minutes
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }
}

/// Fetches one entity from the server.
///
/// `Ok(None)` means the server does not have it (404); the cache drops its
/// local copy in that case.
#[async_trait]
pub trait EntityFetcher<K, T>: Send + Sync {
    async fn fetch(&self, key: &K) -> ShelfResult<Option<T>>;
}

struct Slot<T> {
    /// `None` is a tombstone: the key was removed locally or by the server.
    entry: Option<CacheEntry<T>>,
    /// Sequence number of the write that produced this slot.
    written: u64,
}

struct CacheState<K, T> {
    slots: HashMap<K, Slot<T>>,
    sequence: u64,
    last_bulk: u64,
    /// Tickets handed out whose result has not been applied yet.
    open: BTreeSet<u64>,
}

impl<K: CacheKey, T> CacheState<K, T> {
    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn newest_write(&self, key: &K) -> u64 {
        self.slots
            .get(key)
            .map(|slot| slot.written)
            .unwrap_or(0)
            .max(self.last_bulk)
    }

    /// A tombstone only matters to fetches that started before it.
    fn prune_tombstones(&mut self) {
        let oldest_open = self.open.first().copied();
        self.slots.retain(|_, slot| {
            slot.entry.is_some() || oldest_open.is_some_and(|ticket| ticket < slot.written)
        });
    }
}

/// A fetch in flight. Dropping it closes its ticket, whether or not a
/// result was applied.
pub struct PendingFetch<'a, K, T>
where
    K: CacheKey,
    T: Clone + Send + Sync + 'static,
{
    cache: &'a EntityCache<K, T>,
    ticket: FetchTicket,
}

impl<K, T> PendingFetch<'_, K, T>
where
    K: CacheKey,
    T: Clone + Send + Sync + 'static,
{
    pub fn ticket(&self) -> FetchTicket {
        self.ticket
    }
}

impl<K, T> Drop for PendingFetch<'_, K, T>
where
    K: CacheKey,
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.cache.close_fetch(self.ticket);
    }
}

/// Generic keyed store of `{data, fetched_at, ttl}` entries.
pub struct EntityCache<K, T> {
    state: RwLock<CacheState<K, T>>,
    config: CacheConfig,
}

impl<K, T> EntityCache<K, T>
where
    K: CacheKey,
    T: Clone + Send + Sync + 'static,
{
    /// Create a new entity cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: RwLock::new(CacheState {
                slots: HashMap::new(),
                sequence: 0,
                last_bulk: 0,
                open: BTreeSet::new(),
            }),
            config,
        }
    }

    /// Create a new entity cache with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // Entries are replaced wholesale under the write lock, so a poisoned
    // lock still guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, CacheState<K, T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState<K, T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Pure reads
    // ------------------------------------------------------------------------

    pub fn get(&self, key: &K) -> Option<CacheEntry<T>> {
        self.read().slots.get(key).and_then(|slot| slot.entry.clone())
    }

    pub fn get_data(&self, key: &K) -> Option<T> {
        self.get(key).map(CacheEntry::into_data)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.read()
            .slots
            .get(key)
            .is_some_and(|slot| slot.entry.is_some())
    }

    /// Missing entries count as stale.
    pub fn is_stale(&self, key: &K) -> bool {
        self.get(key).map_or(true, |entry| entry.is_stale())
    }

    pub fn len(&self) -> usize {
        self.read()
            .slots
            .values()
            .filter(|slot| slot.entry.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<K> {
        self.read()
            .slots
            .iter()
            .filter(|(_, slot)| slot.entry.is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Copy of every live value.
    pub fn snapshot(&self) -> HashMap<K, T> {
        self.read()
            .slots
            .iter()
            .filter_map(|(key, slot)| {
                slot.entry
                    .as_ref()
                    .map(|entry| (key.clone(), entry.data().clone()))
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Local writes
    // ------------------------------------------------------------------------

    /// Write a value fetched or produced now. Returns the stored entry.
    pub fn set(&self, key: K, data: T) -> CacheEntry<T> {
        let entry = CacheEntry::new(data, self.config.entry_ttl);
        self.put_slot(key, Some(entry.clone()));
        entry
    }

    /// Put back an entry exactly as it was (or its absence). Used to roll
    /// back optimistic writes.
    pub fn restore(&self, key: K, entry: Option<CacheEntry<T>>) {
        self.put_slot(key, entry);
    }

    /// Remove a key. Returns the entry that was removed.
    pub fn invalidate(&self, key: &K) -> Option<CacheEntry<T>> {
        self.put_slot(key.clone(), None)
    }

    fn put_slot(&self, key: K, entry: Option<CacheEntry<T>>) -> Option<CacheEntry<T>> {
        let mut state = self.write();
        let written = state.next_sequence();
        if entry.is_none() && state.open.is_empty() {
            // No fetch in flight could resurrect the key.
            return state.slots.remove(&key).and_then(|slot| slot.entry);
        }
        state
            .slots
            .insert(key, Slot { entry, written })
            .and_then(|slot| slot.entry)
    }

    /// Drop every entry. Fetches started before the clear are discarded when
    /// they complete.
    pub fn clear(&self) {
        let mut state = self.write();
        let sequence = state.next_sequence();
        state.slots.clear();
        state.last_bulk = sequence;
    }

    // ------------------------------------------------------------------------
    // Fetch application
    // ------------------------------------------------------------------------

    /// Take a ticket before issuing a fetch. The ticket stays open until a
    /// result is applied with it or [`close_fetch`](Self::close_fetch) is
    /// called.
    pub fn begin_fetch(&self) -> FetchTicket {
        let mut state = self.write();
        let sequence = state.next_sequence();
        state.open.insert(sequence);
        FetchTicket::new(sequence)
    }

    /// Like [`begin_fetch`](Self::begin_fetch), closing the ticket when the
    /// returned guard is dropped.
    pub fn open_fetch(&self) -> PendingFetch<'_, K, T> {
        PendingFetch {
            cache: self,
            ticket: self.begin_fetch(),
        }
    }

    /// Give up on a fetch without applying a result. Closing a ticket twice
    /// is harmless.
    pub fn close_fetch(&self, ticket: FetchTicket) {
        let mut state = self.write();
        if state.open.remove(&ticket.sequence()) {
            state.prune_tombstones();
        }
    }

    /// Number of tickets whose fetch has not finished.
    pub fn open_fetches(&self) -> usize {
        self.read().open.len()
    }

    /// Apply the result of a single-entity fetch.
    ///
    /// Fails with `StaleReadIgnored` if the key (or the whole cache) was
    /// written after `ticket` was taken.
    pub fn apply_fetch(
        &self,
        ticket: FetchTicket,
        key: K,
        data: Option<T>,
    ) -> Result<Option<CacheEntry<T>>, CacheError> {
        let mut state = self.write();
        state.open.remove(&ticket.sequence());
        let newest = state.newest_write(&key);
        let applied = if ticket.is_superseded_by(newest) {
            tracing::debug!(key = %key, %ticket, newer = newest, "Discarding stale fetch result");
            Err(CacheError::StaleReadIgnored {
                key: key.to_string(),
                ticket: ticket.sequence(),
                newer: newest,
            })
        } else {
            let entry = data.map(|data| CacheEntry::new(data, self.config.entry_ttl));
            state.slots.insert(
                key,
                Slot {
                    entry: entry.clone(),
                    written: ticket.sequence(),
                },
            );
            Ok(entry)
        };
        state.prune_tombstones();
        applied
    }

    /// Replace the whole mapping with the result of a bulk fetch.
    ///
    /// Keys the server did not report are dropped. Keys written locally
    /// after `ticket` was taken keep their local state (including local
    /// removals), since they reflect newer intent than the fetch. Returns
    /// the number of live entries after the replace.
    pub fn replace_all<I>(&self, ticket: FetchTicket, entries: I) -> Result<usize, CacheError>
    where
        I: IntoIterator<Item = (K, T)>,
    {
        let mut state = self.write();
        if state.open.remove(&ticket.sequence()) {
            state.prune_tombstones();
        }
        if ticket.is_superseded_by(state.last_bulk) {
            tracing::debug!(%ticket, newer = state.last_bulk, "Discarding stale bulk fetch");
            return Err(CacheError::StaleReadIgnored {
                key: "*".to_string(),
                ticket: ticket.sequence(),
                newer: state.last_bulk,
            });
        }

        let fetched_at = Utc::now();
        let ttl = self.config.entry_ttl;
        let mut slots: HashMap<K, Slot<T>> = std::mem::take(&mut state.slots)
            .into_iter()
            .filter(|(_, slot)| ticket.is_superseded_by(slot.written))
            .collect();
        for (key, data) in entries {
            slots.entry(key).or_insert_with(|| Slot {
                entry: Some(CacheEntry::with_fetched_at(data, fetched_at, ttl)),
                written: ticket.sequence(),
            });
        }

        let live = slots.values().filter(|slot| slot.entry.is_some()).count();
        state.slots = slots;
        state.last_bulk = ticket.sequence();
        state.prune_tombstones();
        Ok(live)
    }

    // ------------------------------------------------------------------------
    // Read-through
    // ------------------------------------------------------------------------

    /// Get an entity from the cache, falling back to the server when the
    /// cached copy does not satisfy `freshness`.
    ///
    /// Returns `Ok(None)` if the server does not have the entity.
    pub async fn get_or_fetch<F>(
        &self,
        key: &K,
        freshness: Freshness,
        fetcher: &F,
    ) -> ShelfResult<Option<CacheRead<T>>>
    where
        F: EntityFetcher<K, T> + ?Sized,
    {
        if freshness.is_refetch() {
            return self.refetch(key, fetcher).await;
        }
        if let Some(entry) = self.get(key) {
            if freshness.accepts(entry.age(), entry.ttl()) {
                return Ok(Some(CacheRead::from_cache(
                    entry.data().clone(),
                    entry.fetched_at(),
                )));
            }
        }
        self.refetch(key, fetcher).await
    }

    /// Fetch unconditionally and apply the result.
    ///
    /// If a newer write landed while the fetch was in flight, the fetched
    /// value is discarded and the current cached value is returned.
    pub async fn refetch<F>(&self, key: &K, fetcher: &F) -> ShelfResult<Option<CacheRead<T>>>
    where
        F: EntityFetcher<K, T> + ?Sized,
    {
        let pending = self.open_fetch();
        let fetched = fetcher.fetch(key).await?;
        match self.apply_fetch(pending.ticket(), key.clone(), fetched) {
            Ok(entry) => Ok(entry.map(|entry| {
                let fetched_at = entry.fetched_at();
                CacheRead::from_server(entry.into_data(), fetched_at)
            })),
            Err(CacheError::StaleReadIgnored { .. }) => Ok(self.get(key).map(|entry| {
                let fetched_at = entry.fetched_at();
                CacheRead::from_cache(entry.into_data(), fetched_at)
            })),
            Err(e) => Err(e.into()),
        }
    }
}

impl<K, T> Default for EntityCache<K, T>
where
    K: CacheKey,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::with_defaults()
    }
}
