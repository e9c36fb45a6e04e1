//! Tracked-library store: the user's books and reading progress.
//!
//! Reads are synchronous and never touch the network. Writes are optimistic
//! mutations keyed by book id. A bulk resync replaces the whole mapping, and
//! is skipped when the last successful one is younger than the freshness
//! window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use shelf_core::{
    Book, BookId, CacheError, ProgressUpdate, ReadingStatus, ShelfResult, TrackRequest, TrackedBook,
};
use shelf_storage::{CacheConfig, EntityCache, EntityFetcher};
use tokio::sync::watch;

use crate::api::ShelfApi;
use crate::mutator::OptimisticMutator;
use crate::refresh::SessionStatus;

/// Default freshness window for a full resync.
pub const LIBRARY_FRESHNESS: Duration = Duration::from_secs(5 * 60);

/// Refetches one library row for reconciliation. A 404 means the book is
/// no longer tracked.
struct TrackedBookFetcher {
    api: ShelfApi,
}

#[async_trait]
impl EntityFetcher<BookId, TrackedBook> for TrackedBookFetcher {
    async fn fetch(&self, key: &BookId) -> ShelfResult<Option<TrackedBook>> {
        self.api.fetch_tracked(*key).await
    }
}

#[derive(Debug, Default)]
struct SyncState {
    last_synced: Option<Instant>,
    failed: bool,
}

pub struct TrackedLibraryStore {
    api: ShelfApi,
    cache: Arc<EntityCache<BookId, TrackedBook>>,
    mutator: OptimisticMutator<BookId, TrackedBook>,
    freshness: Duration,
    sync: Mutex<SyncState>,
    session: watch::Receiver<SessionStatus>,
}

impl TrackedLibraryStore {
    pub fn new(
        api: ShelfApi,
        session: watch::Receiver<SessionStatus>,
        cache_config: CacheConfig,
        freshness: Duration,
    ) -> Self {
        let cache = Arc::new(EntityCache::new(cache_config));
        let fetcher = Arc::new(TrackedBookFetcher { api: api.clone() });
        let mutator = OptimisticMutator::new(cache.clone()).with_reconciler(fetcher);
        Self {
            api,
            cache,
            mutator,
            freshness,
            sync: Mutex::new(SyncState::default()),
            session,
        }
    }

    fn sync_state(&self) -> MutexGuard<'_, SyncState> {
        self.sync.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Once the session is gone, every read reports an empty library and
    /// whatever was cached is dropped.
    fn session_active(&self) -> bool {
        if *self.session.borrow() == SessionStatus::SignedOut {
            if !self.cache.is_empty() {
                tracing::info!("Session ended, clearing tracked library");
                self.clear();
            }
            return false;
        }
        true
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn is_tracked(&self, book_id: BookId) -> bool {
        self.session_active() && self.cache.contains(&book_id)
    }

    pub fn status_of(&self, book_id: BookId) -> Option<ReadingStatus> {
        self.get(book_id).map(|book| book.status)
    }

    pub fn get(&self, book_id: BookId) -> Option<TrackedBook> {
        if !self.session_active() {
            return None;
        }
        self.cache.get_data(&book_id)
    }

    pub fn snapshot(&self) -> HashMap<BookId, TrackedBook> {
        if !self.session_active() {
            return HashMap::new();
        }
        self.cache.snapshot()
    }

    pub fn len(&self) -> usize {
        if !self.session_active() {
            return 0;
        }
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the last resync failed and has not been retried since.
    pub fn last_resync_failed(&self) -> bool {
        self.sync_state().failed
    }

    pub fn is_fresh(&self) -> bool {
        self.sync_state()
            .last_synced
            .is_some_and(|at| at.elapsed() <= self.freshness)
    }

    // ------------------------------------------------------------------------
    // Resync
    // ------------------------------------------------------------------------

    /// Replace the local mapping with the server's library.
    ///
    /// Served from memory if a resync completed within the freshness window
    /// and `force` is false. On failure the previous mapping stays. If a
    /// newer resync or clear landed while this one was in flight, its result
    /// is discarded and the current mapping is returned.
    pub async fn resync(&self, force: bool) -> ShelfResult<HashMap<BookId, TrackedBook>> {
        if !force && self.is_fresh() {
            return Ok(self.snapshot());
        }

        let pending = self.cache.open_fetch();
        let books = match self.api.fetch_library().await {
            Ok(books) => books,
            Err(e) => {
                self.sync_state().failed = true;
                tracing::warn!(error = %e, "Library resync failed, keeping last known state");
                return Err(e);
            }
        };

        match self
            .cache
            .replace_all(pending.ticket(), books.into_iter().map(|book| (book.book_id, book)))
        {
            Ok(count) => {
                let mut sync = self.sync_state();
                sync.last_synced = Some(Instant::now());
                sync.failed = false;
                tracing::info!(count, "Library resynced");
            }
            Err(CacheError::StaleReadIgnored { .. }) => {
                tracing::debug!(ticket = %pending.ticket(), "Library resync superseded by a newer one");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(self.snapshot())
    }

    /// The owning screen regained focus.
    pub async fn on_focus(&self) -> ShelfResult<HashMap<BookId, TrackedBook>> {
        let force = self.last_resync_failed();
        self.resync(force).await
    }

    /// The user signed in again.
    pub async fn on_reauthenticated(&self) -> ShelfResult<HashMap<BookId, TrackedBook>> {
        self.resync(true).await
    }

    pub fn clear(&self) {
        self.cache.clear();
        *self.sync_state() = SyncState::default();
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Start tracking `book`. A placeholder row is shown immediately and
    /// replaced by the server's row once it confirms.
    pub async fn track(&self, book: &Book, status: ReadingStatus) -> ShelfResult<TrackedBook> {
        let book_id = book.book_id;
        let placeholder = TrackedBook::placeholder(book, status);
        let request = TrackRequest { book_id, status };
        let api = &self.api;

        let committed = self
            .mutator
            .mutate_slot(
                book_id,
                |current| {
                    Ok(Some(match current {
                        Some(existing) => TrackedBook {
                            status,
                            ..existing.clone()
                        },
                        None => placeholder,
                    }))
                },
                || async move { api.track(&request).await },
                |optimistic, confirmed| Some(keep_known_total(confirmed, optimistic.as_ref())),
            )
            .await?;

        tracing::debug!(book_id = %book_id, status = %status, "Book tracked");
        committed.ok_or_else(|| {
            CacheError::EntityNotCached {
                key: book_id.to_string(),
            }
            .into()
        })
    }

    /// Stop tracking a book. The row disappears immediately and comes back
    /// if the server refuses.
    pub async fn untrack(&self, book_id: BookId) -> ShelfResult<()> {
        let api = &self.api;
        self.mutator
            .mutate_slot(
                book_id,
                |current| match current {
                    Some(_) => Ok(None),
                    None => Err(CacheError::EntityNotCached {
                        key: book_id.to_string(),
                    }
                    .into()),
                },
                || async move { api.untrack(book_id).await },
                |_, ()| None,
            )
            .await?;

        tracing::debug!(book_id = %book_id, "Book untracked");
        Ok(())
    }

    /// Merge partial progress into a tracked book.
    ///
    /// Advancing the chapter or volume stamps `last_read_at` if the caller
    /// did not. Reaching the last chapter marks the row completed locally;
    /// the row the server returns replaces the local one either way.
    pub async fn update_progress(
        &self,
        book_id: BookId,
        update: ProgressUpdate,
    ) -> ShelfResult<TrackedBook> {
        let mut update = update;
        if update.advances_position() && update.last_read_at.is_none() {
            update.last_read_at = Some(Utc::now());
        }
        let api = &self.api;
        let payload = update.clone();

        let committed = self
            .mutator
            .mutate_merge(
                book_id,
                |current| current.with_progress(&update),
                || async move { api.update_progress(book_id, &payload).await },
                |optimistic, confirmed| keep_known_total(confirmed, Some(&optimistic)),
            )
            .await?;

        if committed.status.is_completed() {
            tracing::debug!(book_id = %book_id, "Book completed");
        }
        Ok(committed)
    }

    /// Wait for background reconciliation of recent mutations.
    pub async fn settle(&self) {
        self.mutator.settle().await;
    }
}

/// The server row wins, except that a chapter total the server left out is
/// carried over from the local row.
fn keep_known_total(mut confirmed: TrackedBook, local: Option<&TrackedBook>) -> TrackedBook {
    if confirmed.total_chapters.is_none() {
        confirmed.total_chapters = local.and_then(|book| book.total_chapters);
    }
    confirmed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u64, total: Option<u32>) -> TrackedBook {
        TrackedBook {
            book_id: BookId::new(id),
            status: ReadingStatus::Reading,
            current_chapter: Some(3),
            current_volume: None,
            rating: None,
            last_read_at: None,
            total_chapters: total,
        }
    }

    #[test]
    fn test_server_total_wins_when_present() {
        let merged = keep_known_total(row(1, Some(20)), Some(&row(1, Some(10))));
        assert_eq!(merged.total_chapters, Some(20));
    }

    #[test]
    fn test_local_total_kept_when_server_omits_it() {
        let merged = keep_known_total(row(1, None), Some(&row(1, Some(10))));
        assert_eq!(merged.total_chapters, Some(10));
        assert_eq!(keep_known_total(row(1, None), None).total_chapters, None);
    }
}
