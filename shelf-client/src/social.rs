//! Social mutation sites: list like/save, follow, review like.
//!
//! Each is the same optimistic mutation: flip the viewer's flag, move the
//! public counter by one, and fold the counts the server answers with into
//! the committed entity.

use std::sync::Arc;

use async_trait::async_trait;
use shelf_core::{ListId, ListSummary, ReviewId, ReviewSummary, ShelfResult, UserId, UserProfile};
use shelf_storage::{CacheConfig, CacheRead, EntityCache, EntityFetcher, Freshness};
use tokio::sync::watch;

use crate::api::ShelfApi;
use crate::mutator::OptimisticMutator;
use crate::refresh::SessionStatus;

struct ListFetcher(ShelfApi);
struct UserFetcher(ShelfApi);
struct ReviewFetcher(ShelfApi);

#[async_trait]
impl EntityFetcher<ListId, ListSummary> for ListFetcher {
    async fn fetch(&self, key: &ListId) -> ShelfResult<Option<ListSummary>> {
        self.0.fetch_list(*key).await
    }
}

#[async_trait]
impl EntityFetcher<UserId, UserProfile> for UserFetcher {
    async fn fetch(&self, key: &UserId) -> ShelfResult<Option<UserProfile>> {
        self.0.fetch_user(*key).await
    }
}

#[async_trait]
impl EntityFetcher<ReviewId, ReviewSummary> for ReviewFetcher {
    async fn fetch(&self, key: &ReviewId) -> ShelfResult<Option<ReviewSummary>> {
        self.0.fetch_review(*key).await
    }
}

/// Read-through cache, fetcher and mutator for one entity kind.
struct Site<K: shelf_storage::CacheKey, T> {
    fetcher: Arc<dyn EntityFetcher<K, T>>,
    mutator: OptimisticMutator<K, T>,
}

impl<K, T> Site<K, T>
where
    K: shelf_storage::CacheKey,
    T: Clone + Send + Sync + 'static,
{
    fn new(config: &CacheConfig, fetcher: Arc<dyn EntityFetcher<K, T>>) -> Self {
        let cache = Arc::new(EntityCache::new(config.clone()));
        let mutator = OptimisticMutator::new(cache).with_reconciler(fetcher.clone());
        Self { fetcher, mutator }
    }

    fn cache(&self) -> &EntityCache<K, T> {
        self.mutator.cache()
    }

    async fn load(&self, key: K, freshness: Freshness) -> ShelfResult<Option<CacheRead<T>>> {
        self.cache()
            .get_or_fetch(&key, freshness, self.fetcher.as_ref())
            .await
    }
}

pub struct SocialStore {
    api: ShelfApi,
    lists: Site<ListId, ListSummary>,
    users: Site<UserId, UserProfile>,
    reviews: Site<ReviewId, ReviewSummary>,
    session: watch::Receiver<SessionStatus>,
}

impl SocialStore {
    pub fn new(api: ShelfApi, session: watch::Receiver<SessionStatus>, config: CacheConfig) -> Self {
        Self {
            lists: Site::new(&config, Arc::new(ListFetcher(api.clone()))),
            users: Site::new(&config, Arc::new(UserFetcher(api.clone()))),
            reviews: Site::new(&config, Arc::new(ReviewFetcher(api.clone()))),
            api,
            session,
        }
    }

    /// The viewer flags belong to the signed-in user; once the session is
    /// gone they are dropped and reads see nothing cached.
    fn session_active(&self) -> bool {
        if *self.session.borrow() == SessionStatus::SignedOut {
            if !self.is_empty() {
                tracing::info!("Session ended, clearing social caches");
                self.clear();
            }
            return false;
        }
        true
    }

    fn is_empty(&self) -> bool {
        self.lists.cache().is_empty() && self.users.cache().is_empty() && self.reviews.cache().is_empty()
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub async fn list(&self, list_id: ListId, freshness: Freshness) -> ShelfResult<Option<CacheRead<ListSummary>>> {
        self.session_active();
        self.lists.load(list_id, freshness).await
    }

    pub async fn user(&self, user_id: UserId, freshness: Freshness) -> ShelfResult<Option<CacheRead<UserProfile>>> {
        self.session_active();
        self.users.load(user_id, freshness).await
    }

    pub async fn review(
        &self,
        review_id: ReviewId,
        freshness: Freshness,
    ) -> ShelfResult<Option<CacheRead<ReviewSummary>>> {
        self.session_active();
        self.reviews.load(review_id, freshness).await
    }

    pub fn cached_list(&self, list_id: ListId) -> Option<ListSummary> {
        if !self.session_active() {
            return None;
        }
        self.lists.cache().get_data(&list_id)
    }

    pub fn cached_user(&self, user_id: UserId) -> Option<UserProfile> {
        if !self.session_active() {
            return None;
        }
        self.users.cache().get_data(&user_id)
    }

    pub fn cached_review(&self, review_id: ReviewId) -> Option<ReviewSummary> {
        if !self.session_active() {
            return None;
        }
        self.reviews.cache().get_data(&review_id)
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    pub async fn set_list_liked(&self, list_id: ListId, liked: bool) -> ShelfResult<ListSummary> {
        let api = &self.api;
        self.lists
            .mutator
            .mutate_merge(
                list_id,
                |list| list.with_liked(liked),
                || async move { api.set_list_liked(list_id, liked).await },
                |list, counts| list.with_counts(&counts),
            )
            .await
    }

    pub async fn set_list_saved(&self, list_id: ListId, saved: bool) -> ShelfResult<ListSummary> {
        let api = &self.api;
        self.lists
            .mutator
            .mutate_merge(
                list_id,
                |list| list.with_saved(saved),
                || async move { api.set_list_saved(list_id, saved).await },
                |list, counts| list.with_counts(&counts),
            )
            .await
    }

    pub async fn set_following(&self, user_id: UserId, following: bool) -> ShelfResult<UserProfile> {
        let api = &self.api;
        self.users
            .mutator
            .mutate_merge(
                user_id,
                |user| user.with_following(following),
                || async move { api.set_following(user_id, following).await },
                |user, counts| user.with_counts(&counts),
            )
            .await
    }

    pub async fn set_review_liked(&self, review_id: ReviewId, liked: bool) -> ShelfResult<ReviewSummary> {
        let api = &self.api;
        self.reviews
            .mutator
            .mutate_merge(
                review_id,
                |review| review.with_liked(liked),
                || async move { api.set_review_liked(review_id, liked).await },
                |review, counts| review.with_counts(&counts),
            )
            .await
    }

    /// Wait for background reconciliation of recent mutations.
    pub async fn settle(&self) {
        self.lists.mutator.settle().await;
        self.users.mutator.settle().await;
        self.reviews.mutator.settle().await;
    }

    pub fn clear(&self) {
        self.lists.cache().clear();
        self.users.cache().clear();
        self.reviews.cache().clear();
    }
}
