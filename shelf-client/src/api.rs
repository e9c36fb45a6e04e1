//! Typed REST endpoints used by the stores.

use std::sync::Arc;

use shelf_core::{
    BookId, FollowCounts, ListCounts, ListId, ListSummary, ProgressUpdate, ReviewCounts, ReviewId,
    ReviewSummary, ShelfResult, TrackRequest, TrackedBook, UserId, UserProfile,
};

use crate::gateway::RequestGateway;

const LIBRARY: &str = "/api/v1/library";

#[derive(Clone)]
pub struct ShelfApi {
    gateway: Arc<RequestGateway>,
}

impl ShelfApi {
    pub fn new(gateway: Arc<RequestGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<RequestGateway> {
        &self.gateway
    }

    // ------------------------------------------------------------------------
    // Library
    // ------------------------------------------------------------------------

    pub async fn fetch_library(&self) -> ShelfResult<Vec<TrackedBook>> {
        self.gateway.get_json(LIBRARY).await
    }

    pub async fn fetch_tracked(&self, book_id: BookId) -> ShelfResult<Option<TrackedBook>> {
        let path = format!("{}/{}", LIBRARY, book_id.get());
        self.gateway.get_optional_json(&path).await
    }

    pub async fn track(&self, request: &TrackRequest) -> ShelfResult<TrackedBook> {
        self.gateway.post_json(LIBRARY, request).await
    }

    pub async fn untrack(&self, book_id: BookId) -> ShelfResult<()> {
        let path = format!("{}/{}", LIBRARY, book_id.get());
        self.gateway.delete(&path).await
    }

    pub async fn update_progress(
        &self,
        book_id: BookId,
        update: &ProgressUpdate,
    ) -> ShelfResult<TrackedBook> {
        let path = format!("{}/{}", LIBRARY, book_id.get());
        self.gateway.patch_json(&path, update).await
    }

    // ------------------------------------------------------------------------
    // Social
    // ------------------------------------------------------------------------

    pub async fn fetch_list(&self, list_id: ListId) -> ShelfResult<Option<ListSummary>> {
        let path = format!("/api/v1/lists/{}", list_id.get());
        self.gateway.get_optional_json(&path).await
    }

    pub async fn fetch_user(&self, user_id: UserId) -> ShelfResult<Option<UserProfile>> {
        let path = format!("/api/v1/users/{}", user_id.get());
        self.gateway.get_optional_json(&path).await
    }

    pub async fn fetch_review(&self, review_id: ReviewId) -> ShelfResult<Option<ReviewSummary>> {
        let path = format!("/api/v1/reviews/{}", review_id.get());
        self.gateway.get_optional_json(&path).await
    }

    pub async fn set_list_liked(&self, list_id: ListId, liked: bool) -> ShelfResult<ListCounts> {
        let path = format!("/api/v1/lists/{}/like", list_id.get());
        self.toggle(&path, liked).await
    }

    pub async fn set_list_saved(&self, list_id: ListId, saved: bool) -> ShelfResult<ListCounts> {
        let path = format!("/api/v1/lists/{}/save", list_id.get());
        self.toggle(&path, saved).await
    }

    pub async fn set_following(&self, user_id: UserId, following: bool) -> ShelfResult<FollowCounts> {
        let path = format!("/api/v1/users/{}/follow", user_id.get());
        self.toggle(&path, following).await
    }

    pub async fn set_review_liked(
        &self,
        review_id: ReviewId,
        liked: bool,
    ) -> ShelfResult<ReviewCounts> {
        let path = format!("/api/v1/reviews/{}/like", review_id.get());
        self.toggle(&path, liked).await
    }

    /// `POST` turns a relationship on, `DELETE` turns it off.
    async fn toggle<T: serde::de::DeserializeOwned>(&self, path: &str, on: bool) -> ShelfResult<T> {
        if on {
            self.gateway.post_empty(path).await
        } else {
            self.gateway.delete_json(path).await
        }
    }
}
