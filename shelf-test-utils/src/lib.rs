//! Shelf Test Utilities
//!
//! Centralized test infrastructure for the shelf workspace:
//! - A scripted fake transport with call recording and response gates
//! - Proptest generators for entity types
//! - Test fixtures for common scenarios
//! - Custom assertions for shelf-specific errors

// Re-export the in-memory credential store from its source crate
pub use shelf_storage::InMemoryCredentialStore;

// Re-export core types for convenience
pub use shelf_core::{
    ApiRequest, ApiResponse, AuthError, Book, BookId, CacheError, Credentials, ListCounts, ListId,
    ListSummary, Method, MutationError, ProgressUpdate, ReadingStatus, ReviewId, ReviewSummary,
    ShelfError, ShelfResult, Timestamp, TrackedBook, Transport, TransportError, UserId,
    UserProfile,
};

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;

// ============================================================================
// FAKE TRANSPORT
// ============================================================================

/// One request as the fake server saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

#[derive(Debug, Clone)]
enum Scripted {
    Response(ApiResponse),
    Error(TransportError),
}

type RouteKey = (Method, String);

#[derive(Default)]
struct Script {
    sticky: HashMap<RouteKey, Scripted>,
    queued: HashMap<RouteKey, VecDeque<Scripted>>,
    gates: HashMap<RouteKey, VecDeque<Arc<Semaphore>>>,
    calls: Vec<RecordedCall>,
    required_access: Option<String>,
}

/// Holds back one response until opened.
#[derive(Clone)]
pub struct Gate {
    semaphore: Arc<Semaphore>,
}

impl Gate {
    pub fn open(&self) {
        self.semaphore.add_permits(1);
    }
}

/// In-process stand-in for the REST server.
///
/// Responses are scripted per `(method, path)`: one-shot responses queued
/// with [`respond_once`](Self::respond_once) are served first, then the
/// sticky one set with [`respond`](Self::respond). Unscripted routes answer
/// 500. When an access token is required, any request other than the
/// renewal call that carries a different bearer gets 401.
///
/// The response is chosen when the request arrives; a [`Gate`] only delays
/// its delivery.
pub struct FakeTransport {
    renewal_path: String,
    script: Mutex<Script>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::with_renewal_path("/auth/refresh")
    }

    pub fn with_renewal_path(renewal_path: impl Into<String>) -> Self {
        Self {
            renewal_path: renewal_path.into(),
            script: Mutex::new(Script::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn respond(&self, method: Method, path: &str, response: ApiResponse) {
        self.lock()
            .sticky
            .insert((method, path.to_string()), Scripted::Response(response));
    }

    pub fn respond_json(&self, method: Method, path: &str, body: Value) {
        self.respond(method, path, ApiResponse::ok(body));
    }

    pub fn respond_once(&self, method: Method, path: &str, response: ApiResponse) {
        self.lock()
            .queued
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Scripted::Response(response));
    }

    pub fn fail_network(&self, method: Method, path: &str) {
        self.lock().sticky.insert(
            (method, path.to_string()),
            Scripted::Error(TransportError::Network {
                reason: "connection reset".to_string(),
            }),
        );
    }

    /// Reject every non-renewal request not carrying `token`.
    pub fn require_access(&self, token: &str) {
        self.lock().required_access = Some(token.to_string());
    }

    /// Renewal hands out `access`/`refresh`. Once a renewal has been served,
    /// only `access` is accepted.
    pub fn renewal_succeeds(&self, access: &str, refresh: &str) {
        let path = self.renewal_path.clone();
        self.respond_json(Method::Post, &path, fixtures::renewal_body(access, refresh));
    }

    /// Renewal answers 401 (refresh token revoked).
    pub fn renewal_rejected(&self) {
        let path = self.renewal_path.clone();
        self.respond(Method::Post, &path, ApiResponse::unauthorized());
    }

    /// Delay the response to the next request on this route.
    pub fn hold_next(&self, method: Method, path: &str) -> Gate {
        let semaphore = Arc::new(Semaphore::new(0));
        self.lock()
            .gates
            .entry((method, path.to_string()))
            .or_default()
            .push_back(semaphore.clone());
        Gate { semaphore }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, method: Method, path: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .count()
    }

    pub fn renewal_calls(&self) -> usize {
        self.calls_to(Method::Post, &self.renewal_path)
    }

    /// Yield until at least `count` requests have reached this route.
    pub async fn wait_for_calls(&self, method: Method, path: &str, count: usize) {
        while self.calls_to(method, path) < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let (scripted, gate) = {
            let mut script = self.lock();
            let bearer = request
                .bearer
                .as_ref()
                .map(|token| token.expose_secret().to_string());
            script.calls.push(RecordedCall {
                method: request.method,
                path: request.path.clone(),
                body: request.body.clone(),
                bearer: bearer.clone(),
            });

            if request.path != self.renewal_path {
                if let Some(required) = &script.required_access {
                    if bearer.as_deref() != Some(required.as_str()) {
                        return Ok(ApiResponse::unauthorized());
                    }
                }
            }

            let key = (request.method, request.path.clone());
            let queued = script.queued.get_mut(&key).and_then(VecDeque::pop_front);
            let scripted = match queued {
                Some(scripted) => scripted,
                None => script.sticky.get(&key).cloned().unwrap_or_else(|| {
                    Scripted::Response(ApiResponse::new(500, json!("unscripted route")))
                }),
            };
            let gate = script.gates.get_mut(&key).and_then(VecDeque::pop_front);
            (scripted, gate)
        };

        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }

        if request.path == self.renewal_path {
            if let Scripted::Response(response) = &scripted {
                if response.is_success() {
                    if let Some(access) = response.body.get("access_token").and_then(Value::as_str) {
                        self.lock().required_access = Some(access.to_string());
                    }
                }
            }
        }

        match scripted {
            Scripted::Response(response) => Ok(response),
            Scripted::Error(e) => Err(e),
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating shelf entities.

    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    pub fn arb_book_id() -> impl Strategy<Value = BookId> {
        (1u64..100_000).prop_map(BookId::new)
    }

    pub fn arb_reading_status() -> impl Strategy<Value = ReadingStatus> {
        prop::sample::select(ReadingStatus::ALL.to_vec())
    }

    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_600_000_000i64..1_900_000_000i64)
            .prop_map(|secs| Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now))
    }

    /// Generate a TrackedBook whose progress never exceeds its chapter total.
    pub fn arb_tracked_book() -> impl Strategy<Value = TrackedBook> {
        (
            arb_book_id(),
            arb_reading_status(),
            prop::option::of(1u32..500),
            prop::option::of(1u32..40),
            prop::option::of(1u8..=10),
            prop::option::of(arb_timestamp()),
            prop::option::of(1u32..1000),
        )
            .prop_map(
                |(book_id, status, chapter, volume, rating, last_read_at, total)| {
                    let current_chapter = match (chapter, total) {
                        (Some(chapter), Some(total)) => Some(chapter.min(total)),
                        (chapter, _) => chapter,
                    };
                    TrackedBook {
                        book_id,
                        status,
                        current_chapter,
                        current_volume: volume,
                        rating,
                        last_read_at,
                        total_chapters: total,
                    }
                },
            )
    }

    pub fn arb_progress_update() -> impl Strategy<Value = ProgressUpdate> {
        (
            prop::option::of(arb_reading_status()),
            prop::option::of(1u32..1000),
            prop::option::of(1u32..40),
            prop::option::of(1u8..=10),
        )
            .prop_map(|(status, current_chapter, current_volume, rating)| ProgressUpdate {
                status,
                current_chapter,
                current_volume,
                rating,
                last_read_at: None,
            })
    }

    pub fn arb_list_summary() -> impl Strategy<Value = ListSummary> {
        (
            1u64..10_000,
            "[a-zA-Z0-9 ]{1,40}",
            any::<bool>(),
            any::<bool>(),
            0u64..10_000,
            0u64..10_000,
        )
            .prop_map(|(id, name, liked, saved, like_count, save_count)| ListSummary {
                list_id: ListId::new(id),
                name,
                liked,
                saved,
                like_count: like_count + u64::from(liked),
                save_count: save_count + u64::from(saved),
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built entities and payloads for common test scenarios.

    use super::*;
    use serde::Serialize;

    pub const ACCESS_1: &str = "access-1";
    pub const REFRESH_1: &str = "refresh-1";
    pub const ACCESS_2: &str = "access-2";
    pub const REFRESH_2: &str = "refresh-2";

    /// The pair a test session starts with.
    pub fn initial_credentials() -> Credentials {
        Credentials::new(ACCESS_1, REFRESH_1)
    }

    pub fn renewal_body(access: &str, refresh: &str) -> Value {
        json!({ "access_token": access, "refresh_token": refresh })
    }

    pub fn to_json<T: Serialize>(value: &T) -> Value {
        serde_json::to_value(value).expect("fixture serializes")
    }

    pub fn book(id: u64, total_chapters: Option<u32>) -> Book {
        Book {
            book_id: BookId::new(id),
            title: format!("Book {}", id),
            total_chapters,
            total_volumes: None,
        }
    }

    pub fn tracked(id: u64, status: ReadingStatus) -> TrackedBook {
        TrackedBook {
            book_id: BookId::new(id),
            status,
            current_chapter: None,
            current_volume: None,
            rating: None,
            last_read_at: None,
            total_chapters: None,
        }
    }

    pub fn reading_at(id: u64, chapter: u32, total_chapters: Option<u32>) -> TrackedBook {
        TrackedBook {
            current_chapter: Some(chapter),
            total_chapters,
            ..tracked(id, ReadingStatus::Reading)
        }
    }

    pub fn library_path(id: u64) -> String {
        format!("/api/v1/library/{}", id)
    }

    pub fn list_summary(id: u64, liked: bool, like_count: u64) -> ListSummary {
        ListSummary {
            list_id: ListId::new(id),
            name: format!("List {}", id),
            liked,
            saved: false,
            like_count,
            save_count: 0,
        }
    }

    pub fn user_profile(id: u64, following: bool, follower_count: u64) -> UserProfile {
        UserProfile {
            user_id: UserId::new(id),
            username: format!("reader{}", id),
            following,
            follower_count,
        }
    }

    pub fn review_summary(id: u64, liked: bool, like_count: u64) -> ReviewSummary {
        ReviewSummary {
            review_id: ReviewId::new(id),
            book_id: BookId::new(1),
            liked,
            like_count,
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for shelf-specific error variants.

    use super::*;

    /// Assert that a ShelfResult is a rolled-back mutation.
    #[track_caller]
    pub fn assert_rejected_mutation<T: std::fmt::Debug>(result: &ShelfResult<T>) {
        match result {
            Err(ShelfError::Mutation(MutationError::Rejected { .. })) => {}
            other => panic!("Expected MutationRejected, got: {:?}", other),
        }
    }

    /// Assert that a ShelfResult is a terminal session failure.
    #[track_caller]
    pub fn assert_session_invalid<T: std::fmt::Debug>(result: &ShelfResult<T>) {
        match result {
            Err(ShelfError::Auth(AuthError::SessionInvalid { .. })) => {}
            other => panic!("Expected SessionInvalid, got: {:?}", other),
        }
    }

    /// Assert that a ShelfResult is an EntityNotCached precondition failure.
    #[track_caller]
    pub fn assert_not_cached<T: std::fmt::Debug>(result: &ShelfResult<T>) {
        match result {
            Err(ShelfError::Cache(CacheError::EntityNotCached { .. })) => {}
            other => panic!("Expected EntityNotCached, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use secrecy::SecretString;

    #[tokio::test]
    async fn test_unscripted_route_answers_500() {
        let transport = FakeTransport::new();
        let response = transport
            .send(ApiRequest::get("/api/v1/library"))
            .await
            .unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(transport.calls_to(Method::Get, "/api/v1/library"), 1);
    }

    #[tokio::test]
    async fn test_one_shot_responses_precede_sticky() {
        let transport = FakeTransport::new();
        transport.respond_json(Method::Get, "/x", json!("sticky"));
        transport.respond_once(Method::Get, "/x", ApiResponse::ok(json!("first")));

        let first = transport.send(ApiRequest::get("/x")).await.unwrap();
        let second = transport.send(ApiRequest::get("/x")).await.unwrap();
        assert_eq!(first.body, json!("first"));
        assert_eq!(second.body, json!("sticky"));
    }

    #[tokio::test]
    async fn test_required_access_and_renewal() {
        let transport = FakeTransport::new();
        transport.respond_json(Method::Get, "/x", json!([]));
        transport.require_access(fixtures::ACCESS_2);
        transport.renewal_succeeds("access-3", "refresh-3");

        let stale = SecretString::from(fixtures::ACCESS_1.to_string());
        let rejected = transport
            .send(ApiRequest::get("/x").with_bearer(stale))
            .await
            .unwrap();
        assert!(rejected.is_unauthorized());

        let renewal = transport
            .send(ApiRequest::post("/auth/refresh"))
            .await
            .unwrap();
        assert!(renewal.is_success());
        assert_eq!(transport.renewal_calls(), 1);

        let renewed = SecretString::from("access-3".to_string());
        let accepted = transport
            .send(ApiRequest::get("/x").with_bearer(renewed))
            .await
            .unwrap();
        assert!(accepted.is_success());
    }

    #[test]
    fn test_fixtures() {
        let row = fixtures::reading_at(3, 10, Some(20));
        assert_eq!(row.status, ReadingStatus::Reading);
        assert_eq!(row.current_chapter, Some(10));
        assert_eq!(fixtures::library_path(3), "/api/v1/library/3");
        assert_eq!(
            fixtures::to_json(&fixtures::tracked(1, ReadingStatus::Completed))["status"],
            json!("completed")
        );
    }

    #[test]
    fn test_assertions() {
        let result: ShelfResult<()> = Err(MutationError::Rejected {
            key: "book:1".to_string(),
            reason: "500".to_string(),
        }
        .into());
        assertions::assert_rejected_mutation(&result);

        let result: ShelfResult<()> = Err(CacheError::EntityNotCached {
            key: "book:1".to_string(),
        }
        .into());
        assertions::assert_not_cached(&result);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_generated_progress_within_total(book in generators::arb_tracked_book()) {
            if let (Some(chapter), Some(total)) = (book.current_chapter, book.total_chapters) {
                prop_assert!(chapter <= total);
            }
        }

        #[test]
        fn prop_generated_list_counts_include_own_flags(list in generators::arb_list_summary()) {
            prop_assert!(!list.liked || list.like_count >= 1);
            prop_assert!(!list.saved || list.save_count >= 1);
        }
    }
}
