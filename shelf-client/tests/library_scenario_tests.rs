//! Scenario tests for the tracked-library store.
//!
//! Each test drives a full `ShelfClient` against the scripted fake server
//! and checks what the library reads as while and after requests resolve.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use shelf_client::{ClientConfig, SessionStatus, ShelfClient};
use shelf_test_utils::assertions::{assert_not_cached, assert_rejected_mutation};
use shelf_test_utils::fixtures::{self, reading_at, tracked, ACCESS_2};
use shelf_test_utils::{
    ApiResponse, BookId, FakeTransport, InMemoryCredentialStore, Method, ProgressUpdate,
    ReadingStatus,
};

#[path = "support/harness.rs"]
mod harness;
use harness::LIBRARY;

// ============================================================================
// TRACK / UNTRACK
// ============================================================================

#[tokio::test]
async fn test_track_then_untrack() {
    let h = harness::signed_in().await;
    h.seed_library(&[]).await;
    let book = fixtures::book(42, Some(120));
    h.transport.respond_json(
        Method::Post,
        LIBRARY,
        fixtures::to_json(&tracked(42, ReadingStatus::Reading)),
    );
    h.transport
        .respond(Method::Delete, &fixtures::library_path(42), ApiResponse::no_content());

    let row = h
        .client
        .library()
        .track(&book, ReadingStatus::Reading)
        .await
        .unwrap();
    assert_eq!(row.status, ReadingStatus::Reading);
    // The server row left out the chapter count; the local one is kept.
    assert_eq!(row.total_chapters, Some(120));
    assert!(h.client.library().is_tracked(BookId::new(42)));

    h.client.library().untrack(BookId::new(42)).await.unwrap();
    assert!(!h.client.library().is_tracked(BookId::new(42)));

    h.client.settle().await;
    assert!(!h.client.library().is_tracked(BookId::new(42)));
    assert_eq!(
        h.transport.calls().last().map(|call| call.method),
        Some(Method::Get)
    );
}

#[tokio::test]
async fn test_untrack_while_track_in_flight_wins() {
    let h = Arc::new(harness::signed_in().await);
    h.seed_library(&[]).await;
    let book_path = fixtures::library_path(42);
    h.transport.respond_json(
        Method::Post,
        LIBRARY,
        fixtures::to_json(&tracked(42, ReadingStatus::Reading)),
    );
    h.transport
        .respond(Method::Delete, &book_path, ApiResponse::no_content());
    // Reconciliation sees the book as gone.
    h.transport.respond(
        Method::Get,
        &book_path,
        ApiResponse::new(404, json!("not tracked")),
    );
    let gate = h.transport.hold_next(Method::Post, LIBRARY);

    let tracking = {
        let h = h.clone();
        tokio::spawn(async move {
            h.client
                .library()
                .track(&fixtures::book(42, None), ReadingStatus::Reading)
                .await
        })
    };
    h.transport.wait_for_calls(Method::Post, LIBRARY, 1).await;
    assert!(h.client.library().is_tracked(BookId::new(42)));

    let untracking = {
        let h = h.clone();
        tokio::spawn(async move { h.client.library().untrack(BookId::new(42)).await })
    };
    // Let the untrack queue up behind the in-flight track.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    gate.open();

    tracking.await.unwrap().unwrap();
    untracking.await.unwrap().unwrap();
    assert!(!h.client.library().is_tracked(BookId::new(42)));

    h.client.settle().await;
    assert!(!h.client.library().is_tracked(BookId::new(42)));
    assert_eq!(h.transport.calls_to(Method::Delete, &book_path), 1);
}

#[tokio::test]
async fn test_track_shows_placeholder_before_server_confirms() {
    let h = Arc::new(harness::signed_in().await);
    h.seed_library(&[]).await;
    h.transport.respond_json(
        Method::Post,
        LIBRARY,
        fixtures::to_json(&tracked(7, ReadingStatus::PlanToRead)),
    );
    let gate = h.transport.hold_next(Method::Post, LIBRARY);

    let tracking = {
        let h = h.clone();
        tokio::spawn(async move {
            h.client
                .library()
                .track(&fixtures::book(7, None), ReadingStatus::PlanToRead)
                .await
        })
    };
    h.transport.wait_for_calls(Method::Post, LIBRARY, 1).await;

    assert_eq!(
        h.client.library().status_of(BookId::new(7)),
        Some(ReadingStatus::PlanToRead)
    );
    let sent = h.transport.calls().pop().unwrap();
    assert_eq!(
        sent.body,
        Some(json!({ "book_id": 7, "status": "plan_to_read" }))
    );

    gate.open();
    tracking.await.unwrap().unwrap();
    assert!(h.client.library().is_tracked(BookId::new(7)));
}

#[tokio::test]
async fn test_rejected_track_removes_placeholder() {
    let h = harness::signed_in().await;
    h.seed_library(&[]).await;
    h.transport
        .respond(Method::Post, LIBRARY, ApiResponse::new(422, json!("unknown book")));

    let result = h
        .client
        .library()
        .track(&fixtures::book(9, None), ReadingStatus::Reading)
        .await;

    assert_rejected_mutation(&result);
    assert!(!h.client.library().is_tracked(BookId::new(9)));
}

#[tokio::test]
async fn test_rejected_untrack_restores_row() {
    let h = harness::signed_in().await;
    let row = reading_at(3, 12, Some(40));
    h.seed_library(&[row.clone()]).await;
    h.transport.respond(
        Method::Delete,
        &fixtures::library_path(3),
        ApiResponse::new(500, json!("internal error")),
    );

    let result = h.client.library().untrack(BookId::new(3)).await;

    assert_rejected_mutation(&result);
    assert_eq!(h.client.library().get(BookId::new(3)), Some(row));
}

#[tokio::test]
async fn test_untrack_of_unknown_book_makes_no_call() {
    let h = harness::signed_in().await;
    h.seed_library(&[]).await;

    let result = h.client.library().untrack(BookId::new(5)).await;

    assert_not_cached(&result);
    assert_eq!(
        h.transport
            .calls_to(Method::Delete, &fixtures::library_path(5)),
        0
    );
}

// ============================================================================
// PROGRESS
// ============================================================================

#[tokio::test]
async fn test_progress_survives_credential_renewal() {
    let h = harness::signed_in().await;
    let path = fixtures::library_path(1);
    h.seed_library(&[reading_at(1, 9, Some(50))]).await;
    h.transport
        .respond_json(Method::Patch, &path, fixtures::to_json(&reading_at(1, 10, Some(50))));
    h.expire_access();

    let row = h
        .client
        .library()
        .update_progress(BookId::new(1), ProgressUpdate::chapter(10))
        .await
        .unwrap();

    assert_eq!(row.current_chapter, Some(10));
    assert_eq!(
        h.client
            .library()
            .get(BookId::new(1))
            .and_then(|book| book.current_chapter),
        Some(10)
    );
    assert_eq!(h.transport.renewal_calls(), 1);
    let patches: Vec<_> = h
        .transport
        .calls()
        .into_iter()
        .filter(|call| call.method == Method::Patch)
        .collect();
    assert_eq!(patches.len(), 2);
    assert_eq!(patches[1].bearer.as_deref(), Some(ACCESS_2));
    assert_eq!(patches[0].body, patches[1].body);
}

#[tokio::test]
async fn test_progress_stamps_last_read_at() {
    let h = harness::signed_in().await;
    let path = fixtures::library_path(1);
    h.seed_library(&[reading_at(1, 1, None)]).await;
    h.transport
        .respond_json(Method::Patch, &path, fixtures::to_json(&reading_at(1, 2, None)));

    h.client
        .library()
        .update_progress(BookId::new(1), ProgressUpdate::chapter(2))
        .await
        .unwrap();

    let sent = h
        .transport
        .calls()
        .into_iter()
        .find(|call| call.method == Method::Patch)
        .unwrap();
    let body = sent.body.unwrap();
    assert_eq!(body["current_chapter"], json!(2));
    assert!(body.get("last_read_at").is_some());
    assert!(body.get("status").is_none());
}

#[tokio::test]
async fn test_reaching_last_chapter_completes_locally() {
    let h = Arc::new(harness::signed_in().await);
    let path = fixtures::library_path(1);
    h.seed_library(&[reading_at(1, 49, Some(50))]).await;
    let mut done = reading_at(1, 50, Some(50));
    done.status = ReadingStatus::Completed;
    h.transport
        .respond_json(Method::Patch, &path, fixtures::to_json(&done));
    let gate = h.transport.hold_next(Method::Patch, &path);

    let updating = {
        let h = h.clone();
        tokio::spawn(async move {
            h.client
                .library()
                .update_progress(BookId::new(1), ProgressUpdate::chapter(50))
                .await
        })
    };
    h.transport.wait_for_calls(Method::Patch, &path, 1).await;
    assert_eq!(
        h.client.library().status_of(BookId::new(1)),
        Some(ReadingStatus::Completed)
    );

    gate.open();
    let row = updating.await.unwrap().unwrap();
    assert_eq!(row.status, ReadingStatus::Completed);
}

#[tokio::test]
async fn test_rating_only_update_keeps_reread_status() {
    let h = Arc::new(harness::signed_in().await);
    let path = fixtures::library_path(1);
    h.seed_library(&[reading_at(1, 100, Some(100))]).await;
    let mut rated = reading_at(1, 100, Some(100));
    rated.rating = Some(9);
    h.transport
        .respond_json(Method::Patch, &path, fixtures::to_json(&rated));
    let gate = h.transport.hold_next(Method::Patch, &path);

    let rating = {
        let h = h.clone();
        tokio::spawn(async move {
            h.client
                .library()
                .update_progress(BookId::new(1), ProgressUpdate::default().with_rating(9))
                .await
        })
    };
    h.transport.wait_for_calls(Method::Patch, &path, 1).await;
    let optimistic = h.client.library().get(BookId::new(1)).unwrap();
    assert_eq!(optimistic.status, ReadingStatus::Reading);
    assert_eq!(optimistic.rating, Some(9));

    gate.open();
    let row = rating.await.unwrap().unwrap();
    assert_eq!(row.status, ReadingStatus::Reading);
}

#[tokio::test]
async fn test_abandoned_progress_update_rolls_back() {
    let h = harness::signed_in().await;
    let path = fixtures::library_path(1);
    h.seed_library(&[reading_at(1, 5, None)]).await;
    h.transport
        .respond_json(Method::Patch, &path, fixtures::to_json(&reading_at(1, 6, None)));
    h.transport
        .respond_once(Method::Get, &path, ApiResponse::ok(fixtures::to_json(&reading_at(1, 5, None))));
    let _gate = h.transport.hold_next(Method::Patch, &path);

    let timed_out = tokio::time::timeout(
        Duration::from_millis(50),
        h.client
            .library()
            .update_progress(BookId::new(1), ProgressUpdate::chapter(50)),
    )
    .await;

    assert!(timed_out.is_err());
    let chapter = |h: &harness::Harness| {
        h.client
            .library()
            .get(BookId::new(1))
            .and_then(|book| book.current_chapter)
    };
    assert_eq!(chapter(&h), Some(5));

    h.client.settle().await;
    assert_eq!(h.transport.calls_to(Method::Get, &path), 1);
    assert_eq!(chapter(&h), Some(5));

    // The book is not left locked.
    let row = h
        .client
        .library()
        .update_progress(BookId::new(1), ProgressUpdate::chapter(6))
        .await
        .unwrap();
    assert_eq!(row.current_chapter, Some(6));
    assert_eq!(chapter(&h), Some(6));
}

#[tokio::test]
async fn test_progress_on_untracked_book_is_precondition_failure() {
    let h = harness::signed_in().await;
    h.seed_library(&[]).await;

    let result = h
        .client
        .library()
        .update_progress(BookId::new(8), ProgressUpdate::chapter(3))
        .await;

    assert_not_cached(&result);
    assert_eq!(
        h.transport
            .calls_to(Method::Patch, &fixtures::library_path(8)),
        0
    );
}

// ============================================================================
// RESYNC
// ============================================================================

#[tokio::test]
async fn test_superseded_resync_is_discarded() {
    let h = Arc::new(harness::signed_in().await);
    h.seed_library(&[]).await;
    h.transport.respond_once(
        Method::Get,
        LIBRARY,
        ApiResponse::ok(json!([tracked(1, ReadingStatus::Reading)])),
    );
    h.transport.respond_once(
        Method::Get,
        LIBRARY,
        ApiResponse::ok(json!([tracked(2, ReadingStatus::Reading)])),
    );
    let gate = h.transport.hold_next(Method::Get, LIBRARY);

    let slow = {
        let h = h.clone();
        tokio::spawn(async move { h.client.library().resync(true).await })
    };
    h.transport.wait_for_calls(Method::Get, LIBRARY, 2).await;

    let fresh = h.client.library().resync(true).await.unwrap();
    assert!(fresh.contains_key(&BookId::new(2)));

    gate.open();
    let stale = slow.await.unwrap().unwrap();
    assert!(!stale.contains_key(&BookId::new(1)));
    assert!(h.client.library().is_tracked(BookId::new(2)));
    assert!(!h.client.library().is_tracked(BookId::new(1)));
}

#[tokio::test]
async fn test_resync_within_freshness_window_is_served_from_memory() {
    let h = harness::signed_in().await;
    h.seed_library(&[tracked(1, ReadingStatus::OnHold)]).await;

    let library = h.client.library().resync(false).await.unwrap();
    assert_eq!(library.len(), 1);
    assert_eq!(h.transport.calls_to(Method::Get, LIBRARY), 1);

    h.transport
        .respond_once(Method::Get, LIBRARY, ApiResponse::ok(json!([])));
    let forced = h.client.library().resync(true).await.unwrap();
    assert!(forced.is_empty());
    assert_eq!(h.transport.calls_to(Method::Get, LIBRARY), 2);
}

#[tokio::test]
async fn test_resync_after_window_refetches() {
    let mut config = ClientConfig::new("http://test", "/nonexistent/credentials.json");
    config.library.freshness_secs = 0;
    let transport = Arc::new(FakeTransport::new());
    let store = Arc::new(InMemoryCredentialStore::new());
    let client = ShelfClient::with_parts(&config, transport.clone(), store);
    client
        .coordinator()
        .sign_in(&fixtures::initial_credentials())
        .await
        .unwrap();
    transport.respond_json(Method::Get, LIBRARY, json!([]));

    client.library().resync(false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    client.library().resync(false).await.unwrap();

    assert_eq!(transport.calls_to(Method::Get, LIBRARY), 2);
}

#[tokio::test]
async fn test_failed_resync_keeps_library_and_focus_retries() {
    let h = harness::signed_in().await;
    h.seed_library(&[tracked(1, ReadingStatus::Reading)]).await;

    h.transport
        .respond_once(Method::Get, LIBRARY, ApiResponse::new(503, json!("unavailable")));
    let err = h.client.library().resync(true).await.unwrap_err();
    assert_eq!(
        match err {
            shelf_test_utils::ShelfError::Transport(e) => e.status(),
            _ => None,
        },
        Some(503)
    );
    assert!(h.client.library().last_resync_failed());
    assert!(h.client.library().is_tracked(BookId::new(1)));

    // Still inside the freshness window, but the failure forces a refetch.
    h.transport.respond_once(
        Method::Get,
        LIBRARY,
        ApiResponse::ok(json!([tracked(2, ReadingStatus::Reading)])),
    );
    let library = h.client.library().on_focus().await.unwrap();
    assert!(library.contains_key(&BookId::new(2)));
    assert!(!h.client.library().last_resync_failed());

    // A healthy, fresh library is not refetched on focus.
    h.client.library().on_focus().await.unwrap();
    assert_eq!(h.transport.calls_to(Method::Get, LIBRARY), 3);
}

// ============================================================================
// SESSION
// ============================================================================

#[tokio::test]
async fn test_sign_out_clears_library() {
    let h = harness::signed_in().await;
    h.seed_library(&[tracked(1, ReadingStatus::Reading)]).await;

    h.client.sign_out().await.unwrap();

    assert_eq!(h.client.session_status(), SessionStatus::SignedOut);
    assert!(h.client.library().is_empty());
    assert!(h.client.library().snapshot().is_empty());
    assert!(h.store.current().await.is_none());
}

#[tokio::test]
async fn test_sign_in_loads_library() {
    let h = harness::signed_out();
    h.transport.respond_json(
        Method::Get,
        LIBRARY,
        json!([tracked(4, ReadingStatus::Dropped)]),
    );

    h.client
        .sign_in(&fixtures::initial_credentials())
        .await
        .unwrap();

    assert_eq!(h.client.session_status(), SessionStatus::Authenticated);
    assert_eq!(
        h.client.library().status_of(BookId::new(4)),
        Some(ReadingStatus::Dropped)
    );
}
