#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;
use shelf_client::{ClientConfig, ShelfClient};
use shelf_test_utils::fixtures::{self, ACCESS_1};
use shelf_test_utils::{FakeTransport, InMemoryCredentialStore, Method, TrackedBook};

pub const LIBRARY: &str = "/api/v1/library";
pub const RENEWAL: &str = "/auth/refresh";

pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub store: Arc<InMemoryCredentialStore>,
    pub client: ShelfClient,
}

/// A client over the fake server that has not signed in.
pub fn signed_out() -> Harness {
    let config = ClientConfig::new("http://test", "/nonexistent/credentials.json");
    let transport = Arc::new(FakeTransport::new());
    transport.require_access(ACCESS_1);
    let store = Arc::new(InMemoryCredentialStore::new());
    let client = ShelfClient::with_parts(&config, transport.clone(), store.clone());
    Harness {
        transport,
        store,
        client,
    }
}

/// A client holding the initial credential pair; the server accepts
/// `access-1` until told otherwise.
pub async fn signed_in() -> Harness {
    let harness = signed_out();
    harness
        .client
        .coordinator()
        .sign_in(&fixtures::initial_credentials())
        .await
        .expect("sign in");
    harness
}

impl Harness {
    /// Load `rows` as the library through a forced resync.
    pub async fn seed_library(&self, rows: &[TrackedBook]) {
        self.transport
            .respond_once(Method::Get, LIBRARY, shelf_test_utils::ApiResponse::ok(json!(rows)));
        self.client
            .library()
            .resync(true)
            .await
            .expect("seed library");
    }

    /// From now on the server only accepts `access-2`, handed out by the
    /// renewal endpoint.
    pub fn expire_access(&self) {
        self.transport.require_access(fixtures::ACCESS_2);
        self.transport
            .renewal_succeeds(fixtures::ACCESS_2, fixtures::REFRESH_2);
    }

    pub async fn wait_for_waiters(&self, count: usize) {
        while self.client.coordinator().waiter_count() < count {
            tokio::task::yield_now().await;
        }
    }
}

pub fn test_runtime() -> Result<tokio::runtime::Runtime, proptest::test_runner::TestCaseError> {
    tokio::runtime::Runtime::new().map_err(|e| {
        proptest::test_runner::TestCaseError::fail(format!("Failed to create runtime: {}", e))
    })
}
