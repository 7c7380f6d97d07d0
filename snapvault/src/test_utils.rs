//! Shared helpers for tests: in-memory backends wired into a test server.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;

use crate::config::{
    Config, DatabaseConfig, DummyIdentityConfig, IdentityProviderConfig, StorageConfig,
};
use crate::db::memory::MemoryStore;
use crate::identity::dummy::DummyProvider;
use crate::storage::memory::MemoryStorage;
use crate::storage::{ObjectStorage, PutObject, StorageError, StoredObject};
use crate::{AppState, build_router};

/// Concrete handles to the in-memory backends behind a test [`AppState`],
/// so tests can inspect stored rows, objects, and provider call counts.
pub struct TestBackends {
    pub db: Arc<MemoryStore>,
    pub identity: Arc<DummyProvider>,
    pub storage: Arc<MemoryStorage>,
}

/// Test configuration: everything in-memory, autoconfirming identity provider.
pub fn create_test_config() -> Config {
    Config {
        database: DatabaseConfig::Memory,
        identity: IdentityProviderConfig::Dummy(DummyIdentityConfig { autoconfirm: true }),
        storage: StorageConfig::Memory,
        ..Config::default()
    }
}

/// Build an [`AppState`] over fresh in-memory backends.
///
/// The `customize` hook runs on the config before the backends are built, so
/// policy flags (auto-create, password rules, test domains, dummy autoconfirm)
/// can be adjusted per test.
pub fn create_test_state(customize: impl FnOnce(&mut Config)) -> (AppState, TestBackends) {
    let mut config = create_test_config();
    customize(&mut config);

    let autoconfirm = match &config.identity {
        IdentityProviderConfig::Dummy(dummy) => dummy.autoconfirm,
        IdentityProviderConfig::Gotrue(_) => true,
    };

    let db = Arc::new(MemoryStore::new());
    let identity = Arc::new(DummyProvider::new(autoconfirm));
    let storage = Arc::new(MemoryStorage::new());

    let state = AppState::builder()
        .db(db.clone())
        .identity(identity.clone())
        .storage(storage.clone())
        .config(config)
        .build();

    (state, TestBackends { db, identity, storage })
}

/// Spin up a [`TestServer`] over the full router with in-memory backends.
pub async fn create_test_server(
    customize: impl FnOnce(&mut Config),
) -> (TestServer, TestBackends) {
    let (state, backends) = create_test_state(customize);
    let router = build_router(&state).expect("router should build");
    let server = TestServer::new(router).expect("test server should start");
    (server, backends)
}

/// Storage stub simulating a backend outage: uploads are acknowledged but
/// every lookup or delete fails.
pub struct FailingStorage;

#[async_trait::async_trait]
impl ObjectStorage for FailingStorage {
    async fn put(&self, object: PutObject) -> crate::storage::Result<StoredObject> {
        Ok(StoredObject {
            url: format!("memory://{}", object.key),
        })
    }

    async fn delete(&self, _key: &str) -> crate::storage::Result<()> {
        Err(StorageError::Provider {
            status: 503,
            message: "simulated storage outage".to_string(),
        })
    }

    async fn exists(&self, _key: &str) -> crate::storage::Result<bool> {
        Err(StorageError::Provider {
            status: 503,
            message: "simulated storage outage".to_string(),
        })
    }
}

/// Like [`create_test_server`], but with [`FailingStorage`] wired in.
///
/// The returned `TestBackends.storage` handle is an inert placeholder; only
/// `db` and `identity` observe the live state.
pub async fn create_test_server_with_failing_storage() -> (TestServer, TestBackends) {
    let config = create_test_config();

    let db = Arc::new(MemoryStore::new());
    let identity = Arc::new(DummyProvider::new(true));
    let storage = Arc::new(MemoryStorage::new());

    let state = AppState::builder()
        .db(db.clone())
        .identity(identity.clone())
        .storage(Arc::new(FailingStorage))
        .config(config)
        .build();

    let router = build_router(&state).expect("router should build");
    let server = TestServer::new(router).expect("test server should start");
    (server, TestBackends { db, identity, storage })
}

/// Sign up and log in, returning the provider-issued access token.
pub async fn signup_and_login(server: &TestServer, email: &str) -> String {
    server
        .post("/auth/signup")
        .json(&json!({ "email": email, "password": "secret" }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .post("/auth/login")
        .json(&json!({ "email": email, "password": "secret" }))
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    body["accessToken"].as_str().expect("access token").to_string()
}
