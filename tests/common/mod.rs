//! Common test utilities and helpers
//!
//! - `spawn_app` builds the full service graph on in-memory stores
//! - `InstrumentedStore` counts and optionally fails document state I/O
//! - `RecordingEngine` remembers every snapshot handed to `load`
//! - `register` creates a user and returns its token and identity

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use collabspace::backend::auth::Identity;
use collabspace::backend::collab::{CrdtDocument, CrdtEngine, DiamondEngine, EngineError};
use collabspace::backend::objects::{MemoryObjectStore, UrlSigner};
use collabspace::backend::server::{assemble_state, AppConfig, AppState};
use collabspace::backend::store::{
    Announcement, DocumentRecord, Group, LeaveOutcome, Member, Membership, MemoryStore, RelationalStore, StoreError,
    User,
};
use collabspace::shared::Role;

pub const TEST_SECRET: &str = "integration-test-secret";
pub const BASE_URL: &str = "http://collab.test";

/// Assert that a `Result<_, BackendError>` failed with the given `ErrorKind`
#[macro_export]
macro_rules! assert_kind {
    ($result:expr, $kind:expr) => {
        match $result {
            Ok(_) => panic!("Expected {:?}, got Ok", $kind),
            Err(e) => assert_eq!(e.kind(), $kind, "unexpected error: {}", e),
        }
    };
}

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: TEST_SECRET.to_string(),
        bcrypt_cost: 4,
        public_base_url: Some(BASE_URL.to_string()),
        session_idle_grace_ms: 100,
        join_timeout_ms: 2_000,
        ..AppConfig::default()
    }
}

pub fn signer() -> UrlSigner {
    UrlSigner::new(TEST_SECRET, BASE_URL).unwrap()
}

pub struct TestApp {
    pub config: AppConfig,
    pub state: AppState,
    pub store: Arc<InstrumentedStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub engine: Arc<RecordingEngine>,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_config(), Arc::new(InstrumentedStore::new()))
}

/// Build a fresh service graph over `store`; call twice with the same store
/// to simulate a restart
pub fn spawn_app_with(config: AppConfig, store: Arc<InstrumentedStore>) -> TestApp {
    let objects = Arc::new(MemoryObjectStore::new(signer()));
    let engine = Arc::new(RecordingEngine::default());
    let state = assemble_state(&config, store.clone(), objects.clone(), signer(), engine.clone()).unwrap();
    TestApp {
        config,
        state,
        store,
        objects,
        engine,
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
    pub identity: Identity,
}

pub async fn register(app: &TestApp, name: &str, email: &str) -> TestUser {
    let (user, token) = app
        .state
        .credentials
        .register(name, email, "password123")
        .await
        .unwrap();
    let identity = app.state.credentials.authenticate(&token).unwrap();
    TestUser {
        id: user.id,
        token,
        identity,
    }
}

/// Wait up to two seconds for every document session to unload
pub async fn wait_until_unloaded(app: &TestApp) -> bool {
    for _ in 0..200 {
        if app.state.bridge.live_documents().await.is_empty() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// `MemoryStore` with counters and failure switches on document state I/O
#[derive(Default)]
pub struct InstrumentedStore {
    inner: MemoryStore,
    pub state_reads: AtomicUsize,
    pub state_writes: AtomicUsize,
    pub fail_state_reads: AtomicBool,
    pub fail_state_writes: AtomicBool,
    /// Added to every document metadata lookup
    pub metadata_delay_ms: AtomicU64,
    pub last_saved: Mutex<Option<Vec<u8>>>,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.state_reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.state_writes.load(Ordering::SeqCst)
    }

    pub fn last_saved(&self) -> Option<Vec<u8>> {
        self.last_saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelationalStore for InstrumentedStore {
    async fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<User, StoreError> {
        self.inner.create_user(name, email, password_hash).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.inner.get_user_by_email(email).await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.inner.get_user(id).await
    }

    async fn create_group(
        &self,
        name: &str,
        description: &str,
        code: &str,
        creator: Uuid,
    ) -> Result<Group, StoreError> {
        self.inner.create_group(name, description, code, creator).await
    }

    async fn get_group_by_code(&self, code: &str) -> Result<Option<Group>, StoreError> {
        self.inner.get_group_by_code(code).await
    }

    async fn get_group(&self, id: Uuid) -> Result<Option<Group>, StoreError> {
        self.inner.get_group(id).await
    }

    async fn delete_group(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_group(id).await
    }

    async fn list_groups_for_user(&self, user_id: Uuid) -> Result<Vec<(Group, Role)>, StoreError> {
        self.inner.list_groups_for_user(user_id).await
    }

    async fn get_membership(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<Membership>, StoreError> {
        self.inner.get_membership(user_id, group_id).await
    }

    async fn add_membership(&self, user_id: Uuid, group_id: Uuid, role: Role) -> Result<Membership, StoreError> {
        self.inner.add_membership(user_id, group_id, role).await
    }

    async fn leave_group(&self, user_id: Uuid, group_id: Uuid) -> Result<LeaveOutcome, StoreError> {
        self.inner.leave_group(user_id, group_id).await
    }

    async fn list_members(&self, group_id: Uuid) -> Result<Vec<Member>, StoreError> {
        self.inner.list_members(group_id).await
    }

    async fn create_document(&self, group_id: Uuid, name: &str) -> Result<DocumentRecord, StoreError> {
        self.inner.create_document(group_id, name).await
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRecord>, StoreError> {
        let delay = self.metadata_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.get_document(id).await
    }

    async fn list_documents(&self, group_id: Uuid) -> Result<Vec<DocumentRecord>, StoreError> {
        self.inner.list_documents(group_id).await
    }

    async fn load_document_state(&self, id: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        self.state_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_state_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected read failure".to_string()));
        }
        self.inner.load_document_state(id).await
    }

    async fn save_document_state(&self, id: Uuid, state: &[u8]) -> Result<(), StoreError> {
        self.state_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_state_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        self.inner.save_document_state(id, state).await?;
        *self.last_saved.lock().unwrap() = Some(state.to_vec());
        Ok(())
    }

    async fn create_announcement(&self, group_id: Uuid, user_id: Uuid, body: &str) -> Result<Announcement, StoreError> {
        self.inner.create_announcement(group_id, user_id, body).await
    }

    async fn list_announcements(&self, group_id: Uuid) -> Result<Vec<Announcement>, StoreError> {
        self.inner.list_announcements(group_id).await
    }

    async fn get_announcement(&self, id: Uuid) -> Result<Option<Announcement>, StoreError> {
        self.inner.get_announcement(id).await
    }

    async fn delete_announcement(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_announcement(id).await
    }
}

/// `DiamondEngine` that keeps a copy of every snapshot it is asked to load
#[derive(Default)]
pub struct RecordingEngine {
    pub loaded: Mutex<Vec<Vec<u8>>>,
}

impl RecordingEngine {
    pub fn loaded(&self) -> Vec<Vec<u8>> {
        self.loaded.lock().unwrap().clone()
    }
}

impl CrdtEngine for RecordingEngine {
    fn empty(&self) -> Box<dyn CrdtDocument> {
        DiamondEngine.empty()
    }

    fn load(&self, snapshot: &[u8]) -> Result<Box<dyn CrdtDocument>, EngineError> {
        self.loaded.lock().unwrap().push(snapshot.to_vec());
        DiamondEngine.load(snapshot)
    }
}
