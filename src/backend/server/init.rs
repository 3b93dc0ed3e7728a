/**
 * Server Initialization
 *
 * # Initialization Process
 *
 * 1. Connect to PostgreSQL and run migrations, or fall back to the
 *    in-memory store
 * 2. Open the filesystem object store under `storage_root`
 * 3. Build the services on top of the stores
 * 4. Create the router
 *
 * `assemble_state` takes the stores as arguments so tests can run the
 * whole service graph on in-memory stores.
 */

use axum::Router;
use std::sync::Arc;
use thiserror::Error;

use crate::backend::auth::{CredentialService, TokenIssuer};
use crate::backend::collab::{CrdtEngine, DiamondEngine, DocumentRegistry, DocumentSyncBridge, SessionConfig};
use crate::backend::error::BackendError;
use crate::backend::groups::{AnnouncementBoard, MembershipGuard};
use crate::backend::objects::signing::SignatureError;
use crate::backend::objects::{LocalObjectStore, ObjectStore, UrlSigner};
use crate::backend::resources::{ResourceAggregator, ResourceLimits};
use crate::backend::routes::router::create_router;
use crate::backend::server::config::{load_database, AppConfig};
use crate::backend::server::state::AppState;
use crate::backend::store::{MemoryStore, PostgresStore, RelationalStore};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("URL signing key rejected: {0}")]
    Signing(#[from] SignatureError),
    #[error("could not set up services: {0}")]
    Services(#[from] BackendError),
}

/// Build every service from configuration
pub async fn build_state(config: &AppConfig) -> Result<AppState, StartupError> {
    if config.uses_dev_secret() {
        tracing::warn!("JWT_SECRET is not set; using the development secret. Do not run like this in production.");
    }

    let store: Arc<dyn RelationalStore> = match load_database(config.database_url.as_deref()).await {
        Some(pool) => Arc::new(PostgresStore::new(pool)),
        None => Arc::new(MemoryStore::new()),
    };

    let signer = UrlSigner::new(config.url_signing_key(), &config.public_base_url())?;
    tracing::info!("[Resources] Object store at {}", config.storage_root.display());
    let objects: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(config.storage_root.clone(), signer.clone()));

    assemble_state(config, store, objects, signer, Arc::new(DiamondEngine))
}

/// Wire the services over the given stores
pub fn assemble_state(
    config: &AppConfig,
    store: Arc<dyn RelationalStore>,
    objects: Arc<dyn ObjectStore>,
    signer: UrlSigner,
    engine: Arc<dyn CrdtEngine>,
) -> Result<AppState, StartupError> {
    let tokens = TokenIssuer::new(&config.jwt_secret, config.token_ttl());
    let credentials = Arc::new(CredentialService::new(store.clone(), tokens, config.bcrypt_cost)?);
    let guard = Arc::new(MembershipGuard::new(store.clone()));
    let announcements = Arc::new(AnnouncementBoard::new(store.clone(), guard.clone()));
    let documents = Arc::new(DocumentRegistry::new(store.clone(), guard.clone()));

    let session_config = SessionConfig {
        store: store.clone(),
        engine,
        idle_grace: config.session_idle_grace(),
    };
    let bridge = DocumentSyncBridge::new(credentials.clone(), guard.clone(), session_config, config.join_timeout());

    let limits = ResourceLimits {
        url_ttl: config.signed_url_ttl(),
        max_upload_bytes: config.max_upload_bytes,
    };
    let resources = Arc::new(ResourceAggregator::new(store, objects, guard.clone(), signer, limits));

    Ok(AppState {
        credentials,
        guard,
        announcements,
        documents,
        bridge,
        resources,
    })
}

/// Router plus the state behind it; the caller keeps the state for shutdown
pub async fn create_app(config: &AppConfig) -> Result<(Router<()>, AppState), StartupError> {
    tracing::info!("Initializing CollabSpace server");
    let state = build_state(config).await?;
    let app = create_router(state.clone());
    tracing::info!("Router configured");
    Ok((app, state))
}
