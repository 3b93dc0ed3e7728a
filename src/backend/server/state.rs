/**
 * Application State Management
 *
 * `AppState` holds one shared handle to every service. The `FromRef`
 * implementations let a handler extract just the service it uses, so
 * handlers are written against `State<Arc<MembershipGuard>>` and friends
 * rather than the whole state.
 *
 * # Example
 *
 * ```rust,ignore
 * use axum::extract::State;
 * use std::sync::Arc;
 * use collabspace::backend::groups::MembershipGuard;
 *
 * async fn handler(State(guard): State<Arc<MembershipGuard>>) {
 *     // ...
 * }
 * ```
 */

use axum::extract::FromRef;
use std::sync::Arc;

use crate::backend::auth::CredentialService;
use crate::backend::collab::{DocumentRegistry, DocumentSyncBridge};
use crate::backend::groups::{AnnouncementBoard, MembershipGuard};
use crate::backend::resources::ResourceAggregator;

#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialService>,
    pub guard: Arc<MembershipGuard>,
    pub announcements: Arc<AnnouncementBoard>,
    pub documents: Arc<DocumentRegistry>,
    pub bridge: DocumentSyncBridge,
    pub resources: Arc<ResourceAggregator>,
}

impl FromRef<AppState> for Arc<CredentialService> {
    fn from_ref(state: &AppState) -> Self {
        state.credentials.clone()
    }
}

impl FromRef<AppState> for Arc<MembershipGuard> {
    fn from_ref(state: &AppState) -> Self {
        state.guard.clone()
    }
}

impl FromRef<AppState> for Arc<AnnouncementBoard> {
    fn from_ref(state: &AppState) -> Self {
        state.announcements.clone()
    }
}

impl FromRef<AppState> for Arc<DocumentRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.documents.clone()
    }
}

impl FromRef<AppState> for DocumentSyncBridge {
    fn from_ref(state: &AppState) -> Self {
        state.bridge.clone()
    }
}

impl FromRef<AppState> for Arc<ResourceAggregator> {
    fn from_ref(state: &AppState) -> Self {
        state.resources.clone()
    }
}
