/**
 * Document Sync Bridge
 *
 * Connects an authenticated user to a document's live session. Attaching
 * resolves the owning group from document metadata, checks membership, and
 * only then opens the session, so nothing of the document's stored state is
 * read on behalf of a non-member.
 *
 * The whole attach is bounded by the configured join timeout.
 */

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::backend::auth::{CredentialService, Identity};
use crate::backend::collab::registry::RegistryHandle;
use crate::backend::collab::session::{AttachError, SessionConfig, SessionEvent, SessionHandle};
use crate::backend::error::BackendError;
use crate::backend::groups::MembershipGuard;
use crate::backend::store::RelationalStore;
use crate::shared::{DocumentState, EditOperation};

/// Attempts at attaching when the session we reach is retiring
const ATTACH_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct DocumentSyncBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    credentials: Arc<CredentialService>,
    guard: Arc<MembershipGuard>,
    store: Arc<dyn RelationalStore>,
    registry: RegistryHandle,
    join_timeout: Duration,
}

impl DocumentSyncBridge {
    pub fn new(
        credentials: Arc<CredentialService>,
        guard: Arc<MembershipGuard>,
        config: SessionConfig,
        join_timeout: Duration,
    ) -> Self {
        let store = config.store.clone();
        let registry = RegistryHandle::spawn(config);
        Self {
            inner: Arc::new(BridgeInner {
                credentials,
                guard,
                store,
                registry,
                join_timeout,
            }),
        }
    }

    /// Token check done before any session work
    pub fn authenticate(&self, token: &str) -> Result<Identity, BackendError> {
        self.inner.credentials.authenticate(token)
    }

    pub async fn attach(&self, document_id: Uuid, identity: &Identity) -> Result<SessionAttachment, BackendError> {
        tokio::time::timeout(self.inner.join_timeout, self.attach_authorized(document_id, identity))
            .await
            .map_err(|_| {
                tracing::warn!("[Collab] Attach to {} by {} timed out", document_id, identity.user_id);
                BackendError::timeout("joining the document timed out")
            })?
    }

    async fn attach_authorized(&self, document_id: Uuid, identity: &Identity) -> Result<SessionAttachment, BackendError> {
        let record = self
            .inner
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| BackendError::not_found("Document not found"))?;
        self.inner.guard.role_of(identity.user_id, record.group_id).await?;

        for _ in 0..ATTACH_ATTEMPTS {
            let session = self
                .inner
                .registry
                .open(document_id, record.group_id)
                .await
                .ok_or_else(|| BackendError::internal("session registry unavailable"))?;
            match session.attach(identity.clone()).await {
                Ok(grant) => {
                    return Ok(SessionAttachment {
                        document_id,
                        client_id: grant.client_id,
                        initial_state: grant.state,
                        events: grant.events,
                        session,
                    })
                }
                Err(AttachError::Closed) => {
                    tracing::debug!("[Collab] Session for {} was retiring, reopening", document_id);
                }
                Err(AttachError::Failed(e)) => return Err(e),
            }
        }
        Err(BackendError::internal("document session kept closing"))
    }

    /// Wait until everything applied to a live document is stored
    pub async fn flush(&self, document_id: Uuid) -> Result<(), BackendError> {
        match self.inner.registry.all().await.into_iter().find(|(id, _)| *id == document_id) {
            Some((_, session)) => session.flush().await,
            None => Ok(()),
        }
    }

    pub async fn flush_all(&self) -> Vec<(Uuid, Result<(), BackendError>)> {
        let sessions = self.inner.registry.all().await;
        join_all(sessions.into_iter().map(|(id, session)| async move { (id, session.flush().await) })).await
    }

    /// Flush every live document, logging any that could not be saved
    pub async fn shutdown(&self) {
        let results = self.flush_all().await;
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        for (id, result) in &results {
            if let Err(e) = result {
                tracing::error!("[Collab] Could not save document {} on shutdown: {}", id, e);
            }
        }
        tracing::info!(
            "[Collab] Flushed {} live documents ({} failed)",
            results.len(),
            failed
        );
    }

    /// End every live session on a deleted group's documents. Attached
    /// clients are cut off and nothing further is saved.
    pub async fn close_group(&self, group_id: Uuid) -> usize {
        let sessions: Vec<_> = self
            .inner
            .registry
            .all()
            .await
            .into_iter()
            .filter(|(_, session)| session.group_id == group_id)
            .collect();
        for (document_id, session) in &sessions {
            tracing::debug!("[Collab] Closing document {} of removed group {}", document_id, group_id);
            session.close(BackendError::not_found("Document was deleted"));
        }
        sessions.len()
    }

    /// Documents with a loaded session
    pub async fn live_documents(&self) -> Vec<Uuid> {
        self.inner.registry.all().await.into_iter().map(|(id, _)| id).collect()
    }
}

/// What a client sees next on its attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentEvent {
    Update(SessionEvent),
    /// Updates were dropped because the client fell behind; it needs the
    /// full state again
    Lagged(u64),
}

/// One client's place in a live session. Dropping it detaches the client.
pub struct SessionAttachment {
    document_id: Uuid,
    client_id: u64,
    initial_state: DocumentState,
    events: broadcast::Receiver<SessionEvent>,
    session: SessionHandle,
}

impl SessionAttachment {
    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    /// State at the moment of attaching
    pub fn initial_state(&self) -> &DocumentState {
        &self.initial_state
    }

    pub async fn edit(&self, operations: Vec<EditOperation>) -> Result<DocumentState, BackendError> {
        self.session.edit(self.client_id, operations).await
    }

    pub async fn snapshot(&self) -> Result<DocumentState, BackendError> {
        self.session.snapshot().await
    }

    /// Next event for this client; `None` once the session is gone.
    /// Cancel safe.
    pub async fn next_event(&mut self) -> Option<AttachmentEvent> {
        match self.events.recv().await {
            Ok(event) => Some(AttachmentEvent::Update(event)),
            Err(RecvError::Lagged(missed)) => {
                tracing::debug!(
                    "[Collab] Client {} on {} missed {} updates",
                    self.client_id,
                    self.document_id,
                    missed
                );
                Some(AttachmentEvent::Lagged(missed))
            }
            Err(RecvError::Closed) => None,
        }
    }
}

impl Drop for SessionAttachment {
    fn drop(&mut self) {
        self.session.detach(self.client_id);
    }
}
