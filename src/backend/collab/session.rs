/**
 * Document Session
 *
 * One tokio task per live document. The task exclusively owns the CRDT
 * document and the set of attached clients; everything else talks to it
 * through `SessionHandle`, which wraps the task's command channel.
 *
 * # Lifecycle
 *
 * ```text
 * Loading ──▶ Active ──(last detach + idle grace)──▶ final persist ──▶ retired
 *                ▲                                        │ failure
 *                └────────────── grace re-armed ◀─────────┘
 * ```
 *
 * A failed load retires the session immediately and every attach, queued
 * or late, is rejected with the load error; a client is never handed an
 * empty document in place of stored state it could not read.
 *
 * A document deleted underneath a live session (its group was removed)
 * ends the session: unsaved changes are dropped, attached clients see
 * their event stream close, and later commands get `not_found`.
 *
 * # Persistence
 *
 * Every applied change marks the session dirty and schedules a snapshot
 * write on a spawned task. At most one write is in flight; changes made
 * while it runs are picked up by the next one. A failed write leaves the
 * session dirty and is retried on the next change. Writes are never
 * cancelled by a client going away.
 *
 * # Events
 *
 * Merged changes go out on a `broadcast` channel to every attached client,
 * the author included.
 */

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use crate::backend::auth::Identity;
use crate::backend::collab::engine::{CrdtDocument, CrdtEngine};
use crate::backend::collab::registry::RegistryHandle;
use crate::backend::error::BackendError;
use crate::backend::store::{RelationalStore, StoreError};
use crate::shared::{DocumentState, EditOperation};

/// Buffered updates per client before it is told to resync
pub const SESSION_EVENT_CAPACITY: usize = 1024;

/// Everything a session task needs from the outside
#[derive(Clone)]
pub struct SessionConfig {
    pub store: Arc<dyn RelationalStore>,
    pub engine: Arc<dyn CrdtEngine>,
    /// How long a session with no clients stays loaded
    pub idle_grace: Duration,
}

/// A merged change, as broadcast to every attached client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub author: u64,
    pub state: DocumentState,
}

/// What a successful attach hands back
pub struct AttachGrant {
    pub client_id: u64,
    pub state: DocumentState,
    pub events: broadcast::Receiver<SessionEvent>,
}

#[derive(Debug)]
pub enum AttachError {
    /// The session is retiring; open a fresh one
    Closed,
    Failed(BackendError),
}

pub(crate) enum SessionCommand {
    Attach {
        identity: Identity,
        reply: oneshot::Sender<Result<AttachGrant, AttachError>>,
    },
    Edit {
        client_id: u64,
        operations: Vec<EditOperation>,
        reply: oneshot::Sender<Result<DocumentState, BackendError>>,
    },
    Detach {
        client_id: u64,
    },
    Snapshot {
        reply: oneshot::Sender<DocumentState>,
    },
    Flush {
        reply: oneshot::Sender<Result<(), BackendError>>,
    },
    PersistDone {
        result: Result<(), StoreError>,
    },
    Close {
        reason: BackendError,
    },
}

fn session_closed() -> BackendError {
    BackendError::internal("document session closed")
}

fn document_deleted() -> BackendError {
    BackendError::not_found("Document was deleted")
}

/// Cheap, cloneable address of one session task
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) session_id: u64,
    pub(crate) group_id: Uuid,
    tx: mpsc::UnboundedSender<SessionCommand>,
    /// Why the session ended for good, if it did
    ended: Arc<OnceLock<BackendError>>,
}

impl SessionHandle {
    pub async fn attach(&self, identity: Identity) -> Result<AttachGrant, AttachError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Attach { identity, reply })
            .map_err(|_| self.attach_refused())?;
        rx.await.map_err(|_| self.attach_refused())?
    }

    /// A retired session is `Closed` and may be reopened; one that ended
    /// on an error keeps failing with it
    fn attach_refused(&self) -> AttachError {
        match self.ended.get() {
            Some(e) => AttachError::Failed(e.clone()),
            None => AttachError::Closed,
        }
    }

    fn gone(&self) -> BackendError {
        self.ended.get().cloned().unwrap_or_else(session_closed)
    }

    pub async fn edit(&self, client_id: u64, operations: Vec<EditOperation>) -> Result<DocumentState, BackendError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Edit {
                client_id,
                operations,
                reply,
            })
            .map_err(|_| self.gone())?;
        rx.await.map_err(|_| self.gone())?
    }

    /// Fire and forget; safe to call from `Drop`
    pub fn detach(&self, client_id: u64) {
        let _ = self.tx.send(SessionCommand::Detach { client_id });
    }

    pub async fn snapshot(&self) -> Result<DocumentState, BackendError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Snapshot { reply })
            .map_err(|_| self.gone())?;
        rx.await.map_err(|_| self.gone())
    }

    /// Resolves once everything applied so far is durable
    pub async fn flush(&self) -> Result<(), BackendError> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(SessionCommand::Flush { reply }).is_err() {
            // Retired sessions persisted on the way out
            return Ok(());
        }
        rx.await.map_err(|_| session_closed())?
    }

    /// End the session: unsaved changes are dropped and attached clients
    /// are cut off. Fire and forget.
    pub fn close(&self, reason: BackendError) {
        let _ = self.tx.send(SessionCommand::Close { reason });
    }
}

/// Start a session task for `document_id`, owned by `group_id`
pub(crate) fn spawn(
    document_id: Uuid,
    group_id: Uuid,
    session_id: u64,
    config: SessionConfig,
    registry: RegistryHandle,
) -> SessionHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let ended = Arc::new(OnceLock::new());
    let handle = SessionHandle {
        session_id,
        group_id,
        tx: tx.clone(),
        ended: ended.clone(),
    };
    tokio::spawn(run(document_id, session_id, config, registry, tx, rx, ended));
    handle
}

async fn run(
    document_id: Uuid,
    session_id: u64,
    config: SessionConfig,
    registry: RegistryHandle,
    tx: mpsc::UnboundedSender<SessionCommand>,
    mut rx: mpsc::UnboundedReceiver<SessionCommand>,
    ended: Arc<OnceLock<BackendError>>,
) {
    tracing::debug!("[Collab] Loading document {}", document_id);
    let doc = match load(&config, document_id).await {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!("[Collab] Could not load document {}: {}", document_id, e);
            // Set before the channel closes so a late attach sees it
            let _ = ended.set(e.clone());
            registry.retire(document_id, session_id).await;
            rx.close();
            while let Some(command) = rx.recv().await {
                reject(command, &e);
            }
            return;
        }
    };
    tracing::info!("[Collab] Document {} active (version {})", document_id, doc.version());

    let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
    // Armed until the first attach, in case the opener gave up
    let idle_deadline = Some(Instant::now() + config.idle_grace);
    let mut session = Session {
        document_id,
        session_id,
        config,
        registry,
        tx,
        doc,
        events,
        clients: HashMap::new(),
        next_client_id: 1,
        dirty: false,
        persist_in_flight: false,
        flush_waiters: Vec::new(),
        idle_deadline,
        retiring: false,
        ended,
    };
    session.run(rx).await;
}

/// Read the stored snapshot, retrying a failed read once
async fn load(config: &SessionConfig, document_id: Uuid) -> Result<Box<dyn CrdtDocument>, BackendError> {
    let stored = match config.store.load_document_state(document_id).await {
        Err(StoreError::Backend(first)) => {
            tracing::debug!("[Collab] Retrying load of {} after: {}", document_id, first);
            config.store.load_document_state(document_id).await
        }
        other => other,
    };
    match stored {
        Ok(Some(bytes)) => Ok(config.engine.load(&bytes)?),
        Ok(None) => Ok(config.engine.empty()),
        Err(StoreError::NotFound) => Err(BackendError::not_found("Document not found")),
        Err(e) => Err(BackendError::storage(format!("could not load document: {}", e))),
    }
}

/// Answer a command that arrived for a session that never loaded
fn reject(command: SessionCommand, error: &BackendError) {
    match command {
        SessionCommand::Attach { reply, .. } => {
            let _ = reply.send(Err(AttachError::Failed(error.clone())));
        }
        SessionCommand::Edit { reply, .. } => {
            let _ = reply.send(Err(error.clone()));
        }
        SessionCommand::Flush { reply } => {
            let _ = reply.send(Ok(()));
        }
        SessionCommand::Snapshot { .. }
        | SessionCommand::Detach { .. }
        | SessionCommand::PersistDone { .. }
        | SessionCommand::Close { .. } => {}
    }
}

struct Client {
    user_id: Uuid,
    agent: String,
}

struct Session {
    document_id: Uuid,
    session_id: u64,
    config: SessionConfig,
    registry: RegistryHandle,
    tx: mpsc::UnboundedSender<SessionCommand>,
    doc: Box<dyn CrdtDocument>,
    events: broadcast::Sender<SessionEvent>,
    clients: HashMap<u64, Client>,
    next_client_id: u64,
    dirty: bool,
    persist_in_flight: bool,
    flush_waiters: Vec<oneshot::Sender<Result<(), BackendError>>>,
    idle_deadline: Option<Instant>,
    retiring: bool,
    ended: Arc<OnceLock<BackendError>>,
}

impl Session {
    async fn run(&mut self, mut rx: mpsc::UnboundedReceiver<SessionCommand>) {
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = idle_timer(self.idle_deadline) => {
                    tracing::debug!("[Collab] Document {} idle, retiring", self.document_id);
                    self.idle_deadline = None;
                    self.retiring = true;
                }
            }

            if self.retiring && self.clients.is_empty() && !self.persist_in_flight && self.final_persist().await {
                self.registry.retire(self.document_id, self.session_id).await;
                rx.close();
                while let Some(command) = rx.recv().await {
                    self.handle_after_retire(command);
                }
                tracing::info!("[Collab] Document {} unloaded", self.document_id);
                break;
            }
        }
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Attach { identity, reply } => {
                if let Some(e) = self.ended.get() {
                    let _ = reply.send(Err(AttachError::Failed(e.clone())));
                    return;
                }
                let client_id = self.next_client_id;
                self.next_client_id += 1;
                self.clients.insert(
                    client_id,
                    Client {
                        user_id: identity.user_id,
                        agent: format!("srv-{}", Uuid::new_v4().simple()),
                    },
                );
                self.idle_deadline = None;
                self.retiring = false;
                let grant = AttachGrant {
                    client_id,
                    state: self.doc.state(),
                    events: self.events.subscribe(),
                };
                tracing::debug!(
                    "[Collab] User {} attached to {} as client {} ({} attached)",
                    identity.user_id,
                    self.document_id,
                    client_id,
                    self.clients.len()
                );
                if reply.send(Ok(grant)).is_err() {
                    self.detach(client_id);
                }
            }
            SessionCommand::Edit {
                client_id,
                operations,
                reply,
            } => {
                let _ = reply.send(self.apply(client_id, &operations));
            }
            SessionCommand::Detach { client_id } => self.detach(client_id),
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.doc.state());
            }
            SessionCommand::Flush { reply } => {
                if !self.dirty && !self.persist_in_flight {
                    let _ = reply.send(Ok(()));
                } else {
                    self.flush_waiters.push(reply);
                    self.schedule_persist();
                }
            }
            SessionCommand::PersistDone { result } => self.persist_done(result),
            SessionCommand::Close { reason } => self.close(reason),
        }
    }

    fn handle_after_retire(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Attach { reply, .. } => {
                let refusal = match self.ended.get() {
                    Some(e) => AttachError::Failed(e.clone()),
                    None => AttachError::Closed,
                };
                let _ = reply.send(Err(refusal));
            }
            SessionCommand::Edit { reply, .. } => {
                let _ = reply.send(Err(self.ended.get().cloned().unwrap_or_else(session_closed)));
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.doc.state());
            }
            SessionCommand::Flush { reply } => {
                let _ = reply.send(Ok(()));
            }
            SessionCommand::Detach { .. } | SessionCommand::PersistDone { .. } | SessionCommand::Close { .. } => {}
        }
    }

    /// Terminal: drop unsaved state, cut off every client, and retire as
    /// soon as no write is in flight
    fn close(&mut self, reason: BackendError) {
        if self.ended.set(reason.clone()).is_err() {
            return;
        }
        tracing::info!(
            "[Collab] Closing document {} ({} attached): {}",
            self.document_id,
            self.clients.len(),
            reason
        );
        self.dirty = false;
        self.clients.clear();
        // Replacing the only sender ends every client's event stream
        self.events = broadcast::channel(1).0;
        for waiter in self.flush_waiters.drain(..) {
            let _ = waiter.send(Err(reason.clone()));
        }
        self.idle_deadline = None;
        self.retiring = true;
    }

    fn detach(&mut self, client_id: u64) {
        if let Some(client) = self.clients.remove(&client_id) {
            tracing::debug!(
                "[Collab] User {} detached from {} ({} attached)",
                client.user_id,
                self.document_id,
                self.clients.len()
            );
        }
        if self.clients.is_empty() && self.idle_deadline.is_none() {
            self.idle_deadline = Some(Instant::now() + self.config.idle_grace);
        }
    }

    /// Apply a batch in order. Bounds are checked for the whole batch up
    /// front where lengths are known; a patch makes later lengths unknown,
    /// so anything after one is checked as it is applied.
    fn apply(&mut self, client_id: u64, operations: &[EditOperation]) -> Result<DocumentState, BackendError> {
        let agent = self
            .clients
            .get(&client_id)
            .map(|c| c.agent.clone())
            .ok_or_else(|| match self.ended.get() {
                Some(e) => e.clone(),
                None => BackendError::not_authorized("client is not attached"),
            })?;

        check_bounds(self.doc.len(), operations)?;

        let mut applied = 0;
        let mut failure = None;
        for op in operations {
            match self.doc.apply(&agent, op) {
                Ok(()) => applied += 1,
                Err(e) => {
                    failure = Some(BackendError::from(e));
                    break;
                }
            }
        }

        if applied > 0 {
            let state = self.doc.state();
            let _ = self.events.send(SessionEvent {
                author: client_id,
                state,
            });
            self.dirty = true;
            self.schedule_persist();
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(self.doc.state()),
        }
    }

    fn schedule_persist(&mut self) {
        if self.persist_in_flight || !self.dirty {
            return;
        }
        self.persist_in_flight = true;
        self.dirty = false;

        let store = self.config.store.clone();
        let tx = self.tx.clone();
        let document_id = self.document_id;
        let snapshot = self.doc.snapshot();
        tokio::spawn(async move {
            let result = store.save_document_state(document_id, &snapshot).await;
            let _ = tx.send(SessionCommand::PersistDone { result });
        });
    }

    fn persist_done(&mut self, result: Result<(), StoreError>) {
        self.persist_in_flight = false;
        if self.ended.get().is_some() {
            return;
        }
        match result {
            Ok(()) => {
                tracing::debug!("[Collab] Persisted document {}", self.document_id);
                if self.dirty {
                    self.schedule_persist();
                } else {
                    for waiter in self.flush_waiters.drain(..) {
                        let _ = waiter.send(Ok(()));
                    }
                }
            }
            Err(StoreError::NotFound) => self.close(document_deleted()),
            Err(e) => {
                tracing::warn!("[Collab] Persist of {} failed, will retry: {}", self.document_id, e);
                self.dirty = true;
                let error = BackendError::from(e);
                for waiter in self.flush_waiters.drain(..) {
                    let _ = waiter.send(Err(error.clone()));
                }
            }
        }
    }

    /// Write any unsaved state before unloading. On failure the session
    /// stays resident and tries again after another grace period, unless
    /// the document itself is gone.
    async fn final_persist(&mut self) -> bool {
        if self.dirty {
            let snapshot = self.doc.snapshot();
            let result = self.config.store.save_document_state(self.document_id, &snapshot).await;
            if let Err(StoreError::NotFound) = result {
                self.close(document_deleted());
                return true;
            }
            if let Err(e) = result {
                tracing::warn!(
                    "[Collab] Final persist of {} failed, staying loaded: {}",
                    self.document_id,
                    e
                );
                self.retiring = false;
                self.idle_deadline = Some(Instant::now() + self.config.idle_grace);
                return false;
            }
            self.dirty = false;
        }
        for waiter in self.flush_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        true
    }
}

async fn idle_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Walk the batch with the document length it would have after each step
fn check_bounds(mut len: usize, operations: &[EditOperation]) -> Result<(), BackendError> {
    for op in operations {
        match op {
            EditOperation::Insert { position, text } => {
                if *position > len {
                    return Err(BackendError::validation(format!(
                        "insert position {} is past the end of the document (length {})",
                        position, len
                    )));
                }
                len += text.chars().count();
            }
            EditOperation::Delete { start, end } => {
                if start >= end || *end > len {
                    return Err(BackendError::validation(format!(
                        "delete range {}..{} is outside the document (length {})",
                        start, end, len
                    )));
                }
                len -= end - start;
            }
            EditOperation::Patch { .. } => return Ok(()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::ErrorKind;

    #[test]
    fn test_check_bounds_tracks_length_through_batch() {
        let ops = vec![EditOperation::insert(0, "abc"), EditOperation::insert(3, "def")];
        assert!(check_bounds(0, &ops).is_ok());

        let ops = vec![EditOperation::insert(0, "abc"), EditOperation::delete(0, 4)];
        let err = check_bounds(0, &ops).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_check_bounds_stops_at_patch() {
        let ops = vec![
            EditOperation::Patch { data: vec![1] },
            EditOperation::insert(100, "x"),
        ];
        assert!(check_bounds(0, &ops).is_ok());
    }

    fn detached_handle() -> (SessionHandle, mpsc::UnboundedReceiver<SessionCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            session_id: 1,
            group_id: Uuid::new_v4(),
            tx,
            ended: Arc::new(OnceLock::new()),
        };
        (handle, rx)
    }

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            name: "A".to_string(),
        }
    }

    #[tokio::test]
    async fn test_flush_without_reply_is_an_error() {
        let (handle, mut rx) = detached_handle();
        // A task that takes the command and dies without answering
        tokio::spawn(async move {
            let _ = rx.recv().await;
        });

        let err = handle.flush().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_retired_session_can_be_reopened() {
        let (handle, rx) = detached_handle();
        drop(rx);
        assert!(matches!(handle.attach(identity()).await, Err(AttachError::Closed)));
    }

    #[tokio::test]
    async fn test_ended_session_keeps_its_error() {
        let (handle, rx) = detached_handle();
        let _ = handle.ended.set(BackendError::storage("could not load document"));
        drop(rx);

        match handle.attach(identity()).await {
            Err(AttachError::Failed(e)) => assert_eq!(e.kind(), ErrorKind::StorageError),
            Err(AttachError::Closed) => panic!("Expected the load error, got Closed"),
            Ok(_) => panic!("Expected the load error, got a grant"),
        }
        let err = handle.edit(1, vec![EditOperation::insert(0, "x")]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageError);
    }

    #[test]
    fn test_first_bad_op_rejects_whole_batch() {
        let ops = vec![EditOperation::insert(0, "ok"), EditOperation::insert(10, "bad")];
        assert!(check_bounds(0, &ops).is_err());
    }
}
