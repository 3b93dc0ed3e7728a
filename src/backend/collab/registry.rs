/**
 * Session Registry
 *
 * A single task owning the map of live document sessions. `open` returns
 * the running session for a document or spawns one; sessions remove
 * themselves with `retire` once they have unloaded.
 *
 * Each spawned session gets a fresh id, and `retire` only removes the entry
 * if the id still matches, so a late retire from an old session can never
 * evict its replacement.
 */

use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::backend::collab::session::{self, SessionConfig, SessionHandle};

enum RegistryCommand {
    Open {
        document_id: Uuid,
        group_id: Uuid,
        reply: oneshot::Sender<SessionHandle>,
    },
    Retire {
        document_id: Uuid,
        session_id: u64,
        ack: oneshot::Sender<()>,
    },
    All {
        reply: oneshot::Sender<Vec<(Uuid, SessionHandle)>>,
    },
}

#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::UnboundedSender<RegistryCommand>,
}

impl RegistryHandle {
    /// Start the registry task
    pub fn spawn(config: SessionConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self { tx };
        tokio::spawn(run(config, handle.clone(), rx));
        handle
    }

    /// The live session for a document, spawned if needed. `None` only if
    /// the registry task is gone.
    pub async fn open(&self, document_id: Uuid, group_id: Uuid) -> Option<SessionHandle> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::Open {
                document_id,
                group_id,
                reply,
            })
            .ok()?;
        rx.await.ok()
    }

    pub(crate) async fn retire(&self, document_id: Uuid, session_id: u64) {
        let (ack, rx) = oneshot::channel();
        if self
            .tx
            .send(RegistryCommand::Retire {
                document_id,
                session_id,
                ack,
            })
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Every live session
    pub async fn all(&self) -> Vec<(Uuid, SessionHandle)> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(RegistryCommand::All { reply }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

async fn run(config: SessionConfig, handle: RegistryHandle, mut rx: mpsc::UnboundedReceiver<RegistryCommand>) {
    let mut sessions: HashMap<Uuid, SessionHandle> = HashMap::new();
    let mut next_session_id: u64 = 1;

    while let Some(command) = rx.recv().await {
        match command {
            RegistryCommand::Open {
                document_id,
                group_id,
                reply,
            } => {
                let session = sessions
                    .entry(document_id)
                    .or_insert_with(|| {
                        let session_id = next_session_id;
                        next_session_id += 1;
                        tracing::debug!("[Collab] Spawning session {} for {}", session_id, document_id);
                        session::spawn(document_id, group_id, session_id, config.clone(), handle.clone())
                    })
                    .clone();
                let _ = reply.send(session);
            }
            RegistryCommand::Retire {
                document_id,
                session_id,
                ack,
            } => {
                if sessions.get(&document_id).map(|s| s.session_id) == Some(session_id) {
                    sessions.remove(&document_id);
                    tracing::debug!("[Collab] Session {} for {} retired", session_id, document_id);
                }
                let _ = ack.send(());
            }
            RegistryCommand::All { reply } => {
                let _ = reply.send(sessions.iter().map(|(id, s)| (*id, s.clone())).collect());
            }
        }
    }
}
