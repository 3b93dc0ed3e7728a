/**
 * Collaborative Editing Handlers
 *
 * - `GET /collab/{document_id}` - Document session WebSocket
 * - `GET|POST /api/groups/{code}/documents` - Document registry
 *
 * # Session protocol
 *
 * The token comes from `Authorization: Bearer` or a `token` query
 * parameter and is checked before the upgrade; a bad token is a plain
 * `401`. After the upgrade the server attaches the connection and sends a
 * `snapshot` frame, then `update` frames for every merged change. Clients
 * send `edit`/`resync` text frames or binary diamond-types patches, one at
 * a time; each edit is acknowledged by the `update` it produces.
 *
 * A failed attach closes the socket with an application close code and the
 * error kind as the reason:
 *
 * | code | reason |
 * |------|--------|
 * | 4401 | `not_authorized` |
 * | 4404 | `not_found` |
 * | 4408 | `timeout` |
 * | 4500 | `storage_error` |
 * | 4000 | anything else |
 *
 * A live connection whose document is deleted is closed with 4404.
 */

use axum::{
    extract::{
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::auth::Identity;
use crate::backend::collab::bridge::{AttachmentEvent, DocumentSyncBridge, SessionAttachment};
use crate::backend::collab::documents::DocumentRegistry;
use crate::backend::error::BackendError;
use crate::backend::middleware::{bearer_token, ApiJson, AuthUser};
use crate::shared::{ClientMessage, DocumentState, DocumentSummary, EditOperation, ErrorKind, ServerMessage};

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateDocumentRequest {
    pub name: String,
}

pub fn close_code(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::NotAuthorized => 4401,
        ErrorKind::NotFound => 4404,
        ErrorKind::Timeout => 4408,
        ErrorKind::StorageError => 4500,
        _ => 4000,
    }
}

pub async fn document_session(
    State(bridge): State<DocumentSyncBridge>,
    Path(raw_id): Path<String>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, BackendError> {
    let token = bearer_token(&headers)
        .map(str::to_string)
        .or(query.token)
        .ok_or_else(|| BackendError::not_authorized("missing session token"))?;
    let identity = bridge.authenticate(&token)?;
    let document_id = Uuid::parse_str(&raw_id).ok();

    Ok(ws.on_upgrade(move |socket| run_connection(socket, bridge, document_id, identity)))
}

async fn run_connection(
    mut socket: WebSocket,
    bridge: DocumentSyncBridge,
    document_id: Option<Uuid>,
    identity: Identity,
) {
    let Some(document_id) = document_id else {
        close_with(&mut socket, &BackendError::not_found("Document not found")).await;
        return;
    };

    let mut attachment = match bridge.attach(document_id, &identity).await {
        Ok(attachment) => attachment,
        Err(e) => {
            tracing::info!(
                "[Collab] Rejected {} on document {}: {}",
                identity.user_id,
                document_id,
                e
            );
            close_with(&mut socket, &e).await;
            return;
        }
    };
    tracing::info!(
        "[Collab] User {} connected to document {} as client {}",
        identity.user_id,
        document_id,
        attachment.client_id()
    );

    let initial = snapshot_message(attachment.client_id(), attachment.initial_state().clone());
    if send(&mut socket, &initial).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let reply = match incoming {
                    Some(Ok(Message::Text(text))) => match ClientMessage::parse(text.as_str()) {
                        Ok(message) => handle_message(&attachment, message).await,
                        Err(e) => Some(error_message(&BackendError::from(e))),
                    },
                    Some(Ok(Message::Binary(data))) => {
                        let message = ClientMessage::Edit {
                            operations: vec![EditOperation::Patch { data: data.to_vec() }],
                        };
                        handle_message(&attachment, message).await
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        tracing::debug!("[Collab] Socket error on client {}: {}", attachment.client_id(), e);
                        break;
                    }
                };
                if let Some(reply) = reply {
                    if send(&mut socket, &reply).await.is_err() {
                        break;
                    }
                }
            }
            event = attachment.next_event() => {
                let outgoing = match event {
                    Some(AttachmentEvent::Update(event)) => ServerMessage::Update {
                        author: event.author,
                        content: event.state.content,
                        version: event.state.version,
                    },
                    Some(AttachmentEvent::Lagged(_)) => match attachment.snapshot().await {
                        Ok(state) => snapshot_message(attachment.client_id(), state),
                        Err(e) => error_message(&e),
                    },
                    None => {
                        // Session ended under us; the document was removed
                        close_with(&mut socket, &BackendError::not_found("Document was deleted")).await;
                        break;
                    }
                };
                if send(&mut socket, &outgoing).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!(
        "[Collab] Client {} disconnected from document {}",
        attachment.client_id(),
        document_id
    );
}

/// Reply owed to the sender only; updates reach everyone through the event stream
async fn handle_message(attachment: &SessionAttachment, message: ClientMessage) -> Option<ServerMessage> {
    match message {
        ClientMessage::Edit { operations } => match attachment.edit(operations).await {
            Ok(_) => None,
            Err(e) => Some(error_message(&e)),
        },
        ClientMessage::Resync => Some(match attachment.snapshot().await {
            Ok(state) => snapshot_message(attachment.client_id(), state),
            Err(e) => error_message(&e),
        }),
    }
}

fn snapshot_message(client_id: u64, state: DocumentState) -> ServerMessage {
    ServerMessage::Snapshot {
        client_id,
        content: state.content,
        version: state.version,
    }
}

fn error_message(error: &BackendError) -> ServerMessage {
    ServerMessage::Error {
        kind: error.kind(),
        error: error.message(),
    }
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).map_err(axum::Error::new)?;
    socket.send(Message::Text(text.into())).await
}

async fn close_with(socket: &mut WebSocket, error: &BackendError) {
    let kind = error.kind();
    let frame = CloseFrame {
        code: close_code(kind),
        reason: Utf8Bytes::from_static(kind.as_str()),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

pub async fn list_documents(
    State(registry): State<Arc<DocumentRegistry>>,
    AuthUser(identity): AuthUser,
    Path(code): Path<String>,
) -> Result<Json<Vec<DocumentSummary>>, BackendError> {
    Ok(Json(registry.list_documents(identity.user_id, &code).await?))
}

pub async fn create_document(
    State(registry): State<Arc<DocumentRegistry>>,
    AuthUser(identity): AuthUser,
    Path(code): Path<String>,
    ApiJson(request): ApiJson<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentSummary>), BackendError> {
    let document = registry.create_document(identity.user_id, &code, &request.name).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_codes() {
        assert_eq!(close_code(ErrorKind::NotAuthorized), 4401);
        assert_eq!(close_code(ErrorKind::NotFound), 4404);
        assert_eq!(close_code(ErrorKind::Timeout), 4408);
        assert_eq!(close_code(ErrorKind::StorageError), 4500);
        assert_eq!(close_code(ErrorKind::Validation), 4000);
        assert_eq!(close_code(ErrorKind::Internal), 4000);
    }
}
