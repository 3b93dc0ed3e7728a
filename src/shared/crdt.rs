/**
 * Shared CRDT Types
 *
 * This module defines the messages exchanged over a document session
 * WebSocket. Text frames carry JSON `ClientMessage`/`ServerMessage` values;
 * binary frames from the client carry an encoded diamond-types patch and are
 * turned into `EditOperation::Patch` by the server.
 */

use serde::{Deserialize, Serialize};

use crate::shared::error::{ErrorKind, SharedError};

/// One edit submitted by a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditOperation {
    /// Insert text at a character position
    Insert {
        /// Position in the document (character index)
        position: usize,
        /// Text to insert
        text: String,
    },
    /// Delete a character range
    Delete {
        /// Start position (inclusive)
        start: usize,
        /// End position (exclusive)
        end: usize,
    },
    /// Encoded oplog fragment produced by a client-side diamond-types replica
    Patch {
        data: Vec<u8>,
    },
}

impl EditOperation {
    /// Create a new insert operation
    pub fn insert(position: usize, text: impl Into<String>) -> Self {
        Self::Insert {
            position,
            text: text.into(),
        }
    }

    /// Create a new delete operation
    pub fn delete(start: usize, end: usize) -> Self {
        Self::Delete { start, end }
    }

    /// Shape checks that don't need the document
    pub fn validate(&self) -> Result<(), SharedError> {
        match self {
            EditOperation::Insert { text, .. } if text.is_empty() => {
                Err(SharedError::validation("text", "insert text must not be empty"))
            }
            EditOperation::Delete { start, end } if start >= end => Err(SharedError::validation(
                "end",
                format!("empty or inverted delete range {}..{}", start, end),
            )),
            EditOperation::Patch { data } if data.is_empty() => {
                Err(SharedError::validation("data", "patch must not be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Document state as seen by a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DocumentState {
    /// The document text
    pub content: String,
    /// Number of operations in the oplog; grows with every merged change
    pub version: usize,
}

/// Frames a client may send on a document session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Apply operations in order
    Edit { operations: Vec<EditOperation> },
    /// Ask for the full current state
    Resync,
}

impl ClientMessage {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, SharedError> {
        let message: ClientMessage = serde_json::from_str(text)?;
        if let ClientMessage::Edit { operations } = &message {
            if operations.is_empty() {
                return Err(SharedError::validation("operations", "no operations supplied"));
            }
            for op in operations {
                op.validate()?;
            }
        }
        Ok(message)
    }
}

/// Frames the server sends on a document session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame after a successful attach, and the answer to `resync`
    Snapshot {
        client_id: u64,
        content: String,
        version: usize,
    },
    /// A change merged by any client, the receiving one included
    Update {
        author: u64,
        content: String,
        version: usize,
    },
    /// Non-fatal problem with the last frame this client sent
    Error { kind: ErrorKind, error: String },
}
