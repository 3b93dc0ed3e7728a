//! Object Store Module
//!
//! Binary storage for uploaded files, keyed `<groupCode>/<timestamp>-<name>`.
//! There is deliberately no foreign key from an object to its group: the
//! group code prefix is the only link, and listings are prefix scans.
//!
//! - **`keys`** - Key layout, upload name cleaning, display names
//! - **`signing`** - HMAC-SHA256 signed download URLs
//! - **`local`** - Filesystem implementation
//! - **`memory`** - In-process implementation

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Object key layout and name handling
pub mod keys;

/// Signed download URLs
pub mod signing;

/// Filesystem object store
pub mod local;

/// In-memory object store
pub mod memory;

pub use keys::{display_name, KeyClock};
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use signing::UrlSigner;

/// One stored object as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    #[error("object store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Binary object store with signed-URL issuance
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous object
    async fn put(&self, key: &str, bytes: Bytes) -> Result<ObjectEntry, ObjectStoreError>;

    /// Every object whose key starts with `prefix`, in key order
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, ObjectStoreError>;

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;

    /// A download URL for `key` that stops working after `ttl`
    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError>;
}
