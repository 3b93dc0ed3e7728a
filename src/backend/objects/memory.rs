//! In-memory object store for tests and storage-less runs

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;

use super::keys::validate_key;
use super::signing::UrlSigner;
use super::{ObjectEntry, ObjectStore, ObjectStoreError};

#[derive(Debug)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, (Bytes, DateTime<Utc>)>>,
    signer: UrlSigner,
}

impl MemoryObjectStore {
    pub fn new(signer: UrlSigner) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            signer,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<ObjectEntry, ObjectStoreError> {
        validate_key(key)?;
        let now = Utc::now();
        let size = bytes.len() as u64;
        self.objects.write().await.insert(key.to_string(), (bytes, now));
        Ok(ObjectEntry {
            key: key.to_string(),
            size,
            last_modified: now,
        })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, ObjectStoreError> {
        let objects = self.objects.read().await;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, (bytes, modified))| ObjectEntry {
                key: key.clone(),
                size: bytes.len() as u64,
                last_modified: *modified,
            })
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError> {
        validate_key(key)?;
        Ok(self.signer.signed_url(key, ttl))
    }
}
