/**
 * Filesystem Object Store
 *
 * Objects live at `<root>/<key>`. Writes go to a temporary sibling first
 * and are renamed into place, so a listing never reports a half-written
 * file. Download URLs point back at this server's signed download route.
 */

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::keys::validate_key;
use super::signing::UrlSigner;
use super::{ObjectEntry, ObjectStore, ObjectStoreError};

const TEMP_SUFFIX: &str = ".partial";

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    signer: UrlSigner,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, signer: UrlSigner) -> Self {
        Self {
            root: root.into(),
            signer,
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        Some(parts?.join("/"))
    }

    async fn entry_for(&self, key: String, path: &Path) -> Result<ObjectEntry, ObjectStoreError> {
        let metadata = tokio::fs::metadata(path).await?;
        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(ObjectEntry {
            key,
            size: metadata.len(),
            last_modified,
        })
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<ObjectEntry, ObjectStoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut temp = path.clone().into_os_string();
        temp.push(TEMP_SUFFIX);
        let temp = PathBuf::from(temp);

        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &path).await?;

        tracing::debug!("[Objects] Stored {} ({} bytes)", key, bytes.len());
        self.entry_for(key.to_string(), &path).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, ObjectStoreError> {
        // Start from the deepest directory named by the prefix
        let dir_part = match prefix.rfind('/') {
            Some(i) => &prefix[..i],
            None => "",
        };
        let start = if dir_part.is_empty() {
            self.root.clone()
        } else {
            self.path_for(dir_part)?
        };

        let mut entries = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut reader = match tokio::fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(item) = reader.next_entry().await? {
                let path = item.path();
                let file_type = item.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Some(key) = self.key_for(&path) else {
                    continue;
                };
                if key.ends_with(TEMP_SUFFIX) || !key.starts_with(prefix) {
                    continue;
                }
                entries.push(self.entry_for(key, &path).await?);
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ObjectStoreError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError> {
        validate_key(key)?;
        Ok(self.signer.signed_url(key, ttl))
    }
}
