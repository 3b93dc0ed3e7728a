/**
 * Resource Aggregator
 *
 * One authorized view over a group's uploaded files and registered
 * documents. Files come from an object-store prefix scan and each gets an
 * expiring download link; documents come from the relational store. Both
 * sources are read concurrently and merged into display order.
 *
 * # Uploads
 *
 * Uploads naming a group need membership and land under `<code>/`. Uploads
 * without a group go to the shared `general` namespace, open to any
 * signed-in user. The size cap is inclusive.
 *
 * # Usage
 *
 * `group_usage` sums a full prefix listing, so its cost grows with the
 * number of files in the group.
 */

use bytes::Bytes;
use futures_util::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::backend::groups::MembershipGuard;
use crate::backend::objects::keys::{clean_upload_name, namespace_prefix, object_key, DEFAULT_NAMESPACE};
use crate::backend::objects::{display_name, KeyClock, ObjectEntry, ObjectStore, UrlSigner};
use crate::backend::store::{DocumentRecord, RelationalStore};
use crate::shared::{sort_resources, GroupUsage, Resource, ResourceKind, ResourceListing, UploadResponse};

pub const DEFAULT_URL_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    /// Lifetime of issued download links
    pub url_ttl: Duration,
    /// Largest accepted upload, inclusive
    pub max_upload_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            url_ttl: DEFAULT_URL_TTL,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// A verified download
#[derive(Debug)]
pub struct Download {
    pub name: String,
    pub bytes: Bytes,
}

pub struct ResourceAggregator {
    store: Arc<dyn RelationalStore>,
    objects: Arc<dyn ObjectStore>,
    guard: Arc<MembershipGuard>,
    signer: UrlSigner,
    limits: ResourceLimits,
    clock: KeyClock,
}

impl ResourceAggregator {
    pub fn new(
        store: Arc<dyn RelationalStore>,
        objects: Arc<dyn ObjectStore>,
        guard: Arc<MembershipGuard>,
        signer: UrlSigner,
        limits: ResourceLimits,
    ) -> Self {
        Self {
            store,
            objects,
            guard,
            signer,
            limits,
            clock: KeyClock::new(),
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.limits.max_upload_bytes
    }

    pub async fn list_resources(&self, user_id: Uuid, code: &str) -> Result<ResourceListing, BackendError> {
        let group = self.guard.authorize(user_id, code).await?;
        let prefix = namespace_prefix(&group.code);

        let (entries, documents) = tokio::try_join!(
            async { self.objects.list(&prefix).await.map_err(BackendError::from) },
            async { self.store.list_documents(group.id).await.map_err(BackendError::from) },
        )?;
        let mut resources = try_join_all(entries.into_iter().map(|entry| self.file_resource(entry))).await?;
        resources.extend(documents.into_iter().map(doc_resource));
        sort_resources(&mut resources);

        tracing::debug!("[Resources] Listed {} resources for {}", resources.len(), group.code);
        Ok(ResourceListing {
            group_id: group.id,
            resources,
        })
    }

    async fn file_resource(&self, entry: ObjectEntry) -> Result<Resource, BackendError> {
        let url = self.objects.signed_url(&entry.key, self.limits.url_ttl).await?;
        Ok(Resource {
            kind: ResourceKind::File,
            name: display_name(&entry.key).to_string(),
            url: Some(url),
            size: Some(entry.size),
            last_modified: Some(entry.last_modified),
            key: entry.key,
        })
    }

    /// Store an upload; without a group code it goes to the shared namespace
    pub async fn upload_file(
        &self,
        user_id: Uuid,
        code: Option<&str>,
        bytes: Bytes,
        declared_name: &str,
    ) -> Result<UploadResponse, BackendError> {
        let namespace = match code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => self.guard.authorize(user_id, code).await?.code,
            None => DEFAULT_NAMESPACE.to_string(),
        };
        if bytes.len() as u64 > self.limits.max_upload_bytes {
            return Err(too_large(self.limits.max_upload_bytes));
        }
        let name = clean_upload_name(declared_name).ok_or_else(|| BackendError::validation("A file name is required"))?;

        let key = object_key(&namespace, self.clock.next(), &name);
        let entry = self.objects.put(&key, bytes).await?;
        tracing::info!(
            "[Resources] User {} uploaded {} ({} bytes)",
            user_id,
            entry.key,
            entry.size
        );
        Ok(UploadResponse {
            key: entry.key,
            name,
            size: entry.size,
        })
    }

    pub async fn group_usage(&self, user_id: Uuid, code: &str) -> Result<GroupUsage, BackendError> {
        let group = self.guard.authorize(user_id, code).await?;
        let entries = self.objects.list(&namespace_prefix(&group.code)).await?;
        Ok(GroupUsage {
            file_count: entries.len() as u64,
            total_bytes: entries.iter().map(|e| e.size).sum(),
        })
    }

    /// Serve the object behind a signed link
    pub async fn download(&self, key: &str, expires: i64, signature: &str) -> Result<Download, BackendError> {
        self.signer.verify(key, expires, signature).map_err(|e| {
            tracing::debug!("[Resources] Rejected download of {}: {}", key, e);
            BackendError::not_authorized(e.to_string())
        })?;
        let bytes = self.objects.get(key).await?;
        Ok(Download {
            name: display_name(key).to_string(),
            bytes,
        })
    }
}

pub fn too_large(limit: u64) -> BackendError {
    BackendError::too_large(format!("File exceeds the {} byte upload limit", limit))
}

fn doc_resource(record: DocumentRecord) -> Resource {
    Resource {
        kind: ResourceKind::Doc,
        key: record.id.to_string(),
        name: record.name,
        url: None,
        size: None,
        last_modified: Some(record.updated_at),
    }
}
