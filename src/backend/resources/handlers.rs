/**
 * Resource Handlers
 *
 * - `GET /api/groups/{code}/resources` - Files and documents, display order
 * - `GET /api/groups/{code}/usage` - File count and bytes for a group
 * - `POST /api/files/upload` - Multipart upload (`file`, optional `groupCode`)
 * - `GET /files/download/{*key}` - Signed download, no bearer token needed
 *
 * Upload bodies are read chunk by chunk and rejected with `413 too_large`
 * as soon as the file passes the configured cap.
 */

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use std::sync::Arc;

use crate::backend::error::BackendError;
use crate::backend::middleware::AuthUser;
use crate::backend::resources::aggregator::{too_large, ResourceAggregator};
use crate::shared::{GroupUsage, ResourceListing, UploadResponse};

/// Room for multipart framing and the other form fields on top of the file cap
pub const UPLOAD_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub expires: i64,
    pub signature: String,
}

fn multipart_error(e: MultipartError, limit: u64) -> BackendError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(limit)
    } else {
        BackendError::validation(e.body_text())
    }
}

pub async fn list_resources(
    State(resources): State<Arc<ResourceAggregator>>,
    AuthUser(identity): AuthUser,
    Path(code): Path<String>,
) -> Result<Json<ResourceListing>, BackendError> {
    Ok(Json(resources.list_resources(identity.user_id, &code).await?))
}

pub async fn group_usage(
    State(resources): State<Arc<ResourceAggregator>>,
    AuthUser(identity): AuthUser,
    Path(code): Path<String>,
) -> Result<Json<GroupUsage>, BackendError> {
    Ok(Json(resources.group_usage(identity.user_id, &code).await?))
}

pub async fn upload_file(
    State(resources): State<Arc<ResourceAggregator>>,
    AuthUser(identity): AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), BackendError> {
    let limit = resources.max_upload_bytes();
    let mut file: Option<(String, Bytes)> = None;
    let mut group_code: Option<String> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| multipart_error(e, limit))? {
        match field.name() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let mut data = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
                    if (data.len() + chunk.len()) as u64 > limit {
                        tracing::debug!("[Resources] Upload from {} over the limit", identity.user_id);
                        return Err(too_large(limit));
                    }
                    data.extend_from_slice(&chunk);
                }
                file = Some((name, data.freeze()));
            }
            Some("groupCode") => {
                group_code = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            _ => {}
        }
    }

    let (name, bytes) = file.ok_or_else(|| BackendError::validation("No file provided"))?;
    let uploaded = resources
        .upload_file(identity.user_id, group_code.as_deref(), bytes, &name)
        .await?;
    Ok((StatusCode::CREATED, Json(uploaded)))
}

pub async fn download_file(
    State(resources): State<Arc<ResourceAggregator>>,
    Path(key): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<impl IntoResponse, BackendError> {
    let download = resources.download(&key, query.expires, &query.signature).await?;
    let disposition = format!("attachment; filename=\"{}\"", download.name.replace('"', "_"));
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    ))
}
