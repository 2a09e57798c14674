//! Capability-URL endpoints: read access to stored objects and direct
//! client uploads.

use crate::intake::MAX_IMAGE_BYTES;
use crate::middleware::AuthUser;
use crate::services::storage::{
    is_absolute_url, object_key, ObjectRole, DEFAULT_READ_EXPIRY_SECS, DEFAULT_UPLOAD_EXPIRY_SECS,
};
use crate::startup::AppState;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use service_core::error::AppError;
use std::time::Duration;

const MAX_UPLOAD_URLS: usize = 10;
const ALLOWED_UPLOAD_TYPES: [&str; 5] = [
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/gif",
    "image/webp",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlRequest {
    pub key: String,
    pub expires_in_seconds: Option<u64>,
}

/// Mint a read URL for a stored object. Keys that are already absolute
/// URLs pass through unchanged.
pub async fn signed_url(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(body): Json<SignedUrlRequest>,
) -> Result<Json<Value>, AppError> {
    if body.key.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("Missing key")));
    }

    if is_absolute_url(&body.key) {
        return Ok(Json(json!({ "success": true, "url": body.key })));
    }

    let expiry = Duration::from_secs(body.expires_in_seconds.unwrap_or(DEFAULT_READ_EXPIRY_SECS));
    let url = state.storage.presign_get(&body.key, expiry).await?;
    Ok(Json(json!({ "success": true, "url": url })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlsRequest {
    pub files: Vec<UploadFileSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileSpec {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

fn extension_for_upload(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// Mint presigned PUT/GET pairs for a batch of direct client uploads.
pub async fn upload_urls(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(body): Json<UploadUrlsRequest>,
) -> Result<Json<Value>, AppError> {
    if body.files.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("No files requested")));
    }
    if body.files.len() > MAX_UPLOAD_URLS {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "At most {} files per request",
            MAX_UPLOAD_URLS
        )));
    }

    for file in &body.files {
        if !ALLOWED_UPLOAD_TYPES.contains(&file.content_type.as_str()) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Unsupported content type: {}",
                file.content_type
            )));
        }
        if file.size as usize > MAX_IMAGE_BYTES {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "{} exceeds the {} MB limit",
                file.filename,
                MAX_IMAGE_BYTES / (1024 * 1024)
            )));
        }
    }

    let mut files = Vec::with_capacity(body.files.len());
    for file in body.files {
        let key = object_key(
            "uploads",
            ObjectRole::Original,
            extension_for_upload(&file.content_type),
        );
        let upload_url = state
            .storage
            .presign_put(
                &key,
                &file.content_type,
                Duration::from_secs(DEFAULT_UPLOAD_EXPIRY_SECS),
            )
            .await?;
        let file_url = state
            .storage
            .presign_get(&key, Duration::from_secs(DEFAULT_READ_EXPIRY_SECS))
            .await?;

        files.push(json!({
            "filename": file.filename,
            "key": key,
            "uploadUrl": upload_url,
            "fileUrl": file_url,
        }));
    }

    Ok(Json(json!({ "success": true, "files": files })))
}
