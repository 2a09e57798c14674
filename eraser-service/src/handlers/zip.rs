//! Batch download: fetch a set of result URLs and stream them back as one
//! ZIP archive.

use crate::middleware::AuthUser;
use crate::startup::AppState;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::Json;
use serde::Deserialize;
use service_core::error::AppError;
use std::io::{Cursor, Write};
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const MAX_ZIP_URLS: usize = 50;

#[derive(Debug, Deserialize)]
pub struct ZipRequest {
    pub urls: Vec<String>,
}

/// Name an archive entry after the URL's last path segment, falling back to
/// a positional name.
fn entry_name(url: &str, index: usize) -> String {
    let candidate = url
        .split('?')
        .next()
        .unwrap_or_default()
        .rsplit('/')
        .next()
        .unwrap_or_default();
    if candidate.is_empty() {
        format!("image-{}.png", index + 1)
    } else {
        candidate.to_string()
    }
}

pub async fn download_zip(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(body): Json<ZipRequest>,
) -> Result<(HeaderMap, Vec<u8>), AppError> {
    if body.urls.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("No URLs provided")));
    }
    if body.urls.len() > MAX_ZIP_URLS {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "At most {} URLs per archive",
            MAX_ZIP_URLS
        )));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    let mut added = 0usize;

    for (index, url) in body.urls.iter().enumerate() {
        // Unreachable URLs are skipped; the archive ships whatever resolved.
        let bytes = match state.fetcher.fetch(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %url, error = %e, "Skipping unreachable archive entry");
                continue;
            }
        };

        writer
            .start_file(entry_name(url, index), options)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Archive error: {}", e)))?;
        writer
            .write_all(&bytes)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Archive error: {}", e)))?;
        added += 1;
    }

    let cursor = writer
        .finish()
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Archive error: {}", e)))?;
    let archive = cursor.into_inner();

    tracing::info!(requested = body.urls.len(), added = added, "ZIP archive built");

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"bg-eraser-images.zip\""),
    );
    Ok((headers, archive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_names_come_from_url_paths() {
        assert_eq!(
            entry_name("https://cdn.example.com/a/b/out.png?sig=x", 0),
            "out.png"
        );
        assert_eq!(entry_name("https://cdn.example.com/", 2), "image-3.png");
    }
}
