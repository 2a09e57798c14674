//! Background-removal endpoint: accepts multipart uploads or base64 JSON,
//! plus the per-user processing history.

use crate::intake::{self, JsonIntake};
use crate::middleware::AuthUser;
use crate::models::{UsageLogEntry, UsageStatus};
use crate::services::usage::UsageQuery;
use crate::startup::AppState;
use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use service_core::error::AppError;
use uuid::Uuid;

/// POST: run background removal over the request's images. The body is
/// either `multipart/form-data` (`image`/`images` fields) or JSON with
/// base64 data URIs.
pub async fn process(
    State(state): State<AppState>,
    user: AuthUser,
    request: Request,
) -> Result<Json<Value>, AppError> {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let images = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid multipart body: {}", e)))?;
        intake::from_multipart(multipart).await?
    } else {
        let Json(body) = Json::<JsonIntake>::from_request(request, &state)
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid JSON body: {}", e)))?;
        intake::from_json(body)?
    };

    let response = state
        .processor()
        .process(&user.user_id, &request_id, images)
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogView {
    id: Uuid,
    model_id: String,
    status: &'static str,
    credits_used: i64,
    request_id: String,
    original_key: Option<String>,
    processed_key: Option<String>,
    processing_time_ms: Option<i64>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<UsageLogEntry> for LogView {
    fn from(entry: UsageLogEntry) -> Self {
        Self {
            id: entry.id,
            model_id: entry.model_id,
            status: entry.status.as_str(),
            credits_used: entry.credits_used,
            request_id: entry.request_id,
            original_key: entry.original_key,
            processed_key: entry.processed_key,
            processing_time_ms: entry.processing_time_ms,
            error_message: entry.error_message,
            created_at: entry.created_at.to_rfc3339(),
            updated_at: entry.updated_at.to_rfc3339(),
        }
    }
}

fn parse_status(raw: &str) -> Result<UsageStatus, AppError> {
    match raw {
        "processing" => Ok(UsageStatus::Processing),
        "success" => Ok(UsageStatus::Success),
        "error" => Ok(UsageStatus::Error),
        "deleted" => Ok(UsageStatus::Deleted),
        other => Err(AppError::BadRequest(anyhow::anyhow!(
            "Unknown status filter: {}",
            other
        ))),
    }
}

/// GET: paginated processing history plus aggregate statistics.
pub async fn logs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<LogsQuery>,
) -> Result<Json<Value>, AppError> {
    let defaults = UsageQuery::default();
    let query = UsageQuery {
        page: params.page.unwrap_or(defaults.page),
        limit: params.limit.unwrap_or(defaults.limit),
        status: params.status.as_deref().map(parse_status).transpose()?,
    };

    let page = state.usage.list(&user.user_id, &query).await?;
    let logs: Vec<LogView> = page.entries.into_iter().map(LogView::from).collect();

    Ok(Json(json!({
        "success": true,
        "logs": logs,
        "pagination": {
            "page": query.page,
            "limit": query.limit,
            "total": page.total,
        },
        "statistics": page.stats,
    })))
}
