use crate::startup::AppState;
use crate::sweeper::run_retention_sweep;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use service_core::error::AppError;
use service_core::utils::signature::constant_time_eq;
use std::sync::Arc;

/// Scheduler-triggered retention sweep, authorized by the shared cron
/// secret rather than a user token.
pub async fn cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing cron secret")))?;

    if !constant_time_eq(
        token.as_bytes(),
        state.config.cron_secret.expose_secret().as_bytes(),
    ) {
        return Err(AppError::Unauthorized(anyhow::anyhow!("Invalid cron secret")));
    }

    let report = run_retention_sweep(
        Arc::clone(&state.usage),
        Arc::clone(&state.storage),
        state.config.retention_hours,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "scanned": report.scanned,
        "deleted": report.deleted,
        "errors": report.errors,
    })))
}
