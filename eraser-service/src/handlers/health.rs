use crate::services::metrics::get_metrics;
use crate::startup::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use service_core::error::AppError;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness: verifies the database connection when one is configured.
pub async fn ready(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    if let Some(mongo) = &state.mongo {
        mongo.health_check().await?;
    }
    Ok(Json(json!({ "status": "ready" })))
}

pub async fn metrics() -> String {
    get_metrics()
}
