use crate::middleware::AuthUser;
use crate::startup::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use service_core::error::AppError;

pub async fn get_credits(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let account = state
        .users
        .find(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    Ok(Json(json!({
        "success": true,
        "credits": account.credits,
    })))
}
