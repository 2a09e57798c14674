//! Checkout initiation: resolve a credit pack and open a Paddle
//! transaction for the caller.

use crate::middleware::AuthUser;
use crate::startup::AppState;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use service_core::error::AppError;
use tracing::info;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    #[validate(length(min = 1, max = 64))]
    pub pack_id: String,
}

pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<PaymentRequest>,
) -> Result<Json<Value>, AppError> {
    body.validate()?;

    let price_id = state
        .config
        .paddle
        .price_for_pack(&body.pack_id)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown pack: {}", body.pack_id)))?
        .to_string();

    let account = state
        .users
        .find(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    let customer_id = match account.paddle_customer_id {
        Some(id) => id,
        None => {
            let customer = state
                .paddle
                .find_or_create_customer(&account.email, &account.name)
                .await
                .map_err(|e| AppError::BadGateway(format!("Paddle customer error: {}", e)))?;
            state
                .users
                .set_customer_id(&user.user_id, &customer.id)
                .await?;
            customer.id
        }
    };

    let transaction = state
        .paddle
        .create_transaction(&customer_id, &price_id)
        .await
        .map_err(|e| AppError::BadGateway(format!("Paddle transaction error: {}", e)))?;

    info!(
        user_id = %user.user_id,
        pack_id = %body.pack_id,
        transaction_id = %transaction.id,
        "Checkout transaction opened"
    );
    metrics::counter!("checkouts_opened_total").increment(1);

    Ok(Json(json!({
        "success": true,
        "transaction": {
            "id": transaction.id,
            "status": transaction.status,
            "checkoutUrl": transaction.checkout.and_then(|c| c.url),
        },
    })))
}
