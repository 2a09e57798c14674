//! Billing history endpoints.

use crate::middleware::AuthUser;
use crate::models::{BillingTransaction, TransactionStatus};
use crate::startup::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use service_core::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionView {
    id: String,
    status: TransactionStatus,
    currency: String,
    items: Vec<ItemView>,
    events: Vec<EventView>,
    checkout_url: Option<String>,
    total: i64,
    credits: i64,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemView {
    price_id: String,
    name: String,
    quantity: i64,
    unit_amount: i64,
    credits: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventView {
    event_type: String,
    status: TransactionStatus,
    occurred_at: String,
    payment_method: Option<String>,
    invoice_number: Option<String>,
}

impl TransactionView {
    fn from_transaction(t: BillingTransaction) -> Self {
        let total = transaction_total(&t);
        let credits = t.first_item_credits();
        Self {
            id: t.id,
            status: t.status,
            currency: t.currency,
            items: t
                .items
                .into_iter()
                .map(|i| ItemView {
                    price_id: i.price_id,
                    name: i.name,
                    quantity: i.quantity,
                    unit_amount: i.unit_amount,
                    credits: i.credits,
                })
                .collect(),
            events: t
                .states
                .into_iter()
                .map(|s| EventView {
                    event_type: s.event_type,
                    status: s.status,
                    occurred_at: s.occurred_at.to_rfc3339(),
                    payment_method: s.payment_method,
                    invoice_number: s.invoice_number,
                })
                .collect(),
            checkout_url: t.checkout_url,
            total,
            credits,
            created_at: t.provider_created_at.to_rfc3339(),
            updated_at: t.provider_updated_at.to_rfc3339(),
        }
    }
}

/// Charged amount: the latest state's totals when present, the summed line
/// items otherwise.
fn transaction_total(t: &BillingTransaction) -> i64 {
    t.states
        .iter()
        .rev()
        .find_map(|s| s.totals.as_ref().map(|totals| totals.total))
        .unwrap_or_else(|| t.items.iter().map(|i| i.unit_amount * i.quantity).sum())
}

pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let transactions = state.billing.list(&user.user_id).await?;

    let mut total_spent = 0i64;
    let mut total_credits = 0i64;
    let mut completed_count = 0u64;
    for t in &transactions {
        if t.status == TransactionStatus::Completed {
            total_spent += transaction_total(t);
            total_credits += t.first_item_credits();
            completed_count += 1;
        }
    }

    let views: Vec<TransactionView> = transactions
        .into_iter()
        .map(TransactionView::from_transaction)
        .collect();

    Ok(Json(json!({
        "success": true,
        "transactions": views,
        "statistics": {
            "totalSpent": total_spent,
            "totalCredits": total_credits,
            "completedCount": completed_count,
        },
    })))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(transaction_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let transaction = state
        .billing
        .get(&user.user_id, &transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;

    Ok(Json(json!({
        "success": true,
        "transaction": TransactionView::from_transaction(transaction),
    })))
}
