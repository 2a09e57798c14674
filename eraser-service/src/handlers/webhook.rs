//! Paddle webhook intake: signature verification, platform filtering,
//! deduplicated ledger writes, and at-most-once crediting.

use crate::models::{LineItem, TotalsSnapshot, TransactionState, TransactionStatus};
use crate::services::billing::NewBillingEvent;
use crate::services::paddle::{credits_from_custom_data, parse_amount, PaddleWebhookEvent};
use crate::startup::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use service_core::error::AppError;
use tracing::{info, warn};

const COMPLETED_EVENT: &str = "transaction.completed";

pub async fn paddle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get("paddle-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing Paddle-Signature header")))?;

    let verified = state
        .paddle
        .verify_webhook_signature(signature, &body)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Signature check failed: {}", e)))?;
    if !verified {
        metrics::counter!("webhook_rejected_total", "reason" => "signature").increment(1);
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid webhook signature"
        )));
    }

    let event = state
        .paddle
        .parse_webhook_event(&body)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Malformed webhook payload: {}", e)))?;

    // The webhook endpoint is shared across products; acknowledge foreign
    // events without touching the ledger.
    if !state.paddle.platform_matches(&event.data.custom_data) {
        info!(event_id = %event.event_id, "Ignoring event for another platform");
        return Ok(Json(json!({ "success": true, "ignored": true })));
    }

    let customer_id = event
        .data
        .customer_id
        .clone()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Event carries no customer id")))?;

    let user = state
        .users
        .find_by_customer(&customer_id)
        .await?
        .ok_or_else(|| {
            warn!(customer_id = %customer_id, "Webhook for unknown customer");
            AppError::NotFound(anyhow::anyhow!("No user for customer {}", customer_id))
        })?;

    let event_type = event.event_type.clone();
    let credits = event
        .data
        .items
        .first()
        .map(|i| credits_from_custom_data(&i.price.custom_data))
        .unwrap_or(0);

    let outcome = state
        .billing
        .record_event(into_billing_event(event, user.id.clone()))
        .await?;

    let mut new_balance = None;
    if event_type == COMPLETED_EVENT && outcome.appended && credits > 0 {
        let balance = state.credits.credit(&user.id, credits).await?;
        info!(
            user_id = %user.id,
            credits = credits,
            balance = balance,
            transaction_id = %outcome.transaction.id,
            "Purchase credited"
        );
        metrics::counter!("credits_purchased_total").increment(credits as u64);
        new_balance = Some(balance);
    }

    Ok(Json(json!({
        "success": true,
        "appended": outcome.appended,
        "credits": new_balance,
    })))
}

fn into_billing_event(event: PaddleWebhookEvent, user_id: String) -> NewBillingEvent {
    let data = event.data;
    let status = TransactionStatus::from_provider(&data.status);

    let items: Vec<LineItem> = data
        .items
        .iter()
        .map(|item| LineItem {
            price_id: item.price.id.clone(),
            name: item.price.name.clone().unwrap_or_default(),
            quantity: item.quantity,
            unit_amount: parse_amount(&item.price.unit_price.amount),
            credits: credits_from_custom_data(&item.price.custom_data),
            product_id: item.price.product_id.clone(),
            product_name: None,
        })
        .collect();

    let totals = data
        .details
        .as_ref()
        .and_then(|d| d.totals.as_ref())
        .map(|t| TotalsSnapshot {
            subtotal: parse_amount(&t.subtotal),
            tax: parse_amount(&t.tax),
            total: parse_amount(&t.total),
        });

    let payment_method = data
        .payments
        .first()
        .and_then(|p| p.method_details.as_ref())
        .and_then(|m| m.kind.clone());

    NewBillingEvent {
        transaction_id: data.id,
        customer_id: data.customer_id.unwrap_or_default(),
        user_id,
        currency: data.currency_code,
        items,
        state: TransactionState {
            status,
            event_type: event.event_type,
            occurred_at: event.occurred_at,
            totals,
            payment_method,
            invoice_number: data.invoice_number,
        },
        checkout_url: data.checkout.and_then(|c| c.url),
        provider_created_at: data.created_at,
        provider_updated_at: data.updated_at,
    }
}
