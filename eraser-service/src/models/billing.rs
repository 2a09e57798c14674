use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Draft,
    Paid,
    Completed,
    Cancelled,
    Failed,
}

impl TransactionStatus {
    /// Map a Paddle transaction status string onto the ledger status.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "paid" => TransactionStatus::Paid,
            "completed" => TransactionStatus::Completed,
            "canceled" | "cancelled" => TransactionStatus::Cancelled,
            "past_due" | "failed" => TransactionStatus::Failed,
            _ => TransactionStatus::Draft,
        }
    }
}

/// One purchasable line of a transaction, flattened from the provider's
/// price/product nesting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub price_id: String,
    pub name: String,
    pub quantity: i64,
    /// Unit price in the smallest currency unit.
    pub unit_amount: i64,
    /// Credits granted by this item, from the price's custom data.
    pub credits: i64,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalsSnapshot {
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
}

/// One webhook-observed state of a transaction. The `states` list on
/// [`BillingTransaction`] is append-only and holds at most one entry per
/// event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionState {
    pub status: TransactionStatus,
    pub event_type: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub occurred_at: DateTime<Utc>,
    pub totals: Option<TotalsSnapshot>,
    pub payment_method: Option<String>,
    pub invoice_number: Option<String>,
}

/// Append-only webhook-driven history of one provider transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingTransaction {
    /// Provider transaction id (`txn_...`), unique.
    #[serde(rename = "_id")]
    pub id: String,
    pub customer_id: String,
    pub user_id: String,
    /// Mirrors the most recently appended state's status.
    pub status: TransactionStatus,
    pub currency: String,
    pub items: Vec<LineItem>,
    pub states: Vec<TransactionState>,
    pub checkout_url: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub provider_created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub provider_updated_at: DateTime<Utc>,
}

impl BillingTransaction {
    pub fn has_event(&self, event_type: &str) -> bool {
        self.states.iter().any(|s| s.event_type == event_type)
    }

    /// Credits granted by the first line item; 0 when there are none.
    pub fn first_item_credits(&self) -> i64 {
        self.items.first().map(|i| i.credits).unwrap_or(0)
    }
}
