use crate::models::{BillingTransaction, LineItem, TransactionState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;

/// A webhook event reduced to the fields the ledger stores.
#[derive(Debug, Clone)]
pub struct NewBillingEvent {
    pub transaction_id: String,
    pub customer_id: String,
    pub user_id: String,
    pub currency: String,
    pub items: Vec<LineItem>,
    pub state: TransactionState,
    pub checkout_url: Option<String>,
    pub provider_created_at: DateTime<Utc>,
    pub provider_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BillingEventOutcome {
    pub transaction: BillingTransaction,
    /// False when the event type was already recorded (replay).
    pub appended: bool,
}

/// Append-only transaction-state history keyed by provider transaction id.
///
/// `record_event` upserts: the first event for a transaction id creates the
/// record; later events append their state only if that event type is not
/// already present. The transaction's `status` always mirrors the most
/// recently appended state.
#[async_trait]
pub trait BillingLedger: Send + Sync {
    async fn record_event(&self, event: NewBillingEvent)
        -> Result<BillingEventOutcome, AppError>;

    async fn get(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> Result<Option<BillingTransaction>, AppError>;

    /// Newest-first transactions owned by `user_id`.
    async fn list(&self, user_id: &str) -> Result<Vec<BillingTransaction>, AppError>;
}

impl NewBillingEvent {
    /// Materialize the first record for a transaction id.
    pub fn into_transaction(self) -> BillingTransaction {
        BillingTransaction {
            id: self.transaction_id,
            customer_id: self.customer_id,
            user_id: self.user_id,
            status: self.state.status,
            currency: self.currency,
            items: self.items,
            states: vec![self.state],
            checkout_url: self.checkout_url,
            provider_created_at: self.provider_created_at,
            provider_updated_at: self.provider_updated_at,
        }
    }
}
