//! In-memory backend for local development and tests.
//!
//! A single mutex over all three collections makes every operation atomic,
//! which matches the conditional-update semantics the MongoDB backend gets
//! from single-document updates.

use crate::models::{BillingTransaction, UsageLogEntry, UsageStatus, User};
use crate::services::billing::{BillingEventOutcome, BillingLedger, NewBillingEvent};
use crate::services::ledger::{CreditCheck, CreditDeduction, CreditLedger};
use crate::services::usage::{UsageLog, UsageOutcome, UsagePage, UsageQuery, UsageStats};
use crate::services::users::UserStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    usage_logs: HashMap<Uuid, UsageLogEntry>,
    transactions: HashMap<String, BillingTransaction>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-mutation; propagating the panic
        // is the only sound option for test infrastructure.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: User) -> Result<(), AppError> {
        self.lock().users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn find(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Ok(self.lock().users.get(user_id).cloned())
    }

    async fn find_by_customer(&self, customer_id: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.paddle_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn set_customer_id(&self, user_id: &str, customer_id: &str) -> Result<(), AppError> {
        let mut inner = self.lock();
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
        user.paddle_customer_id = Some(customer_id.to_string());
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CreditLedger for MemoryStore {
    async fn check(&self, user_id: &str, needed: i64) -> Result<CreditCheck, AppError> {
        let inner = self.lock();
        let user = inner
            .users
            .get(user_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
        Ok(CreditCheck {
            ok: user.credits >= needed,
            available: user.credits,
        })
    }

    async fn deduct(&self, user_id: &str, amount: i64) -> Result<CreditDeduction, AppError> {
        let mut inner = self.lock();
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

        if user.credits < amount {
            return Ok(CreditDeduction {
                ok: false,
                remaining: user.credits,
            });
        }

        user.credits -= amount;
        user.updated_at = Utc::now();
        Ok(CreditDeduction {
            ok: true,
            remaining: user.credits,
        })
    }

    async fn credit(&self, user_id: &str, amount: i64) -> Result<i64, AppError> {
        let mut inner = self.lock();
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
        user.credits += amount;
        user.updated_at = Utc::now();
        Ok(user.credits)
    }
}

#[async_trait]
impl UsageLog for MemoryStore {
    async fn create(&self, entry: UsageLogEntry) -> Result<Uuid, AppError> {
        let id = entry.id;
        self.lock().usage_logs.insert(id, entry);
        Ok(id)
    }

    async fn finish(
        &self,
        log_id: Uuid,
        status: UsageStatus,
        outcome: UsageOutcome,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        if let Some(entry) = inner.usage_logs.get_mut(&log_id) {
            entry.status = status;
            if outcome.processing_time_ms.is_some() {
                entry.processing_time_ms = outcome.processing_time_ms;
            }
            if outcome.error_message.is_some() {
                entry.error_message = outcome.error_message;
            }
            if outcome.processed_key.is_some() {
                entry.processed_key = outcome.processed_key;
            }
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get(&self, log_id: Uuid) -> Result<Option<UsageLogEntry>, AppError> {
        Ok(self.lock().usage_logs.get(&log_id).cloned())
    }

    async fn list(&self, user_id: &str, query: &UsageQuery) -> Result<UsagePage, AppError> {
        let inner = self.lock();
        let mut all: Vec<&UsageLogEntry> = inner
            .usage_logs
            .values()
            .filter(|e| e.user_id == user_id)
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let stats = UsageStats::from_entries(all.iter().copied());

        let filtered: Vec<&UsageLogEntry> = match query.status {
            Some(status) => all.into_iter().filter(|e| e.status == status).collect(),
            None => all,
        };
        let total = filtered.len() as u64;

        let page = query.page.max(1);
        let limit = query.limit.clamp(1, 100);
        let entries = filtered
            .into_iter()
            .skip(((page - 1) * limit) as usize)
            .take(limit as usize)
            .cloned()
            .collect();

        Ok(UsagePage {
            entries,
            total,
            stats,
        })
    }

    async fn mark_deleted(&self, log_id: Uuid) -> Result<(), AppError> {
        let mut inner = self.lock();
        if let Some(entry) = inner.usage_logs.get_mut(&log_id) {
            entry.status = UsageStatus::Deleted;
            entry.original_key = None;
            entry.processed_key = None;
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<UsageLogEntry>, AppError> {
        Ok(self
            .lock()
            .usage_logs
            .values()
            .filter(|e| {
                e.created_at < cutoff
                    && e.status != UsageStatus::Deleted
                    && (e.original_key.is_some() || e.processed_key.is_some())
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BillingLedger for MemoryStore {
    async fn record_event(&self, event: NewBillingEvent) -> Result<BillingEventOutcome, AppError> {
        let mut inner = self.lock();

        if let Some(existing) = inner.transactions.get_mut(&event.transaction_id) {
            if existing.has_event(&event.state.event_type) {
                return Ok(BillingEventOutcome {
                    transaction: existing.clone(),
                    appended: false,
                });
            }
            existing.status = event.state.status;
            existing.provider_updated_at = event.provider_updated_at;
            if event.checkout_url.is_some() {
                existing.checkout_url = event.checkout_url;
            }
            existing.states.push(event.state);
            return Ok(BillingEventOutcome {
                transaction: existing.clone(),
                appended: true,
            });
        }

        let transaction = event.into_transaction();
        inner
            .transactions
            .insert(transaction.id.clone(), transaction.clone());
        Ok(BillingEventOutcome {
            transaction,
            appended: true,
        })
    }

    async fn get(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> Result<Option<BillingTransaction>, AppError> {
        Ok(self
            .lock()
            .transactions
            .get(transaction_id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<BillingTransaction>, AppError> {
        let mut transactions: Vec<BillingTransaction> = self
            .lock()
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.provider_created_at.cmp(&a.provider_created_at));
        Ok(transactions)
    }
}
