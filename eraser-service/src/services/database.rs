//! MongoDB backend for the user, usage-log and billing stores.

use crate::models::{BillingTransaction, UsageLogEntry, UsageStatus, User};
use crate::services::billing::{BillingEventOutcome, BillingLedger, NewBillingEvent};
use crate::services::ledger::{CreditCheck, CreditDeduction, CreditLedger};
use crate::services::usage::{UsageLog, UsageOutcome, UsagePage, UsageQuery, UsageStats};
use crate::services::users::UserStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct MongoDb {
    db: mongodb::Database,
}

impl MongoDb {
    #[instrument(skip(uri))]
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        let client = Client::with_uri_str(uri).await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to connect to MongoDB: {}", e))
        })?;
        let db = client.database(database);
        info!(database = database, "MongoDB connection established");
        Ok(Self { db })
    }

    fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    fn usage_logs(&self) -> Collection<UsageLogEntry> {
        self.db.collection("usage_logs")
    }

    fn transactions(&self) -> Collection<BillingTransaction> {
        self.db.collection("billing_transactions")
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        self.db
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn init_indexes(&self) -> Result<(), AppError> {
        let unique = IndexOptions::builder().unique(true).build();
        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique)
                    .build(),
                None,
            )
            .await?;
        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "paddle_customer_id": 1 })
                    .build(),
                None,
            )
            .await?;
        self.usage_logs()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "created_at": -1 })
                    .build(),
                None,
            )
            .await?;
        self.usage_logs()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "status": 1, "created_at": 1 })
                    .build(),
                None,
            )
            .await?;
        self.transactions()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "provider_created_at": -1 })
                    .build(),
                None,
            )
            .await?;
        info!("Database indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl UserStore for MongoDb {
    async fn create(&self, user: User) -> Result<(), AppError> {
        self.users().insert_one(&user, None).await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create user: {}", e))
        })?;
        Ok(())
    }

    async fn find(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let user = self
            .users()
            .find_one(doc! { "_id": user_id }, None)
            .await
            .map_err(AppError::from)?;
        Ok(user)
    }

    async fn find_by_customer(&self, customer_id: &str) -> Result<Option<User>, AppError> {
        let user = self
            .users()
            .find_one(doc! { "paddle_customer_id": customer_id }, None)
            .await
            .map_err(AppError::from)?;
        Ok(user)
    }

    async fn set_customer_id(&self, user_id: &str, customer_id: &str) -> Result<(), AppError> {
        let result = self
            .users()
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": {
                    "paddle_customer_id": customer_id,
                    "updated_at": mongodb::bson::DateTime::now(),
                }},
                None,
            )
            .await
            .map_err(AppError::from)?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("User not found")));
        }
        Ok(())
    }
}

#[async_trait]
impl CreditLedger for MongoDb {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn check(&self, user_id: &str, needed: i64) -> Result<CreditCheck, AppError> {
        let user = self
            .find(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
        Ok(CreditCheck {
            ok: user.credits >= needed,
            available: user.credits,
        })
    }

    #[instrument(skip(self), fields(user_id = %user_id, amount = amount))]
    async fn deduct(&self, user_id: &str, amount: i64) -> Result<CreditDeduction, AppError> {
        // The filter makes the decrement conditional: the storage layer
        // applies it atomically only while `credits >= amount`, so the
        // balance cannot go negative even under concurrent requests.
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .users()
            .find_one_and_update(
                doc! { "_id": user_id, "credits": { "$gte": amount } },
                doc! {
                    "$inc": { "credits": -amount },
                    "$set": { "updated_at": mongodb::bson::DateTime::now() },
                },
                options,
            )
            .await
            .map_err(AppError::from)?;

        if let Some(user) = updated {
            info!(remaining = user.credits, "Credits deducted");
            return Ok(CreditDeduction {
                ok: true,
                remaining: user.credits,
            });
        }

        // The condition failed: either the user is unknown or the balance
        // raced below the threshold since the check.
        let user = self
            .find(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
        Ok(CreditDeduction {
            ok: false,
            remaining: user.credits,
        })
    }

    #[instrument(skip(self), fields(user_id = %user_id, amount = amount))]
    async fn credit(&self, user_id: &str, amount: i64) -> Result<i64, AppError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .users()
            .find_one_and_update(
                doc! { "_id": user_id },
                doc! {
                    "$inc": { "credits": amount },
                    "$set": { "updated_at": mongodb::bson::DateTime::now() },
                },
                options,
            )
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

        info!(balance = updated.credits, "Credits granted");
        Ok(updated.credits)
    }
}

#[async_trait]
impl UsageLog for MongoDb {
    async fn create(&self, entry: UsageLogEntry) -> Result<Uuid, AppError> {
        let id = entry.id;
        self.usage_logs().insert_one(&entry, None).await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create usage log: {}", e))
        })?;
        Ok(id)
    }

    async fn finish(
        &self,
        log_id: Uuid,
        status: UsageStatus,
        outcome: UsageOutcome,
    ) -> Result<(), AppError> {
        let mut set = doc! {
            "status": status.as_str(),
            "updated_at": mongodb::bson::DateTime::now(),
        };
        if let Some(ms) = outcome.processing_time_ms {
            set.insert("processing_time_ms", ms);
        }
        if let Some(message) = outcome.error_message {
            set.insert("error_message", message);
        }
        if let Some(key) = outcome.processed_key {
            set.insert("processed_key", key);
        }

        self.usage_logs()
            .update_one(
                doc! { "_id": log_id.to_string() },
                doc! { "$set": set },
                None,
            )
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn get(&self, log_id: Uuid) -> Result<Option<UsageLogEntry>, AppError> {
        let entry = self
            .usage_logs()
            .find_one(doc! { "_id": log_id.to_string() }, None)
            .await
            .map_err(AppError::from)?;
        Ok(entry)
    }

    async fn list(&self, user_id: &str, query: &UsageQuery) -> Result<UsagePage, AppError> {
        let mut filter = doc! { "user_id": user_id };
        if let Some(status) = query.status {
            filter.insert("status", status.as_str());
        }

        let total = self
            .usage_logs()
            .count_documents(filter.clone(), None)
            .await
            .map_err(AppError::from)?;

        let page = query.page.max(1);
        let limit = query.limit.clamp(1, 100);
        let find_options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip((page - 1) * limit)
            .limit(limit as i64)
            .build();

        let mut cursor = self
            .usage_logs()
            .find(filter, find_options)
            .await
            .map_err(AppError::from)?;
        let mut entries = Vec::new();
        while let Some(entry) = cursor.try_next().await.map_err(AppError::from)? {
            entries.push(entry);
        }

        let stats = self.aggregate_stats(user_id).await?;

        Ok(UsagePage {
            entries,
            total,
            stats,
        })
    }

    async fn mark_deleted(&self, log_id: Uuid) -> Result<(), AppError> {
        self.usage_logs()
            .update_one(
                doc! { "_id": log_id.to_string() },
                doc! { "$set": {
                    "status": UsageStatus::Deleted.as_str(),
                    "original_key": Bson::Null,
                    "processed_key": Bson::Null,
                    "updated_at": mongodb::bson::DateTime::now(),
                }},
                None,
            )
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn list_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<UsageLogEntry>, AppError> {
        let filter = doc! {
            "created_at": { "$lt": mongodb::bson::DateTime::from_chrono(cutoff) },
            "status": { "$ne": UsageStatus::Deleted.as_str() },
            "$or": [
                { "original_key": { "$ne": Bson::Null } },
                { "processed_key": { "$ne": Bson::Null } },
            ],
        };

        let mut cursor = self
            .usage_logs()
            .find(filter, None)
            .await
            .map_err(AppError::from)?;
        let mut entries = Vec::new();
        while let Some(entry) = cursor.try_next().await.map_err(AppError::from)? {
            entries.push(entry);
        }
        Ok(entries)
    }
}

impl MongoDb {
    /// Statistics over all of a user's usage entries, in one grouped pass.
    async fn aggregate_stats(&self, user_id: &str) -> Result<UsageStats, AppError> {
        let pipeline = vec![
            doc! { "$match": { "user_id": user_id } },
            doc! { "$group": {
                "_id": "$status",
                "count": { "$sum": 1 },
                "credits": { "$sum": "$credits_used" },
                "avg_time": { "$avg": "$processing_time_ms" },
            }},
        ];

        let mut cursor = self
            .usage_logs()
            .aggregate(pipeline, None)
            .await
            .map_err(AppError::from)?;

        let mut stats = UsageStats {
            total_credits_used: 0,
            processing_count: 0,
            success_count: 0,
            error_count: 0,
            deleted_count: 0,
            average_processing_time_ms: None,
            success_rate: 1.0,
        };

        while let Some(group) = cursor.try_next().await.map_err(AppError::from)? {
            let count = read_i64(&group, "count") as u64;
            let credits = read_i64(&group, "credits");
            stats.total_credits_used += credits;

            match group.get_str("_id").unwrap_or_default() {
                "processing" => stats.processing_count = count,
                "success" => {
                    stats.success_count = count;
                    stats.average_processing_time_ms = group.get_f64("avg_time").ok();
                }
                "error" => stats.error_count = count,
                "deleted" => stats.deleted_count = count,
                _ => {}
            }
        }

        let terminal = stats.success_count + stats.error_count;
        if terminal > 0 {
            stats.success_rate = stats.success_count as f64 / terminal as f64;
        }
        Ok(stats)
    }
}

fn read_i64(document: &Document, key: &str) -> i64 {
    match document.get(key) {
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Int32(v)) => *v as i64,
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

#[async_trait]
impl BillingLedger for MongoDb {
    #[instrument(skip(self, event), fields(transaction_id = %event.transaction_id, event_type = %event.state.event_type))]
    async fn record_event(
        &self,
        event: NewBillingEvent,
    ) -> Result<BillingEventOutcome, AppError> {
        let state_bson = mongodb::bson::to_bson(&event.state).map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to serialize state: {}", e))
        })?;
        let status_bson = mongodb::bson::to_bson(&event.state.status).map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to serialize status: {}", e))
        })?;

        let mut set = doc! {
            "status": status_bson,
            "provider_updated_at": mongodb::bson::DateTime::from_chrono(event.provider_updated_at),
        };
        if let Some(ref url) = event.checkout_url {
            set.insert("checkout_url", url.clone());
        }

        // The filter keys the push on the event type, so a replayed event
        // matches nothing and appends nothing.
        let result = self
            .transactions()
            .update_one(
                doc! {
                    "_id": &event.transaction_id,
                    "states.event_type": { "$ne": &event.state.event_type },
                },
                doc! { "$push": { "states": state_bson }, "$set": set },
                None,
            )
            .await
            .map_err(AppError::from)?;

        if result.matched_count == 1 {
            let transaction = self
                .transactions()
                .find_one(doc! { "_id": &event.transaction_id }, None)
                .await
                .map_err(AppError::from)?
                .ok_or_else(|| {
                    AppError::DatabaseError(anyhow::anyhow!("Transaction vanished after update"))
                })?;
            return Ok(BillingEventOutcome {
                transaction,
                appended: true,
            });
        }

        // Nothing matched: either the transaction does not exist yet, or
        // this event type was already recorded.
        if let Some(existing) = self
            .transactions()
            .find_one(doc! { "_id": &event.transaction_id }, None)
            .await
            .map_err(AppError::from)?
        {
            return Ok(BillingEventOutcome {
                transaction: existing,
                appended: false,
            });
        }

        let transaction = event.into_transaction();
        match self.transactions().insert_one(&transaction, None).await {
            Ok(_) => Ok(BillingEventOutcome {
                transaction,
                appended: true,
            }),
            // Another delivery of the first event won the insert race.
            Err(e) if is_duplicate_key(&e) => {
                let existing = self
                    .transactions()
                    .find_one(doc! { "_id": &transaction.id }, None)
                    .await
                    .map_err(AppError::from)?
                    .ok_or_else(|| {
                        AppError::DatabaseError(anyhow::anyhow!(
                            "Transaction vanished after duplicate insert"
                        ))
                    })?;
                Ok(BillingEventOutcome {
                    transaction: existing,
                    appended: false,
                })
            }
            Err(e) => Err(AppError::DatabaseError(anyhow::anyhow!(
                "Failed to insert transaction: {}",
                e
            ))),
        }
    }

    async fn get(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> Result<Option<BillingTransaction>, AppError> {
        let transaction = self
            .transactions()
            .find_one(doc! { "_id": transaction_id, "user_id": user_id }, None)
            .await
            .map_err(AppError::from)?;
        Ok(transaction)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<BillingTransaction>, AppError> {
        let find_options = FindOptions::builder()
            .sort(doc! { "provider_created_at": -1 })
            .build();
        let mut cursor = self
            .transactions()
            .find(doc! { "user_id": user_id }, find_options)
            .await
            .map_err(AppError::from)?;

        let mut transactions = Vec::new();
        while let Some(transaction) = cursor.try_next().await.map_err(AppError::from)? {
            transactions.push(transaction);
        }
        Ok(transactions)
    }
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        *error.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we))
            if we.code == 11000
    )
}
