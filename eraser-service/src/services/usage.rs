use crate::models::{UsageLogEntry, UsageStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use uuid::Uuid;

/// Terminal outcome fields for a log entry.
#[derive(Debug, Clone, Default)]
pub struct UsageOutcome {
    pub processing_time_ms: Option<i64>,
    pub error_message: Option<String>,
    pub processed_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UsageQuery {
    pub page: u64,
    pub limit: u64,
    pub status: Option<UsageStatus>,
}

impl Default for UsageQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            status: None,
        }
    }
}

/// Aggregate statistics over all of a user's log entries.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_credits_used: i64,
    pub processing_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub deleted_count: u64,
    /// Average over successful entries only.
    pub average_processing_time_ms: Option<f64>,
    /// success / (success + error); 1.0 when no terminal entries exist.
    pub success_rate: f64,
}

impl UsageStats {
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a UsageLogEntry>,
    {
        let mut stats = UsageStats {
            total_credits_used: 0,
            processing_count: 0,
            success_count: 0,
            error_count: 0,
            deleted_count: 0,
            average_processing_time_ms: None,
            success_rate: 1.0,
        };
        let mut time_sum = 0i64;
        let mut time_count = 0u64;

        for entry in entries {
            stats.total_credits_used += entry.credits_used;
            match entry.status {
                UsageStatus::Processing => stats.processing_count += 1,
                UsageStatus::Success => {
                    stats.success_count += 1;
                    if let Some(ms) = entry.processing_time_ms {
                        time_sum += ms;
                        time_count += 1;
                    }
                }
                UsageStatus::Error => stats.error_count += 1,
                UsageStatus::Deleted => stats.deleted_count += 1,
            }
        }

        if time_count > 0 {
            stats.average_processing_time_ms = Some(time_sum as f64 / time_count as f64);
        }
        let terminal = stats.success_count + stats.error_count;
        if terminal > 0 {
            stats.success_rate = stats.success_count as f64 / terminal as f64;
        }
        stats
    }
}

/// One page of usage history plus totals.
#[derive(Debug, Clone)]
pub struct UsagePage {
    pub entries: Vec<UsageLogEntry>,
    pub total: u64,
    pub stats: UsageStats,
}

/// Append-only record of image-processing attempts.
#[async_trait]
pub trait UsageLog: Send + Sync {
    /// Insert a new entry with status `processing`.
    async fn create(&self, entry: UsageLogEntry) -> Result<Uuid, AppError>;

    /// One-shot terminal transition to `success` or `error`.
    async fn finish(
        &self,
        log_id: Uuid,
        status: UsageStatus,
        outcome: UsageOutcome,
    ) -> Result<(), AppError>;

    async fn get(&self, log_id: Uuid) -> Result<Option<UsageLogEntry>, AppError>;

    /// Newest-first page of a user's entries plus aggregate statistics over
    /// all of them.
    async fn list(&self, user_id: &str, query: &UsageQuery) -> Result<UsagePage, AppError>;

    /// Retention sweep transition: status `deleted`, both key fields nulled.
    async fn mark_deleted(&self, log_id: Uuid) -> Result<(), AppError>;

    /// Entries created before `cutoff` that are not yet deleted and still
    /// reference at least one storage key.
    async fn list_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<UsageLogEntry>, AppError>;
}
