//! Retention sweep: delete stored objects past their retention window and
//! mark their usage logs deleted.

use crate::services::storage::ObjectStore;
use crate::services::usage::UsageLog;
use chrono::{Duration, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    pub errors: Vec<String>,
}

/// One pass over expired usage logs. Per-entry failures are collected, not
/// fatal; every scanned entry is marked deleted regardless, so a sweep never
/// retries an object that is already gone.
pub async fn run_retention_sweep(
    usage: Arc<dyn UsageLog>,
    storage: Arc<dyn ObjectStore>,
    retention_hours: i64,
) -> Result<SweepReport, AppError> {
    let cutoff = Utc::now() - Duration::hours(retention_hours);
    let expired = usage.list_expired(cutoff).await?;

    let mut report = SweepReport {
        scanned: expired.len(),
        deleted: 0,
        errors: Vec::new(),
    };

    for entry in expired {
        let keys = [entry.original_key.as_deref(), entry.processed_key.as_deref()];
        for key in keys.into_iter().flatten() {
            match storage.exists(key).await {
                Ok(true) => match storage.delete(key).await {
                    Ok(()) => report.deleted += 1,
                    Err(e) => {
                        warn!(key = %key, error = %e, "Sweep delete failed");
                        report.errors.push(format!("{}: {}", key, e));
                    }
                },
                // Already gone; nothing to delete.
                Ok(false) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "Sweep existence check failed");
                    report.errors.push(format!("{}: {}", key, e));
                }
            }
        }

        if let Err(e) = usage.mark_deleted(entry.id).await {
            warn!(log_id = %entry.id, error = %e, "Sweep log transition failed");
            report.errors.push(format!("{}: {}", entry.id, e));
        }
    }

    info!(
        scanned = report.scanned,
        deleted = report.deleted,
        errors = report.errors.len(),
        "Retention sweep finished"
    );
    metrics::counter!("sweep_objects_deleted_total").increment(report.deleted as u64);
    Ok(report)
}
