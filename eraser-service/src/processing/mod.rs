//! Request-level image pipeline: credit check, upload, deduct, per-image
//! inference fan-out.

use crate::intake::UploadedImage;
use crate::models::{UsageLogEntry, UsageStatus};
use crate::services::inference::BackgroundRemover;
use crate::services::ledger::CreditLedger;
use crate::services::storage::{object_key, ObjectRole, ObjectStore, DEFAULT_READ_EXPIRY_SECS};
use crate::services::usage::{UsageLog, UsageOutcome};
use crate::services::UrlFetcher;
use futures::future::{join_all, try_join_all};
use serde::Serialize;
use serde_json::{json, Value};
use service_core::error::AppError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

const UPLOADS_FOLDER: &str = "uploads";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedImage {
    pub log_id: Uuid,
    pub original_url: String,
    pub processed_url: String,
    pub processing_time_ms: i64,
}

#[derive(Clone)]
pub struct Processor {
    credits: Arc<dyn CreditLedger>,
    usage: Arc<dyn UsageLog>,
    storage: Arc<dyn ObjectStore>,
    remover: Arc<dyn BackgroundRemover>,
    fetcher: Arc<dyn UrlFetcher>,
}

impl Processor {
    pub fn new(
        credits: Arc<dyn CreditLedger>,
        usage: Arc<dyn UsageLog>,
        storage: Arc<dyn ObjectStore>,
        remover: Arc<dyn BackgroundRemover>,
        fetcher: Arc<dyn UrlFetcher>,
    ) -> Self {
        Self {
            credits,
            usage,
            storage,
            remover,
            fetcher,
        }
    }

    /// Run the full pipeline for one request. One credit per image, deducted
    /// up front in a single conditional operation; no refund on failure.
    pub async fn process(
        &self,
        user_id: &str,
        request_id: &str,
        images: Vec<UploadedImage>,
    ) -> Result<Value, AppError> {
        let started = Instant::now();
        let count = images.len();
        let required = count as i64;

        let check = self.credits.check(user_id, required).await?;
        if !check.ok {
            metrics::counter!("processing_rejected_total", "reason" => "credits").increment(1);
            return Err(AppError::InsufficientCredits {
                required,
                available: check.available,
            });
        }

        // Upload every original first; any failure aborts before credits
        // are touched.
        let uploads = images.into_iter().map(|image| {
            let storage = Arc::clone(&self.storage);
            async move {
                let key = object_key(UPLOADS_FOLDER, ObjectRole::Original, &image.extension);
                storage.put(&key, image.bytes, &image.mime_type).await?;
                Ok::<String, AppError>(key)
            }
        });
        let original_keys = try_join_all(uploads).await?;

        let deduction = self.credits.deduct(user_id, required).await?;
        if !deduction.ok {
            metrics::counter!("processing_rejected_total", "reason" => "credits").increment(1);
            return Err(AppError::InsufficientCredits {
                required,
                available: deduction.remaining,
            });
        }

        let jobs = original_keys.into_iter().map(|original_key| {
            let this = self.clone();
            let user_id = user_id.to_string();
            let request_id = request_id.to_string();
            async move { this.process_one(&user_id, &request_id, original_key).await }
        });
        let outcomes = join_all(jobs).await;

        let mut results = Vec::with_capacity(count);
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => failures.push(e.to_string()),
            }
        }

        metrics::counter!("images_processed_total").increment(results.len() as u64);
        metrics::counter!("images_failed_total").increment(failures.len() as u64);

        if !failures.is_empty() {
            error!(
                failed = failures.len(),
                succeeded = results.len(),
                "Image processing failed"
            );
            return Err(AppError::BadGateway(format!(
                "Background removal failed: {}",
                failures.join("; ")
            )));
        }

        let elapsed_ms = started.elapsed().as_millis() as i64;
        info!(
            user_id = %user_id,
            count = count,
            elapsed_ms = elapsed_ms,
            remaining = deduction.remaining,
            "Processing request completed"
        );

        let results_value = if results.len() == 1 {
            json!(results[0])
        } else {
            json!(results)
        };
        Ok(json!({
            "success": true,
            "processingTime": elapsed_ms,
            "count": count,
            "creditsRemaining": deduction.remaining,
            "creditsUsed": required,
            "results": results_value,
        }))
    }

    /// One image end to end. The log entry is created best-effort before
    /// inference; every exit path finishes it explicitly.
    async fn process_one(
        &self,
        user_id: &str,
        request_id: &str,
        original_key: String,
    ) -> Result<ProcessedImage, AppError> {
        let started = Instant::now();
        let entry = UsageLogEntry::new(
            user_id.to_string(),
            request_id.to_string(),
            Some(original_key.clone()),
        );
        let log_id = entry.id;
        if let Err(e) = self.usage.create(entry).await {
            warn!(error = %e, "Usage log creation failed; continuing");
        }

        match self.run_inference(&original_key).await {
            Ok((processed_key, original_url, processed_url)) => {
                let elapsed_ms = started.elapsed().as_millis() as i64;
                let outcome = UsageOutcome {
                    processing_time_ms: Some(elapsed_ms),
                    error_message: None,
                    processed_key: Some(processed_key),
                };
                if let Err(e) = self.usage.finish(log_id, UsageStatus::Success, outcome).await {
                    warn!(error = %e, "Usage log completion failed");
                }
                Ok(ProcessedImage {
                    log_id,
                    original_url,
                    processed_url,
                    processing_time_ms: elapsed_ms,
                })
            }
            Err(e) => {
                let outcome = UsageOutcome {
                    processing_time_ms: Some(started.elapsed().as_millis() as i64),
                    error_message: Some(e.to_string()),
                    processed_key: None,
                };
                if let Err(log_err) = self.usage.finish(log_id, UsageStatus::Error, outcome).await {
                    warn!(error = %log_err, "Usage log failure transition failed");
                }
                Err(e)
            }
        }
    }

    async fn run_inference(&self, original_key: &str) -> Result<(String, String, String), AppError> {
        let expiry = Duration::from_secs(DEFAULT_READ_EXPIRY_SECS);
        let source_url = self.storage.presign_get(original_key, expiry).await?;

        let result_url = self
            .remover
            .remove_background(&source_url)
            .await
            .map_err(|e| AppError::BadGateway(e.to_string()))?;

        let processed_bytes = self.fetcher.fetch(&result_url).await?;
        let processed_key = object_key(UPLOADS_FOLDER, ObjectRole::Processed, "png");
        self.storage
            .put(&processed_key, processed_bytes, "image/png")
            .await?;

        let processed_url = self.storage.presign_get(&processed_key, expiry).await?;
        Ok((processed_key, source_url, processed_url))
    }
}
