use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_MODEL_ID: &str = "bg-remover";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    Processing,
    Success,
    Error,
    Deleted,
}

impl UsageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UsageStatus::Processing => "processing",
            UsageStatus::Success => "success",
            UsageStatus::Error => "error",
            UsageStatus::Deleted => "deleted",
        }
    }
}

/// One record per image-processing attempt.
///
/// Status transitions one way: processing -> {success, error} -> deleted.
/// `deleted` is terminal and clears both storage key fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLogEntry {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: String,
    pub model_id: String,
    pub status: UsageStatus,
    pub credits_used: i64,
    /// Caller-supplied idempotency/request id.
    pub request_id: String,
    pub original_key: Option<String>,
    pub processed_key: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub error_message: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl UsageLogEntry {
    /// New entry in the `processing` state, one credit charged per image.
    pub fn new(user_id: String, request_id: String, original_key: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            model_id: DEFAULT_MODEL_ID.to_string(),
            status: UsageStatus::Processing,
            credits_used: 1,
            request_id,
            original_key,
            processed_key: None,
            processing_time_ms: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
