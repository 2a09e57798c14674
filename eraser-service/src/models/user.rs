use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credits granted to every new account.
pub const DEFAULT_SIGNUP_CREDITS: i64 = 5;

/// Application user. Accounts are created by the external auth provider at
/// signup; this service only reads the identity fields and mutates the
/// credit balance through the ledger operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub name: String,
    /// Prepaid usage balance. Never negative: only the conditional
    /// decrement and the billing completion credit may change it.
    pub credits: i64,
    pub paddle_customer_id: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: String, email: String, name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            email: email.to_lowercase(),
            name,
            credits: DEFAULT_SIGNUP_CREDITS,
            paddle_customer_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
