pub mod billing;
pub mod database;
pub mod fetcher;
pub mod inference;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod paddle;
pub mod storage;
pub mod usage;
pub mod users;

pub use billing::{BillingEventOutcome, BillingLedger, NewBillingEvent};
pub use database::MongoDb;
pub use fetcher::{HttpFetcher, StaticFetcher, UrlFetcher};
pub use inference::{BackgroundRemover, InferenceError, MockRemover, RemovalClient};
pub use ledger::{CreditCheck, CreditDeduction, CreditLedger};
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use paddle::PaddleClient;
pub use storage::{
    is_absolute_url, object_key, LocalStorage, ObjectRole, ObjectStore, S3Storage,
    DEFAULT_READ_EXPIRY_SECS, DEFAULT_UPLOAD_EXPIRY_SECS,
};
pub use usage::{UsageLog, UsageOutcome, UsagePage, UsageQuery, UsageStats};
pub use users::UserStore;
