mod billing;
mod usage;
mod user;

pub use billing::{
    BillingTransaction, LineItem, TotalsSnapshot, TransactionState, TransactionStatus,
};
pub use usage::{UsageLogEntry, UsageStatus, DEFAULT_MODEL_ID};
pub use user::{User, DEFAULT_SIGNUP_CREDITS};
