use async_trait::async_trait;
use service_core::error::AppError;

/// Result of a read-only balance check.
#[derive(Debug, Clone, Copy)]
pub struct CreditCheck {
    pub ok: bool,
    pub available: i64,
}

/// Result of a conditional deduction attempt.
#[derive(Debug, Clone, Copy)]
pub struct CreditDeduction {
    pub ok: bool,
    pub remaining: i64,
}

/// Per-user integer credit balance.
///
/// `check` is not atomic with a following `deduct`; two concurrent requests
/// for the same user can both pass the check. The balance is protected by
/// `deduct` alone, which is a single conditional update ("decrement iff
/// balance >= amount") atomic at the storage layer, so the balance can never
/// go negative.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Read the balance; `ok` iff `available >= needed`.
    /// Unknown user is `AppError::NotFound`, distinct from an insufficient
    /// balance.
    async fn check(&self, user_id: &str, needed: i64) -> Result<CreditCheck, AppError>;

    /// Decrement iff `balance >= amount`. `ok=false` means the balance raced
    /// below the threshold since the check.
    async fn deduct(&self, user_id: &str, amount: i64) -> Result<CreditDeduction, AppError>;

    /// Unconditional increment; used only by billing on the completion
    /// event. Returns the new balance.
    async fn credit(&self, user_id: &str, amount: i64) -> Result<i64, AppError>;
}
