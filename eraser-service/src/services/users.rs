use crate::models::User;
use async_trait::async_trait;
use service_core::error::AppError;

/// Account lookup and billing-customer linkage.
///
/// Accounts are created by the external auth provider; `create` exists for
/// signup integration and test seeding. Credit mutation goes through
/// [`crate::services::CreditLedger`], never through this trait.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: User) -> Result<(), AppError>;

    async fn find(&self, user_id: &str) -> Result<Option<User>, AppError>;

    /// Resolve the owning user of an external billing customer id.
    async fn find_by_customer(&self, customer_id: &str) -> Result<Option<User>, AppError>;

    async fn set_customer_id(&self, user_id: &str, customer_id: &str) -> Result<(), AppError>;
}
