use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A read credit for this (user, article) pair already exists.
    #[error("reward already recorded for this article")]
    DuplicateCredit,
    #[error("no profile found for user {0}")]
    ProfileMissing(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage capability consumed by the settlement service. The production
/// implementation is the crate's SQLite [`Database`](crate::db::Database);
/// tests substitute in-memory fakes.
///
/// `credit_read` and `adjust_balance` apply their ledger insert and balance
/// update as one atomic unit, and the balance change is an increment, never
/// a write-back of a previously fetched value.
#[async_trait]
pub trait RewardStore: Send + Sync {
    async fn balance(&self, user_id: &str) -> StoreResult<u64>;

    async fn has_read_credit(&self, user_id: &str, article_id: &str) -> StoreResult<bool>;

    /// Record a completed-read credit and return the new balance. Fails with
    /// [`StoreError::DuplicateCredit`] when the pair was already credited.
    async fn credit_read(
        &self,
        user_id: &str,
        article_id: &str,
        amount: u64,
        awarded_at: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Administrative balance change, recorded in the ledger. The balance
    /// floors at zero; the returned value is the balance after the change.
    async fn adjust_balance(
        &self,
        user_id: &str,
        delta: i64,
        awarded_at: DateTime<Utc>,
    ) -> StoreResult<u64>;
}
