use async_trait::async_trait;
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use tracing::warn;

use super::models::{AccrualOrder, NewWithdrawal, OrderStatus, User, WithdrawalOrder};
use crate::error::AppResult;

/// Order store - the single source of truth for orders and balances.
///
/// Implementations must make `StoreTx` serializable with respect to balance
/// updates of the same user, and must refuse updates to orders already in a
/// terminal status (`AppError::OrderFinalized`).
#[async_trait]
pub trait OrderStore: Send + Sync {
    // ========== USER OPERATIONS ==========

    async fn create_user(&self, login: &str, password_hash: &str) -> AppResult<User>;

    async fn get_user_by_login(&self, login: &str) -> AppResult<Option<User>>;

    async fn get_user_by_id(&self, user_id: i64) -> AppResult<Option<User>>;

    // ========== ACCRUAL ORDERS ==========

    async fn create_accrual_order(&self, user_id: i64, number: &str) -> AppResult<AccrualOrder>;

    async fn get_accrual_order(&self, number: &str) -> AppResult<Option<AccrualOrder>>;

    /// Newest first
    async fn list_accrual_orders(&self, user_id: i64) -> AppResult<Vec<AccrualOrder>>;

    async fn get_orders_by_status(&self, statuses: &[OrderStatus]) -> AppResult<Vec<AccrualOrder>>;

    async fn update_accrual_order(&self, order: &AccrualOrder) -> AppResult<AccrualOrder>;

    // ========== WITHDRAWALS ==========

    async fn get_withdrawal_order(
        &self,
        user_id: i64,
        number: &str,
    ) -> AppResult<Option<WithdrawalOrder>>;

    /// Newest first
    async fn list_withdrawal_orders(&self, user_id: i64) -> AppResult<Vec<WithdrawalOrder>>;

    async fn withdrawn_total(&self, user_id: i64) -> AppResult<Decimal>;

    // ========== TRANSACTIONS ==========

    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;
}

/// An open store transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait StoreTx: Send {
    async fn update_accrual_order(&mut self, order: &AccrualOrder) -> AppResult<AccrualOrder>;

    /// Loads the user and locks the row until the transaction ends.
    async fn get_user_by_id(&mut self, user_id: i64) -> AppResult<Option<User>>;

    async fn update_user_balance(&mut self, user: &User) -> AppResult<User>;

    async fn create_withdrawal_order(
        &mut self,
        withdrawal: &NewWithdrawal,
    ) -> AppResult<WithdrawalOrder>;

    async fn commit(self: Box<Self>) -> AppResult<()>;

    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// Runs `f` inside one store transaction.
///
/// Commits iff `f` returns `Ok`. Otherwise rolls back and returns the original
/// error; a failed rollback is only logged.
pub async fn run_in_transaction<T, F>(store: &dyn OrderStore, f: F) -> AppResult<T>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut dyn StoreTx) -> BoxFuture<'t, AppResult<T>> + Send,
{
    let mut tx = store.begin().await?;

    match f(tx.as_mut()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Transaction rollback failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}
