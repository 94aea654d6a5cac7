use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::debug;

use super::models::*;
use super::store::{OrderStore, StoreTx};
use crate::error::{AppError, AppResult};

const USER_COLUMNS: &str = "id, login, password_hash, balance, created_at";
const ACCRUAL_COLUMNS: &str = "id, number, user_id, status, amount, uploaded_at";
const WITHDRAWAL_COLUMNS: &str = "id, number, user_id, amount, created_at";

/// PostgreSQL-backed order store
pub struct PgLedger {
    pub pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps a unique-key violation to `Conflict`, everything else to `Database`.
fn unique_or_database(error: sqlx::Error, conflict: impl FnOnce() -> String) -> AppError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(conflict()),
        _ => AppError::Database(error),
    }
}

// Shared by the pooled and the transactional paths.

async fn update_accrual_order_on(
    conn: &mut PgConnection,
    order: &AccrualOrder,
) -> AppResult<AccrualOrder> {
    let updated = sqlx::query_as::<_, AccrualOrder>(&format!(
        r#"
        UPDATE accrual_orders
        SET status = $2, amount = $3
        WHERE number = $1 AND status NOT IN ('INVALID', 'PROCESSED')
        RETURNING {ACCRUAL_COLUMNS}
        "#
    ))
    .bind(&order.number)
    .bind(order.status)
    .bind(order.amount)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(updated) = updated {
        return Ok(updated);
    }

    // Nothing matched: either the order is gone or it is already terminal.
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM accrual_orders WHERE number = $1")
        .bind(&order.number)
        .fetch_optional(&mut *conn)
        .await?;

    match exists {
        Some(_) => Err(AppError::OrderFinalized(order.number.clone())),
        None => Err(AppError::NotFound(format!("Accrual order {} not found", order.number))),
    }
}

async fn update_user_balance_on(conn: &mut PgConnection, user: &User) -> AppResult<User> {
    let updated = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET balance = $2
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(user.id)
    .bind(user.balance)
    .fetch_optional(&mut *conn)
    .await?;

    updated.ok_or_else(|| AppError::NotFound(format!("User {} not found", user.id)))
}

#[async_trait]
impl OrderStore for PgLedger {
    // ========== USER OPERATIONS ==========

    async fn create_user(&self, login: &str, password_hash: &str) -> AppResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (login, password_hash)
            VALUES ($1, $2)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(login)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_or_database(e, || format!("Login {} is already taken", login)))
    }

    async fn get_user_by_login(&self, login: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE login = $1"
        ))
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: i64) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    // ========== ACCRUAL ORDERS ==========

    async fn create_accrual_order(&self, user_id: i64, number: &str) -> AppResult<AccrualOrder> {
        sqlx::query_as::<_, AccrualOrder>(&format!(
            r#"
            INSERT INTO accrual_orders (number, user_id, status)
            VALUES ($1, $2, $3)
            RETURNING {ACCRUAL_COLUMNS}
            "#
        ))
        .bind(number)
        .bind(user_id)
        .bind(OrderStatus::New)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_or_database(e, || format!("Order {} is already registered", number)))
    }

    async fn get_accrual_order(&self, number: &str) -> AppResult<Option<AccrualOrder>> {
        let order = sqlx::query_as::<_, AccrualOrder>(&format!(
            "SELECT {ACCRUAL_COLUMNS} FROM accrual_orders WHERE number = $1"
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn list_accrual_orders(&self, user_id: i64) -> AppResult<Vec<AccrualOrder>> {
        let orders = sqlx::query_as::<_, AccrualOrder>(&format!(
            r#"
            SELECT {ACCRUAL_COLUMNS}
            FROM accrual_orders
            WHERE user_id = $1
            ORDER BY uploaded_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn get_orders_by_status(&self, statuses: &[OrderStatus]) -> AppResult<Vec<AccrualOrder>> {
        let orders = sqlx::query_as::<_, AccrualOrder>(&format!(
            r#"
            SELECT {ACCRUAL_COLUMNS}
            FROM accrual_orders
            WHERE status = ANY($1)
            ORDER BY id
            "#
        ))
        .bind(statuses)
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} orders in statuses {:?}", orders.len(), statuses);
        Ok(orders)
    }

    async fn update_accrual_order(&self, order: &AccrualOrder) -> AppResult<AccrualOrder> {
        let mut conn = self.pool.acquire().await?;
        update_accrual_order_on(&mut conn, order).await
    }

    // ========== WITHDRAWALS ==========

    async fn get_withdrawal_order(
        &self,
        user_id: i64,
        number: &str,
    ) -> AppResult<Option<WithdrawalOrder>> {
        let order = sqlx::query_as::<_, WithdrawalOrder>(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_orders WHERE user_id = $1 AND number = $2"
        ))
        .bind(user_id)
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn list_withdrawal_orders(&self, user_id: i64) -> AppResult<Vec<WithdrawalOrder>> {
        let orders = sqlx::query_as::<_, WithdrawalOrder>(&format!(
            r#"
            SELECT {WITHDRAWAL_COLUMNS}
            FROM withdrawal_orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn withdrawn_total(&self, user_id: i64) -> AppResult<Decimal> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM withdrawal_orders WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    // ========== TRANSACTIONS ==========

    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

/// Open PostgreSQL transaction
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn update_accrual_order(&mut self, order: &AccrualOrder) -> AppResult<AccrualOrder> {
        update_accrual_order_on(&mut self.tx, order).await
    }

    async fn get_user_by_id(&mut self, user_id: i64) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn update_user_balance(&mut self, user: &User) -> AppResult<User> {
        update_user_balance_on(&mut self.tx, user).await
    }

    async fn create_withdrawal_order(
        &mut self,
        withdrawal: &NewWithdrawal,
    ) -> AppResult<WithdrawalOrder> {
        sqlx::query_as::<_, WithdrawalOrder>(&format!(
            r#"
            INSERT INTO withdrawal_orders (number, user_id, amount)
            VALUES ($1, $2, $3)
            RETURNING {WITHDRAWAL_COLUMNS}
            "#
        ))
        .bind(&withdrawal.number)
        .bind(withdrawal.user_id)
        .bind(withdrawal.amount)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            unique_or_database(e, || {
                format!("Withdrawal {} is already registered", withdrawal.number)
            })
        })
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        this.tx.rollback().await?;
        Ok(())
    }
}
