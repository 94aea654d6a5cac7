// In-memory order store for tests.
//
// Transactions take the store lock for their whole lifetime and work on a
// staged copy, so they are serializable: commit publishes the copy, rollback
// (or drop) discards it.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::models::*;
use super::store::{OrderStore, StoreTx};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: Vec<User>,
    accrual_orders: Vec<AccrualOrder>,
    withdrawal_orders: Vec<WithdrawalOrder>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn update_accrual_order(&mut self, order: &AccrualOrder) -> AppResult<AccrualOrder> {
        let stored = self
            .accrual_orders
            .iter_mut()
            .find(|o| o.number == order.number)
            .ok_or_else(|| AppError::NotFound(format!("Accrual order {} not found", order.number)))?;

        if stored.status.is_terminal() {
            return Err(AppError::OrderFinalized(order.number.clone()));
        }

        stored.status = order.status;
        stored.amount = order.amount;
        Ok(stored.clone())
    }

    fn update_user_balance(&mut self, user: &User) -> AppResult<User> {
        let stored = self
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.id)))?;

        if user.current_balance() < Decimal::ZERO {
            return Err(AppError::Internal("balance check constraint violated".to_string()));
        }

        stored.balance = user.balance;
        Ok(stored.clone())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_balance_updates: Arc<AtomicBool>,
    fail_status_queries: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every balance write fail until reset.
    pub fn fail_balance_updates(&self, fail: bool) {
        self.fail_balance_updates.store(fail, Ordering::SeqCst);
    }

    /// Makes `get_orders_by_status` fail until reset.
    pub fn fail_status_queries(&self, fail: bool) {
        self.fail_status_queries.store(fail, Ordering::SeqCst);
    }

    pub async fn seed_user(&self, login: &str, balance: Option<Decimal>) -> User {
        let mut state = self.state.lock().await;
        let user = User {
            id: state.next_id(),
            login: login.to_string(),
            password_hash: String::new(),
            balance,
            created_at: Utc::now(),
        };
        state.users.push(user.clone());
        user
    }

    pub async fn seed_order(&self, user_id: i64, number: &str, status: OrderStatus) -> AccrualOrder {
        let mut state = self.state.lock().await;
        let order = AccrualOrder {
            id: state.next_id(),
            number: number.to_string(),
            user_id,
            status,
            amount: None,
            uploaded_at: Utc::now(),
        };
        state.accrual_orders.push(order.clone());
        order
    }

    pub async fn order(&self, number: &str) -> Option<AccrualOrder> {
        self.get_accrual_order(number).await.ok().flatten()
    }

    pub async fn balance(&self, user_id: i64) -> Decimal {
        self.get_user_by_id(user_id)
            .await
            .ok()
            .flatten()
            .map(|u| u.current_balance())
            .unwrap_or(Decimal::ZERO)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.users.iter().any(|u| u.login == login) {
            return Err(AppError::Conflict(format!("Login {} is already taken", login)));
        }
        let user = User {
            id: state.next_id(),
            login: login.to_string(),
            password_hash: password_hash.to_string(),
            balance: Some(Decimal::ZERO),
            created_at: Utc::now(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn get_user_by_login(&self, login: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.login == login).cloned())
    }

    async fn get_user_by_id(&self, user_id: i64) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn create_accrual_order(&self, user_id: i64, number: &str) -> AppResult<AccrualOrder> {
        let mut state = self.state.lock().await;
        if state.accrual_orders.iter().any(|o| o.number == number) {
            return Err(AppError::Conflict(format!("Order {} is already registered", number)));
        }
        let order = AccrualOrder {
            id: state.next_id(),
            number: number.to_string(),
            user_id,
            status: OrderStatus::New,
            amount: None,
            uploaded_at: Utc::now(),
        };
        state.accrual_orders.push(order.clone());
        Ok(order)
    }

    async fn get_accrual_order(&self, number: &str) -> AppResult<Option<AccrualOrder>> {
        let state = self.state.lock().await;
        Ok(state.accrual_orders.iter().find(|o| o.number == number).cloned())
    }

    async fn list_accrual_orders(&self, user_id: i64) -> AppResult<Vec<AccrualOrder>> {
        let state = self.state.lock().await;
        Ok(state
            .accrual_orders
            .iter()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_orders_by_status(&self, statuses: &[OrderStatus]) -> AppResult<Vec<AccrualOrder>> {
        if self.fail_status_queries.load(Ordering::SeqCst) {
            return Err(AppError::Internal("injected status query failure".to_string()));
        }
        let state = self.state.lock().await;
        Ok(state
            .accrual_orders
            .iter()
            .filter(|o| statuses.contains(&o.status))
            .cloned()
            .collect())
    }

    async fn update_accrual_order(&self, order: &AccrualOrder) -> AppResult<AccrualOrder> {
        self.state.lock().await.update_accrual_order(order)
    }

    async fn get_withdrawal_order(
        &self,
        user_id: i64,
        number: &str,
    ) -> AppResult<Option<WithdrawalOrder>> {
        let state = self.state.lock().await;
        Ok(state
            .withdrawal_orders
            .iter()
            .find(|w| w.user_id == user_id && w.number == number)
            .cloned())
    }

    async fn list_withdrawal_orders(&self, user_id: i64) -> AppResult<Vec<WithdrawalOrder>> {
        let state = self.state.lock().await;
        Ok(state
            .withdrawal_orders
            .iter()
            .rev()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn withdrawn_total(&self, user_id: i64) -> AppResult<Decimal> {
        let state = self.state.lock().await;
        Ok(state
            .withdrawal_orders
            .iter()
            .filter(|w| w.user_id == user_id)
            .map(|w| w.amount)
            .sum())
    }

    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            staged,
            fail_balance_updates: self.fail_balance_updates.load(Ordering::SeqCst),
        }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    fail_balance_updates: bool,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn update_accrual_order(&mut self, order: &AccrualOrder) -> AppResult<AccrualOrder> {
        self.staged.update_accrual_order(order)
    }

    async fn get_user_by_id(&mut self, user_id: i64) -> AppResult<Option<User>> {
        Ok(self.staged.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn update_user_balance(&mut self, user: &User) -> AppResult<User> {
        if self.fail_balance_updates {
            return Err(AppError::Internal("injected balance update failure".to_string()));
        }
        self.staged.update_user_balance(user)
    }

    async fn create_withdrawal_order(
        &mut self,
        withdrawal: &NewWithdrawal,
    ) -> AppResult<WithdrawalOrder> {
        let duplicate = self
            .staged
            .withdrawal_orders
            .iter()
            .any(|w| w.user_id == withdrawal.user_id && w.number == withdrawal.number);
        if duplicate {
            return Err(AppError::Conflict(format!(
                "Withdrawal {} is already registered",
                withdrawal.number
            )));
        }

        let order = WithdrawalOrder {
            id: self.staged.next_id(),
            number: withdrawal.number.clone(),
            user_id: withdrawal.user_id,
            amount: withdrawal.amount,
            created_at: Utc::now(),
        };
        self.staged.withdrawal_orders.push(order.clone());
        Ok(order)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}
