// Order service - user-facing order operations
//
// - Accrual order upload (reconciled later by the accrual workers)
// - Balance and withdrawal history
// - Withdrawals, debited in one transaction with the user row locked

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use super::models::{AccrualRegistration, BalanceResponse, WithdrawalRegistration};
use crate::error::{AppError, AppResult};
use crate::ledger::models::{AccrualOrder, NewWithdrawal, WithdrawalOrder, AMOUNT_SCALE};
use crate::ledger::{run_in_transaction, OrderStore};

pub struct OrderService {
    store: Arc<dyn OrderStore>,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    // ========== ACCRUALS ==========

    pub async fn register_accrual(
        &self,
        user_id: i64,
        number: &str,
    ) -> AppResult<AccrualRegistration> {
        validate_order_number(number)?;

        if let Some(existing) = self.store.get_accrual_order(number).await? {
            return owned_by(&existing, user_id);
        }

        match self.store.create_accrual_order(user_id, number).await {
            Ok(order) => {
                info!("📦 Accrual order {} accepted for user {}", number, user_id);
                Ok(AccrualRegistration::Accepted(order))
            }
            // lost a race with a concurrent upload of the same number
            Err(AppError::Conflict(msg)) => match self.store.get_accrual_order(number).await? {
                Some(existing) => owned_by(&existing, user_id),
                None => Err(AppError::Conflict(msg)),
            },
            Err(e) => Err(e),
        }
    }

    pub async fn list_accruals(&self, user_id: i64) -> AppResult<Vec<AccrualOrder>> {
        self.store.list_accrual_orders(user_id).await
    }

    // ========== BALANCE & WITHDRAWALS ==========

    pub async fn balance(&self, user_id: i64) -> AppResult<BalanceResponse> {
        let user = self
            .store
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        let withdrawn = self.store.withdrawn_total(user_id).await?;

        Ok(BalanceResponse {
            current: user.current_balance(),
            withdrawn,
        })
    }

    pub async fn register_withdrawal(
        &self,
        user_id: i64,
        number: &str,
        sum: Decimal,
    ) -> AppResult<WithdrawalRegistration> {
        validate_order_number(number)?;
        if sum <= Decimal::ZERO {
            return Err(AppError::InvalidInput(format!(
                "Withdrawal sum must be positive, got {}",
                sum
            )));
        }
        if sum.normalize().scale() > AMOUNT_SCALE {
            return Err(AppError::InvalidInput(format!(
                "Withdrawal sum {} has more than {} decimal places",
                sum, AMOUNT_SCALE
            )));
        }

        if self.store.get_withdrawal_order(user_id, number).await?.is_some() {
            return Ok(WithdrawalRegistration::AlreadyRegistered);
        }

        let withdrawal = NewWithdrawal {
            number: number.to_string(),
            user_id,
            amount: sum,
        };

        let order = run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let mut user = tx
                    .get_user_by_id(withdrawal.user_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(format!("User {} not found", withdrawal.user_id))
                    })?;

                user.debit(withdrawal.amount)?;
                let order = tx.create_withdrawal_order(&withdrawal).await?;
                tx.update_user_balance(&user).await?;
                Ok(order)
            })
        })
        .await?;

        info!(
            "💸 Withdrawal {} of {} processed for user {}",
            order.number, order.amount, user_id
        );
        Ok(WithdrawalRegistration::Processed(order))
    }

    pub async fn list_withdrawals(&self, user_id: i64) -> AppResult<Vec<WithdrawalOrder>> {
        self.store.list_withdrawal_orders(user_id).await
    }
}

fn owned_by(existing: &AccrualOrder, user_id: i64) -> AppResult<AccrualRegistration> {
    if existing.user_id == user_id {
        Ok(AccrualRegistration::AlreadyRegistered)
    } else {
        Err(AppError::Conflict(format!(
            "Order {} was uploaded by another user",
            existing.number
        )))
    }
}

/// Order numbers are non-empty strings of ASCII digits.
pub fn validate_order_number(number: &str) -> AppResult<()> {
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidOrderNumber(number.to_string()));
    }
    Ok(())
}
