use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgHasArrayType, PgTypeInfo};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Decimal places kept by the `NUMERIC(18, 2)` balance and amount columns
pub const AMOUNT_SCALE: u32 = 2;

/// Accrual order status.
///
/// `INVALID` and `PROCESSED` are terminal: once reached, the row never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "accrual_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl PgHasArrayType for OrderStatus {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_accrual_status")
    }
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Registered => "REGISTERED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(OrderStatus::New),
            "REGISTERED" => Ok(OrderStatus::Registered),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "INVALID" => Ok(OrderStatus::Invalid),
            "PROCESSED" => Ok(OrderStatus::Processed),
            other => Err(AppError::Config(format!("unknown order status: {}", other))),
        }
    }
}

///User entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub login: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// `None` until the first credit; read as zero.
    pub balance: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn current_balance(&self) -> Decimal {
        self.balance.unwrap_or(Decimal::ZERO)
    }

    pub fn credit(&mut self, amount: Decimal) {
        self.balance = Some(self.current_balance() + amount);
    }

    pub fn has_available(&self, required: Decimal) -> bool {
        self.current_balance() >= required
    }

    /// Debit is refused rather than letting the balance go negative.
    pub fn debit(&mut self, amount: Decimal) -> Result<(), AppError> {
        if !self.has_available(amount) {
            return Err(AppError::InsufficientFunds {
                required: amount.to_string(),
                available: self.current_balance().to_string(),
            });
        }
        self.balance = Some(self.current_balance() - amount);
        Ok(())
    }
}

/// Order submitted for point accrual
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AccrualOrder {
    pub id: i64,
    pub number: String,
    pub user_id: i64,
    pub status: OrderStatus,
    pub amount: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}

/// Points spent against a user's balance. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WithdrawalOrder {
    pub id: i64,
    pub number: String,
    pub user_id: i64,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub number: String,
    pub user_id: i64,
    pub amount: Decimal,
}
