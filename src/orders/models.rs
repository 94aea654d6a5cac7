use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::ledger::models::{AccrualOrder, OrderStatus, WithdrawalOrder};

// ========== REQUESTS ==========

/// Body of `POST /api/user/orders`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AccrualOrderRequest {
    #[validate(length(min = 1, max = 64, message = "order_id must not be empty"))]
    pub order_id: String,
}

/// Body of `POST /api/user/balance/withdraw`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WithdrawalRequest {
    #[validate(length(min = 1, max = 64, message = "order must not be empty"))]
    pub order: String,
    pub sum: Decimal,
}

// ========== RESPONSES ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrualOrderResponse {
    pub number: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<AccrualOrder> for AccrualOrderResponse {
    fn from(order: AccrualOrder) -> Self {
        Self {
            number: order.number,
            status: order.status,
            accrual: order.amount,
            uploaded_at: order.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalResponse {
    pub order: String,
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
}

impl From<WithdrawalOrder> for WithdrawalResponse {
    fn from(order: WithdrawalOrder) -> Self {
        Self {
            order: order.number,
            sum: order.amount,
            processed_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub current: Decimal,
    pub withdrawn: Decimal,
}

// ========== SERVICE OUTCOMES ==========

#[derive(Debug, Clone, PartialEq)]
pub enum AccrualRegistration {
    /// New order stored as `NEW`, waiting for reconciliation
    Accepted(AccrualOrder),
    /// The same user already uploaded this number
    AlreadyRegistered,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WithdrawalRegistration {
    Processed(WithdrawalOrder),
    AlreadyRegistered,
}
