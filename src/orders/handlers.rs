use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};

use super::models::*;
use crate::auth::AuthUser;
use crate::error::AppResult;
use crate::middleware::ValidatedJson;
use crate::server::AppState;

/// Upload an order for accrual
/// POST /api/user/orders
pub async fn register_accrual_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(request): ValidatedJson<AccrualOrderRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let registration = state
        .orders
        .register_accrual(user.user_id, request.order_id.trim())
        .await?;

    Ok(match registration {
        AccrualRegistration::Accepted(_) => (
            StatusCode::ACCEPTED,
            Json(MessageResponse::new("order accepted for processing")),
        ),
        AccrualRegistration::AlreadyRegistered => (
            StatusCode::OK,
            Json(MessageResponse::new("order already uploaded by this user")),
        ),
    })
}

/// GET /api/user/orders
pub async fn list_accrual_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Response> {
    let orders = state.orders.list_accruals(user.user_id).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<AccrualOrderResponse> = orders.into_iter().map(Into::into).collect();
    Ok(Json(body).into_response())
}

/// GET /api/user/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<BalanceResponse>> {
    Ok(Json(state.orders.balance(user.user_id).await?))
}

/// POST /api/user/balance/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(request): ValidatedJson<WithdrawalRequest>,
) -> AppResult<Json<MessageResponse>> {
    let registration = state
        .orders
        .register_withdrawal(user.user_id, request.order.trim(), request.sum)
        .await?;

    let message = match registration {
        WithdrawalRegistration::Processed(_) => "withdrawal processed",
        WithdrawalRegistration::AlreadyRegistered => "withdrawal already registered by this user",
    };
    Ok(Json(MessageResponse::new(message)))
}

/// GET /api/user/withdrawals
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Response> {
    let withdrawals = state.orders.list_withdrawals(user.user_id).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<WithdrawalResponse> = withdrawals.into_iter().map(Into::into).collect();
    Ok(Json(body).into_response())
}
