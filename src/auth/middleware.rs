use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use super::models::AuthUser;
use crate::error::AppError;
use crate::server::AppState;

/// Requires `Authorization: Bearer <jwt>` and exposes the caller as `AuthUser`.
pub async fn jwt_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let user_id = state.auth.verify_token(token.trim())?;

    request.extensions_mut().insert(AuthUser { user_id });
    Ok(next.run(request).await)
}
