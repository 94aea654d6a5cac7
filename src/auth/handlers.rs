use axum::{extract::State, Json};
use tracing::info;

use super::models::{AuthResponse, Credentials};
use crate::error::AppResult;
use crate::middleware::ValidatedJson;
use crate::server::AppState;

/// POST /api/user/register
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(credentials): ValidatedJson<Credentials>,
) -> AppResult<Json<AuthResponse>> {
    let response = state.auth.register(&credentials).await?;
    Ok(Json(response))
}

/// POST /api/user/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(credentials): ValidatedJson<Credentials>,
) -> AppResult<Json<AuthResponse>> {
    let response = state.auth.login(&credentials).await?;
    info!("🔑 User {} logged in", credentials.login);
    Ok(Json(response))
}
