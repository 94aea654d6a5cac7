use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use tracing::{info, warn};

use super::models::{AuthResponse, Claims, Credentials};
use crate::error::{AppError, AppResult};
use crate::ledger::OrderStore;

/// Token settings
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub expires_in: Duration,
}

pub struct AuthService {
    store: Arc<dyn OrderStore>,
    config: TokenConfig,
}

impl AuthService {
    pub fn new(store: Arc<dyn OrderStore>, config: TokenConfig) -> Self {
        Self { store, config }
    }

    /// Creates the user and signs them in.
    pub async fn register(&self, credentials: &Credentials) -> AppResult<AuthResponse> {
        if self.store.get_user_by_login(&credentials.login).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Login {} is already taken",
                credentials.login
            )));
        }

        let password_hash = hash_password(&credentials.password)?;
        let user = self
            .store
            .create_user(&credentials.login, &password_hash)
            .await?;

        info!("👤 Registered user {} ({})", user.login, user.id);
        self.issue_token(user.id)
    }

    pub async fn login(&self, credentials: &Credentials) -> AppResult<AuthResponse> {
        let user = self
            .store
            .get_user_by_login(&credentials.login)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !verify_password(&credentials.password, &user.password_hash) {
            warn!("Failed login attempt for {}", credentials.login);
            return Err(AppError::Unauthorized);
        }

        self.issue_token(user.id)
    }

    pub fn issue_token(&self, user_id: i64) -> AppResult<AuthResponse> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.config.expires_in)
            .ok_or_else(|| AppError::Internal("token expiry overflow".to_string()))?;

        let claims = Claims {
            sub: user_id.to_string(),
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))?;

        Ok(AuthResponse { token, expires_at })
    }

    /// Returns the user id carried by a valid, unexpired token.
    pub fn verify_token(&self, token: &str) -> AppResult<i64> {
        let decoding_key = DecodingKey::from_secret(self.config.secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);

        let data = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|_| AppError::Unauthorized)?;

        data.claims.sub.parse().map_err(|_| AppError::Unauthorized)
    }
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Hashing failed: {}", e)))
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}
