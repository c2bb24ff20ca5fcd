//! Bearer-token authentication.
//!
//! Handlers take [`AuthUser`] as an extractor; it verifies the JWT and
//! re-checks the user row so a deleted account or a changed role takes
//! effect immediately, not at token expiry.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, models::Role, state::State};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub role: Role,
    pub exp: i64,
}

pub fn issue_token(
    secret: &str,
    ttl_hours: i64,
    user_id: i64,
    role: Role,
) -> Result<String, AppError> {
    let claims = Claims {
        user_id,
        role,
        exp: (Utc::now() + Duration::hours(ttl_hours)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(Box::new(e)))
}

#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i64,
    pub role: Role,
}

impl AuthUser {
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden("Access denied.".to_string()))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<State>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<State>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized("Access denied. No token provided.".to_string())
            })?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Unauthorized("Access denied. No token provided.".to_string())
        })?;

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized("Invalid or expired token.".to_string()))?
        .claims;

        let row: Option<(i64, Role)> =
            sqlx::query_as("SELECT user_id, user_role FROM users WHERE user_id = ?")
                .bind(claims.user_id)
                .fetch_optional(&state.pool)
                .await?;

        let Some((user_id, role)) = row else {
            return Err(AppError::Unauthorized("User not found.".to_string()));
        };

        Ok(Self { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips() {
        let token = issue_token("test-secret", 1, 42, Role::Seller).unwrap();

        let claims = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap()
        .claims;

        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.role, Role::Seller);
    }

    #[test]
    fn token_rejects_wrong_secret() {
        let token = issue_token("test-secret", 1, 42, Role::Customer).unwrap();

        let result = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"other-secret"),
            &Validation::default(),
        );

        assert!(result.is_err());
    }

    #[test]
    fn expired_token_rejected() {
        // -2 hours is well past the default decode leeway.
        let token = issue_token("test-secret", -2, 42, Role::Customer).unwrap();

        let result = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        );

        assert!(result.is_err());
    }

    #[test]
    fn role_guard() {
        let admin = AuthUser {
            user_id: 1,
            role: Role::Admin,
        };
        let customer = AuthUser {
            user_id: 2,
            role: Role::Customer,
        };

        assert!(admin.require_role(&[Role::Admin]).is_ok());
        assert!(customer
            .require_role(&[Role::Seller, Role::Admin])
            .is_err());
    }
}
