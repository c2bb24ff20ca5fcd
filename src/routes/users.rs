use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    auth::{issue_token, AuthUser},
    error::AppError,
    models::{Role, User},
    state::State as AppState,
};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub location: Option<String>,
    pub profile_picture_url: Option<String>,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(username), Some(email), Some(password)) = (
        body.username.filter(|s| !s.is_empty()),
        body.email.filter(|s| !s.is_empty()),
        body.password.filter(|s| !s.is_empty()),
    ) else {
        return Err(AppError::Validation(
            "Username, email, and password are required.".to_string(),
        ));
    };

    let hashed = bcrypt::hash(&password, state.config.bcrypt_cost)
        .map_err(|e| AppError::Internal(Box::new(e)))?;

    let result = sqlx::query(
        "INSERT INTO users (username, email, password, user_role) VALUES (?, ?, ?, 'customer')",
    )
    .bind(&username)
    .bind(&email)
    .bind(&hashed)
    .execute(&state.pool)
    .await;

    match result {
        Ok(_) => {
            info!(%username, "User registered");
            Ok((
                StatusCode::CREATED,
                Json(json!({ "message": "Registration successful! You can now log in." })),
            ))
        }
        Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => Err(
            AppError::Conflict("Username or email already exists.".to_string()),
        ),
        Err(e) => Err(e.into()),
    }
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(username), Some(password)) = (body.username, body.password) else {
        return Err(AppError::Validation(
            "Username and password are required.".to_string(),
        ));
    };

    let user: Option<(i64, String, String, Role)> = sqlx::query_as(
        "SELECT user_id, username, password, user_role FROM users WHERE username = ?",
    )
    .bind(&username)
    .fetch_optional(&state.pool)
    .await?;

    let Some((user_id, username, hash, role)) = user else {
        return Err(AppError::Unauthorized(
            "Invalid username or password.".to_string(),
        ));
    };

    let valid =
        bcrypt::verify(&password, &hash).map_err(|e| AppError::Internal(Box::new(e)))?;
    if !valid {
        return Err(AppError::Unauthorized(
            "Invalid username or password.".to_string(),
        ));
    }

    let token = issue_token(
        &state.config.jwt_secret,
        state.config.token_ttl_hours,
        user_id,
        role,
    )?;

    info!(user_id, "User logged in");

    Ok(Json(json!({
        "message": "Login successful",
        "token": token,
        "user": { "user_id": user_id, "username": username, "user_role": role },
    })))
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE user_id = ?")
        .bind(auth.user_id)
        .fetch_optional(&state.pool)
        .await?;

    match user {
        Some(user) => Ok(Json(user)),
        None => Err(AppError::NotFound("User not found.".to_string())),
    }
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    sqlx::query(
        "UPDATE users SET
           email = COALESCE(?, email),
           phone_number = COALESCE(?, phone_number),
           address = COALESCE(?, address),
           location = COALESCE(?, location),
           profile_picture_url = COALESCE(?, profile_picture_url),
           updated_at = CURRENT_TIMESTAMP
         WHERE user_id = ?",
    )
    .bind(body.email)
    .bind(body.phone_number)
    .bind(body.address)
    .bind(body.location)
    .bind(body.profile_picture_url)
    .bind(auth.user_id)
    .execute(&state.pool)
    .await?;

    Ok(Json(json!({ "message": "Profile updated successfully" })))
}
