use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::AuthUser,
    error::AppError,
    models::{Recipe, Role},
    state::State as AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateRecipeRequest {
    pub recipe_name: Option<String>,
    pub ingredients: Option<String>,
    pub instructions: Option<String>,
    pub recipe_image_url: Option<String>,
}

pub async fn list_recipes(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let recipes: Vec<Recipe> = sqlx::query_as("SELECT * FROM recipes ORDER BY recipe_id DESC")
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(recipes))
}

pub async fn create_recipe(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateRecipeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let Some(recipe_name) = body.recipe_name.filter(|n| !n.trim().is_empty()) else {
        return Err(AppError::Validation("Recipe name is required".to_string()));
    };

    let recipe_id = sqlx::query(
        "INSERT INTO recipes (user_id, recipe_name, ingredients, instructions, recipe_image_url)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(auth.user_id)
    .bind(recipe_name.trim())
    .bind(body.ingredients)
    .bind(body.instructions)
    .bind(body.recipe_image_url)
    .execute(&state.pool)
    .await?
    .last_insert_rowid();

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Recipe created successfully", "recipeId": recipe_id })),
    ))
}

pub async fn delete_recipe(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(recipe_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let owner: Option<(Option<i64>,)> =
        sqlx::query_as("SELECT user_id FROM recipes WHERE recipe_id = ?")
            .bind(recipe_id)
            .fetch_optional(&state.pool)
            .await?;

    let Some((owner,)) = owner else {
        return Err(AppError::NotFound("Recipe not found".to_string()));
    };

    if auth.role != Role::Admin && owner != Some(auth.user_id) {
        return Err(AppError::Forbidden("Access denied.".to_string()));
    }

    sqlx::query("DELETE FROM recipes WHERE recipe_id = ?")
        .bind(recipe_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(json!({ "message": "Recipe deleted successfully" })))
}
