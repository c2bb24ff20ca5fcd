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
    models::{Ingredient, RecipeIngredient, Role},
    state::State as AppState,
};

#[derive(Debug, Deserialize)]
pub struct IngredientRequest {
    pub ingredient_name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
}

pub async fn list_ingredients(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let ingredients: Vec<Ingredient> =
        sqlx::query_as("SELECT * FROM ingredients ORDER BY ingredient_name ASC")
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(ingredients))
}

pub async fn list_recipe_ingredients(
    State(state): State<Arc<AppState>>,
    Path(recipe_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let ingredients: Vec<RecipeIngredient> = sqlx::query_as(
        "SELECT i.ingredient_id, i.ingredient_name, i.description, i.unit,
                ri.quantity, ri.unit AS recipe_unit
         FROM ingredients i
         JOIN recipe_ingredients ri ON i.ingredient_id = ri.ingredient_id
         WHERE ri.recipe_id = ?
         ORDER BY i.ingredient_name ASC",
    )
    .bind(recipe_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ingredients))
}

pub async fn create_ingredient(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<IngredientRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_role(&[Role::Admin])?;

    let Some(name) = body.ingredient_name.filter(|n| !n.trim().is_empty()) else {
        return Err(AppError::Validation(
            "Ingredient name is required.".to_string(),
        ));
    };

    sqlx::query("INSERT INTO ingredients (ingredient_name, description, unit) VALUES (?, ?, ?)")
        .bind(name.trim())
        .bind(body.description.unwrap_or_default())
        .bind(body.unit.unwrap_or_else(|| "piece".to_string()))
        .execute(&state.pool)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Ingredient created successfully" })),
    ))
}

pub async fn update_ingredient(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(ingredient_id): Path<i64>,
    Json(body): Json<IngredientRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_role(&[Role::Admin])?;

    let affected = sqlx::query(
        "UPDATE ingredients SET
           ingredient_name = COALESCE(?, ingredient_name),
           description = COALESCE(?, description),
           unit = COALESCE(?, unit)
         WHERE ingredient_id = ?",
    )
    .bind(body.ingredient_name)
    .bind(body.description)
    .bind(body.unit)
    .bind(ingredient_id)
    .execute(&state.pool)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound("Ingredient not found".to_string()));
    }

    Ok(Json(json!({ "message": "Ingredient updated successfully" })))
}

pub async fn delete_ingredient(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(ingredient_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_role(&[Role::Admin])?;

    let affected = sqlx::query("DELETE FROM ingredients WHERE ingredient_id = ?")
        .bind(ingredient_id)
        .execute(&state.pool)
        .await?
        .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound("Ingredient not found".to_string()));
    }

    Ok(Json(json!({ "message": "Ingredient deleted successfully" })))
}
