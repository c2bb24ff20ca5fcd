use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    auth::AuthUser,
    error::AppError,
    models::{Product, Role},
    state::State as AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub product_name: Option<String>,
    pub description: Option<String>,
    pub price_per_unit: Option<f64>,
    pub unit: Option<String>,
    pub available_quantity: Option<i64>,
    pub product_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub product_name: Option<String>,
    pub description: Option<String>,
    pub price_per_unit: Option<f64>,
    pub unit: Option<String>,
    pub available_quantity: Option<i64>,
    pub product_image_url: Option<String>,
}

pub async fn list_products(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let products: Vec<Product> =
        sqlx::query_as("SELECT * FROM products ORDER BY product_id DESC")
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(products))
}

pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let product: Option<Product> =
        sqlx::query_as("SELECT * FROM products WHERE product_id = ?")
            .bind(product_id)
            .fetch_optional(&state.pool)
            .await?;

    match product {
        Some(product) => Ok(Json(product)),
        None => Err(AppError::NotFound("Product not found".to_string())),
    }
}

pub async fn create_product(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_role(&[Role::Seller, Role::Admin])?;

    let Some(product_name) = body.product_name.filter(|n| !n.trim().is_empty()) else {
        return Err(AppError::Validation(
            "Name and price are required".to_string(),
        ));
    };
    let Some(price_per_unit) = body.price_per_unit else {
        return Err(AppError::Validation(
            "Name and price are required".to_string(),
        ));
    };

    let product_id = sqlx::query(
        "INSERT INTO products
           (seller_id, product_name, description, price_per_unit, unit,
            available_quantity, product_image_url)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(auth.user_id)
    .bind(product_name.trim())
    .bind(body.description.unwrap_or_default())
    .bind(price_per_unit)
    .bind(body.unit)
    .bind(body.available_quantity.unwrap_or(0))
    .bind(body.product_image_url)
    .execute(&state.pool)
    .await?
    .last_insert_rowid();

    info!(product_id, seller_id = auth.user_id, "Product created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Product created successfully", "productId": product_id })),
    ))
}

/// Sellers may edit only their own products; admins may edit any.
async fn check_ownership(
    state: &AppState,
    auth: &AuthUser,
    product_id: i64,
) -> Result<(), AppError> {
    let seller_id: Option<(Option<i64>,)> =
        sqlx::query_as("SELECT seller_id FROM products WHERE product_id = ?")
            .bind(product_id)
            .fetch_optional(&state.pool)
            .await?;

    let Some((seller_id,)) = seller_id else {
        return Err(AppError::NotFound("Product not found".to_string()));
    };

    if auth.role != Role::Admin && seller_id != Some(auth.user_id) {
        return Err(AppError::Forbidden("Access denied.".to_string()));
    }

    Ok(())
}

pub async fn update_product(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(product_id): Path<i64>,
    Json(body): Json<UpdateProductRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_role(&[Role::Seller, Role::Admin])?;
    check_ownership(&state, &auth, product_id).await?;

    if let Some(quantity) = body.available_quantity {
        if quantity < 0 {
            return Err(AppError::Validation(
                "available_quantity must not be negative".to_string(),
            ));
        }
    }

    sqlx::query(
        "UPDATE products SET
           product_name = COALESCE(?, product_name),
           description = COALESCE(?, description),
           price_per_unit = COALESCE(?, price_per_unit),
           unit = COALESCE(?, unit),
           available_quantity = COALESCE(?, available_quantity),
           product_image_url = COALESCE(?, product_image_url),
           updated_at = CURRENT_TIMESTAMP
         WHERE product_id = ?",
    )
    .bind(body.product_name)
    .bind(body.description)
    .bind(body.price_per_unit)
    .bind(body.unit)
    .bind(body.available_quantity)
    .bind(body.product_image_url)
    .bind(product_id)
    .execute(&state.pool)
    .await?;

    Ok(Json(json!({ "message": "Product updated successfully" })))
}

pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_role(&[Role::Seller, Role::Admin])?;
    check_ownership(&state, &auth, product_id).await?;

    sqlx::query("DELETE FROM products WHERE product_id = ?")
        .bind(product_id)
        .execute(&state.pool)
        .await?;

    info!(product_id, "Product deleted");

    Ok(Json(json!({ "message": "Product deleted successfully" })))
}
