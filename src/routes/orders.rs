//! Order placement and status transitions.
//!
//! Placement runs as one transaction: insert the order header, then walk the
//! items in request order, checking and decrementing stock per item. Invalid,
//! missing, or oversold items are skipped and logged, never failing the order
//! as a whole; any unexpected error rolls the whole transaction back. The
//! decrement statement re-checks availability (`AND available_quantity >= ?`)
//! so the check and the decrement stand together even if the earlier read is
//! stale.
//!
//! Cancelling an order restores each item's quantity onto its product,
//! guarded on the current status so a repeated cancel cannot double-restore,
//! and in the same transaction as the status update so a failed restore
//! leaves nothing half-applied.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::{
    auth::AuthUser,
    error::AppError,
    models::{Order, OrderItemWithProduct, OrderStatus, OrderWithBuyer, Role},
    state::State as AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Option<Vec<OrderItemRequest>>,
    pub total_amount: Option<f64>,
    pub delivery_address: Option<String>,
}

/// One requested line item. Fields stay as raw JSON values because clients
/// send quantities and prices as numbers or numeric strings, and product ids
/// may be non-product pseudo-ids (e.g. `"ingredient-3"`); coercion failures
/// skip the item rather than rejecting the whole body.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRequest {
    #[serde(default)]
    pub product_id: Value,
    #[serde(default)]
    pub quantity: Value,
    #[serde(default)]
    pub price: Value,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InvalidItem,
    MissingProduct,
    InsufficientStock,
}

/// A line item dropped from an order, with why. Recorded and logged, not an
/// error: the order itself still commits.
#[derive(Debug)]
pub struct SkippedItem {
    pub product_id: Option<i64>,
    pub reason: SkipReason,
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Positive whole number, as a number or a numeric string.
fn coerce_positive_i64(value: &Value) -> Option<i64> {
    let n = coerce_f64(value)?;
    if n > 0.0 && n.fract() == 0.0 {
        Some(n as i64)
    } else {
        None
    }
}

/// Inserts an order with its inventory-checked items in one transaction.
///
/// Returns the new order id and the items that were skipped. Callers have
/// already validated the request envelope; item-level problems are handled
/// here by skipping.
pub async fn place_order(
    pool: &SqlitePool,
    buyer_id: i64,
    items: &[OrderItemRequest],
    total_amount: f64,
    delivery_address: &str,
) -> Result<(i64, Vec<SkippedItem>), AppError> {
    let mut tx = pool.begin().await?;

    let order_id = sqlx::query(
        "INSERT INTO orders (buyer_id, total_amount, delivery_address, status)
         VALUES (?, ?, ?, 'pending')",
    )
    .bind(buyer_id)
    .bind(total_amount)
    .bind(delivery_address)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let mut skipped = Vec::new();

    for item in items {
        let (Some(product_id), Some(quantity), Some(price)) = (
            coerce_positive_i64(&item.product_id),
            coerce_positive_i64(&item.quantity),
            coerce_f64(&item.price),
        ) else {
            warn!(?item, "Skipping invalid order item");
            skipped.push(SkippedItem {
                product_id: coerce_positive_i64(&item.product_id),
                reason: SkipReason::InvalidItem,
            });
            continue;
        };

        let row: Option<(i64,)> =
            sqlx::query_as("SELECT available_quantity FROM products WHERE product_id = ?")
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((available,)) = row else {
            warn!(product_id, "Skipping order item: product not found");
            skipped.push(SkippedItem {
                product_id: Some(product_id),
                reason: SkipReason::MissingProduct,
            });
            continue;
        };

        if available < quantity {
            warn!(
                product_id,
                available, requested = quantity,
                "Skipping order item: insufficient stock"
            );
            skipped.push(SkippedItem {
                product_id: Some(product_id),
                reason: SkipReason::InsufficientStock,
            });
            continue;
        }

        // Guarded decrement: zero rows affected means the stock moved under
        // us, so the item is skipped instead of driving the counter negative.
        let decremented = sqlx::query(
            "UPDATE products SET available_quantity = available_quantity - ?
             WHERE product_id = ? AND available_quantity >= ?",
        )
        .bind(quantity)
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if decremented == 0 {
            warn!(product_id, "Skipping order item: stock changed mid-order");
            skipped.push(SkippedItem {
                product_id: Some(product_id),
                reason: SkipReason::InsufficientStock,
            });
            continue;
        }

        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, quantity, price_at_time_of_order)
             VALUES (?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(product_id)
        .bind(quantity)
        .bind(price)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok((order_id, skipped))
}

/// Updates an order's status. Transitioning to `cancelled` restores each
/// item's quantity onto its product in the same transaction; restoring only
/// happens when the order was not already cancelled.
pub async fn set_order_status(
    pool: &SqlitePool,
    order_id: i64,
    status: OrderStatus,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let current: Option<(OrderStatus,)> =
        sqlx::query_as("SELECT status FROM orders WHERE order_id = ?")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?;

    let Some((current,)) = current else {
        return Err(AppError::NotFound("Order not found".to_string()));
    };

    if status == OrderStatus::Cancelled && current != OrderStatus::Cancelled {
        let items: Vec<(i64, i64)> =
            sqlx::query_as("SELECT product_id, quantity FROM order_items WHERE order_id = ?")
                .bind(order_id)
                .fetch_all(&mut *tx)
                .await?;

        for (product_id, quantity) in items {
            sqlx::query(
                "UPDATE products SET available_quantity = available_quantity + ?
                 WHERE product_id = ?",
            )
            .bind(quantity)
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

            info!(order_id, product_id, quantity, "Restored stock for cancelled order");
        }
    }

    sqlx::query("UPDATE orders SET status = ? WHERE order_id = ?")
        .bind(status)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(())
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let items = match body.items {
        Some(items) if !items.is_empty() => items,
        _ => return Err(AppError::Validation("Items are required.".to_string())),
    };

    let Some(total_amount) = body.total_amount else {
        return Err(AppError::Validation("total_amount is required.".to_string()));
    };

    let delivery_address = body.delivery_address.unwrap_or_default();
    let delivery_address = delivery_address.trim();
    if delivery_address.is_empty() {
        return Err(AppError::Validation(
            "delivery_address is required.".to_string(),
        ));
    }

    let (order_id, skipped) =
        place_order(&state.pool, auth.user_id, &items, total_amount, delivery_address).await?;

    info!(
        order_id,
        buyer_id = auth.user_id,
        requested = items.len(),
        skipped = skipped.len(),
        "Order created"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Order created successfully", "orderId": order_id })),
    ))
}

pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(order_id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_role(&[Role::Admin])?;

    let raw = body.status.unwrap_or_default();
    if raw.is_empty() {
        return Err(AppError::Validation("Status is required".to_string()));
    }

    let Some(status) = OrderStatus::parse(&raw) else {
        return Err(AppError::Validation(format!("Unknown status: {raw}")));
    };

    set_order_status(&state.pool, order_id, status).await?;

    Ok(Json(
        json!({ "message": "Order status updated successfully" }),
    ))
}

pub async fn list_my_orders(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let orders: Vec<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE buyer_id = ? ORDER BY order_date DESC")
            .bind(auth.user_id)
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(orders))
}

pub async fn list_all_orders(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    auth.require_role(&[Role::Admin])?;

    let orders: Vec<OrderWithBuyer> = sqlx::query_as(
        "SELECT o.order_id, o.buyer_id, u.username AS buyer_name, o.order_date,
                o.total_amount, o.delivery_address, o.status
         FROM orders o
         JOIN users u ON o.buyer_id = u.user_id
         ORDER BY o.order_date DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(orders))
}

/// Orders containing at least one of the caller's products.
pub async fn list_seller_orders(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    auth.require_role(&[Role::Seller, Role::Admin])?;

    let orders: Vec<OrderWithBuyer> = sqlx::query_as(
        "SELECT DISTINCT o.order_id, o.buyer_id, u.username AS buyer_name, o.order_date,
                o.total_amount, o.delivery_address, o.status
         FROM orders o
         JOIN users u ON o.buyer_id = u.user_id
         JOIN order_items oi ON oi.order_id = o.order_id
         JOIN products p ON p.product_id = oi.product_id
         WHERE p.seller_id = ?
         ORDER BY o.order_date DESC",
    )
    .bind(auth.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(orders))
}

pub async fn list_order_items(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(order_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let items: Vec<OrderItemWithProduct> = sqlx::query_as(
        "SELECT oi.order_item_id, oi.order_id, oi.product_id, p.product_name,
                oi.quantity, oi.price_at_time_of_order
         FROM order_items oi
         JOIN products p ON oi.product_id = p.product_id
         WHERE oi.order_id = ?",
    )
    .bind(order_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(items))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::database::apply_schema;
    use crate::models::OrderItem;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        pool
    }

    async fn seed_buyer(pool: &SqlitePool) -> i64 {
        sqlx::query(
            "INSERT INTO users (username, email, password) VALUES ('buyer', 'b@x.com', 'hash')",
        )
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn seed_product(pool: &SqlitePool, name: &str, price: f64, stock: i64) -> i64 {
        sqlx::query(
            "INSERT INTO products (product_name, price_per_unit, available_quantity)
             VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn stock_of(pool: &SqlitePool, product_id: i64) -> i64 {
        sqlx::query_scalar("SELECT available_quantity FROM products WHERE product_id = ?")
            .bind(product_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn items_of(pool: &SqlitePool, order_id: i64) -> Vec<OrderItem> {
        sqlx::query_as("SELECT * FROM order_items WHERE order_id = ?")
            .bind(order_id)
            .fetch_all(pool)
            .await
            .unwrap()
    }

    async fn status_of(pool: &SqlitePool, order_id: i64) -> String {
        sqlx::query_scalar("SELECT status FROM orders WHERE order_id = ?")
            .bind(order_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn item(product_id: impl Into<Value>, quantity: impl Into<Value>, price: impl Into<Value>) -> OrderItemRequest {
        OrderItemRequest {
            product_id: product_id.into(),
            quantity: quantity.into(),
            price: price.into(),
        }
    }

    #[tokio::test]
    async fn order_decrements_stock_and_snapshots_price() {
        let pool = test_pool().await;
        let buyer = seed_buyer(&pool).await;
        let product = seed_product(&pool, "Chicken Breast", 10.0, 10).await;

        let (order_id, skipped) = place_order(
            &pool,
            buyer,
            &[item(product, 2, 10.0)],
            20.0,
            "12 Market St",
        )
        .await
        .unwrap();

        assert!(skipped.is_empty());
        assert_eq!(stock_of(&pool, product).await, 8);

        let items = items_of(&pool, order_id).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[0].price_at_time_of_order, 10.0);
        assert_eq!(status_of(&pool, order_id).await, "pending");
    }

    #[tokio::test]
    async fn snapshotted_price_ignores_later_product_price_change() {
        let pool = test_pool().await;
        let buyer = seed_buyer(&pool).await;
        let product = seed_product(&pool, "Eggs", 3.0, 50).await;

        let (order_id, _) = place_order(&pool, buyer, &[item(product, 5, 3.0)], 15.0, "addr")
            .await
            .unwrap();

        sqlx::query("UPDATE products SET price_per_unit = 99.0 WHERE product_id = ?")
            .bind(product)
            .execute(&pool)
            .await
            .unwrap();

        let items = items_of(&pool, order_id).await;
        assert_eq!(items[0].price_at_time_of_order, 3.0);
    }

    #[tokio::test]
    async fn oversold_item_is_skipped_not_fatal() {
        let pool = test_pool().await;
        let buyer = seed_buyer(&pool).await;
        let scarce = seed_product(&pool, "Honey", 8.0, 1).await;
        let plenty = seed_product(&pool, "Rice", 2.0, 100).await;

        let (order_id, skipped) = place_order(
            &pool,
            buyer,
            &[item(scarce, 2, 8.0), item(plenty, 3, 2.0)],
            22.0,
            "addr",
        )
        .await
        .unwrap();

        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].reason, SkipReason::InsufficientStock);
        assert_eq!(skipped[0].product_id, Some(scarce));

        // The oversold item consumed nothing; the valid one went through.
        assert_eq!(stock_of(&pool, scarce).await, 1);
        assert_eq!(stock_of(&pool, plenty).await, 97);

        let items = items_of(&pool, order_id).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, plenty);
    }

    #[tokio::test]
    async fn all_items_skipped_still_commits_empty_order() {
        let pool = test_pool().await;
        let buyer = seed_buyer(&pool).await;
        let product = seed_product(&pool, "Lemon", 1.0, 1).await;

        let (order_id, skipped) =
            place_order(&pool, buyer, &[item(product, 2, 1.0)], 2.0, "addr")
                .await
                .unwrap();

        assert_eq!(skipped.len(), 1);
        assert!(items_of(&pool, order_id).await.is_empty());
        assert_eq!(status_of(&pool, order_id).await, "pending");
        assert_eq!(stock_of(&pool, product).await, 1);
    }

    #[tokio::test]
    async fn invalid_and_missing_items_are_skipped() {
        let pool = test_pool().await;
        let buyer = seed_buyer(&pool).await;
        let product = seed_product(&pool, "Garlic", 0.5, 20).await;

        let (order_id, skipped) = place_order(
            &pool,
            buyer,
            &[
                item(product, 0, 0.5),                        // non-positive quantity
                item(product, 1, "not-a-price"),              // non-numeric price
                item("ingredient-3", 1, 0.5),                 // non-product pseudo-id
                item(9999, 1, 0.5),                           // no such product
                item(json!(product.to_string()), "2", "0.5"), // numeric strings are fine
            ],
            2.0,
            "addr",
        )
        .await
        .unwrap();

        assert_eq!(skipped.len(), 4);
        assert_eq!(skipped[0].reason, SkipReason::InvalidItem);
        assert_eq!(skipped[1].reason, SkipReason::InvalidItem);
        assert_eq!(skipped[2].reason, SkipReason::InvalidItem);
        assert_eq!(skipped[3].reason, SkipReason::MissingProduct);

        let items = items_of(&pool, order_id).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
        assert_eq!(stock_of(&pool, product).await, 18);
    }

    #[tokio::test]
    async fn total_amount_is_not_cross_checked_against_items() {
        let pool = test_pool().await;
        let buyer = seed_buyer(&pool).await;
        let product = seed_product(&pool, "Flour", 2.0, 10).await;

        // Caller-supplied total disagrees with quantity * price; the order
        // still goes through with the total stored as given.
        let (order_id, skipped) =
            place_order(&pool, buyer, &[item(product, 2, 2.0)], 999.0, "addr")
                .await
                .unwrap();

        assert!(skipped.is_empty());

        let total: f64 = sqlx::query_scalar("SELECT total_amount FROM orders WHERE order_id = ?")
            .bind(order_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(total, 999.0);
    }

    #[tokio::test]
    async fn write_failure_rolls_back_header_and_stock() {
        let pool = test_pool().await;
        let buyer = seed_buyer(&pool).await;
        let product = seed_product(&pool, "Carrots", 1.0, 10).await;

        // Breaking the order_items table makes the item insert fail after
        // the header insert and the stock decrement already ran.
        sqlx::raw_sql("DROP TABLE order_items")
            .execute(&pool)
            .await
            .unwrap();

        let result = place_order(&pool, buyer, &[item(product, 2, 1.0)], 2.0, "addr").await;
        assert!(result.is_err());

        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orders, 0);
        assert_eq!(stock_of(&pool, product).await, 10);
    }

    #[tokio::test]
    async fn cancellation_restores_stock_once() {
        let pool = test_pool().await;
        let buyer = seed_buyer(&pool).await;
        let product = seed_product(&pool, "Potatoes", 1.5, 10).await;

        let (order_id, _) = place_order(&pool, buyer, &[item(product, 2, 1.5)], 3.0, "addr")
            .await
            .unwrap();
        assert_eq!(stock_of(&pool, product).await, 8);

        set_order_status(&pool, order_id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(stock_of(&pool, product).await, 10);
        assert_eq!(status_of(&pool, order_id).await, "cancelled");

        // Cancelling again must not double-restore.
        set_order_status(&pool, order_id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(stock_of(&pool, product).await, 10);
    }

    #[tokio::test]
    async fn non_cancel_transitions_leave_stock_alone() {
        let pool = test_pool().await;
        let buyer = seed_buyer(&pool).await;
        let product = seed_product(&pool, "Onion", 0.8, 10).await;

        let (order_id, _) = place_order(&pool, buyer, &[item(product, 4, 0.8)], 3.2, "addr")
            .await
            .unwrap();
        assert_eq!(stock_of(&pool, product).await, 6);

        set_order_status(&pool, order_id, OrderStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(stock_of(&pool, product).await, 6);
        assert_eq!(status_of(&pool, order_id).await, "confirmed");

        set_order_status(&pool, order_id, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(stock_of(&pool, product).await, 6);
    }

    #[tokio::test]
    async fn status_update_of_missing_order_is_not_found() {
        let pool = test_pool().await;

        let err = set_order_status(&pool, 12345, OrderStatus::Confirmed)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_restores_across_multiple_products() {
        let pool = test_pool().await;
        let buyer = seed_buyer(&pool).await;
        let a = seed_product(&pool, "Soy Sauce", 4.0, 5).await;
        let b = seed_product(&pool, "Ginger", 2.0, 7).await;

        let (order_id, _) = place_order(
            &pool,
            buyer,
            &[item(a, 3, 4.0), item(b, 2, 2.0)],
            16.0,
            "addr",
        )
        .await
        .unwrap();
        assert_eq!(stock_of(&pool, a).await, 2);
        assert_eq!(stock_of(&pool, b).await, 5);

        set_order_status(&pool, order_id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(stock_of(&pool, a).await, 5);
        assert_eq!(stock_of(&pool, b).await, 7);
    }

    #[test]
    fn coercion_accepts_numbers_and_numeric_strings() {
        assert_eq!(coerce_positive_i64(&json!(3)), Some(3));
        assert_eq!(coerce_positive_i64(&json!("3")), Some(3));
        assert_eq!(coerce_positive_i64(&json!(" 3 ")), Some(3));
        assert_eq!(coerce_positive_i64(&json!(0)), None);
        assert_eq!(coerce_positive_i64(&json!(-2)), None);
        assert_eq!(coerce_positive_i64(&json!(2.5)), None);
        assert_eq!(coerce_positive_i64(&json!("ingredient-3")), None);
        assert_eq!(coerce_positive_i64(&Value::Null), None);

        assert_eq!(coerce_f64(&json!(1.25)), Some(1.25));
        assert_eq!(coerce_f64(&json!("1.25")), Some(1.25));
        assert_eq!(coerce_f64(&json!("abc")), None);
    }
}
