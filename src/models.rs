use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Seller,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub location: Option<String>,
    pub user_role: Role,
    pub profile_picture_url: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Product {
    pub product_id: i64,
    pub seller_id: Option<i64>,
    pub product_name: String,
    pub description: Option<String>,
    pub price_per_unit: f64,
    pub unit: Option<String>,
    pub available_quantity: i64,
    pub product_image_url: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Recipe {
    pub recipe_id: i64,
    pub user_id: Option<i64>,
    pub recipe_name: String,
    pub ingredients: Option<String>,
    pub instructions: Option<String>,
    pub recipe_image_url: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Ingredient {
    pub ingredient_id: i64,
    pub ingredient_name: String,
    pub description: Option<String>,
    pub unit: String,
    pub created_at: NaiveDateTime,
}

/// Ingredient as used by one recipe, with the junction row's quantity.
#[derive(Debug, Serialize, FromRow)]
pub struct RecipeIngredient {
    pub ingredient_id: i64,
    pub ingredient_name: String,
    pub description: Option<String>,
    pub unit: String,
    pub quantity: f64,
    pub recipe_unit: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Order {
    pub order_id: i64,
    pub buyer_id: i64,
    pub order_date: NaiveDateTime,
    pub total_amount: f64,
    pub delivery_address: String,
    pub status: OrderStatus,
}

/// Order joined with the buyer's username, for the admin and seller lists.
#[derive(Debug, Serialize, FromRow)]
pub struct OrderWithBuyer {
    pub order_id: i64,
    pub buyer_id: i64,
    pub buyer_name: String,
    pub order_date: NaiveDateTime,
    pub total_amount: f64,
    pub delivery_address: String,
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, FromRow)]
pub struct OrderItem {
    pub order_item_id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub price_at_time_of_order: f64,
}

/// Order item joined with its product's name, for order detail views.
#[derive(Debug, Serialize, FromRow)]
pub struct OrderItemWithProduct {
    pub order_item_id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub price_at_time_of_order: f64,
}
