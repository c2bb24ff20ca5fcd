//! SQLite schema and pool setup.
//!
//! SQLite keeps the transactional model the order flow relies on: a write
//! transaction holds the database write lock from its first write until
//! commit, so the per-item check-and-decrement cannot race a concurrent
//! checkout. Tests run against `sqlite::memory:` with the same schema.

use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

const MAX_CONNECTIONS: u32 = 10;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
  user_id INTEGER PRIMARY KEY AUTOINCREMENT,
  username TEXT UNIQUE NOT NULL,
  email TEXT UNIQUE NOT NULL,
  password TEXT NOT NULL,
  phone_number TEXT,
  address TEXT,
  location TEXT,
  user_role TEXT NOT NULL DEFAULT 'customer'
    CHECK (user_role IN ('customer', 'seller', 'admin')),
  profile_picture_url TEXT,
  created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
  updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS products (
  product_id INTEGER PRIMARY KEY AUTOINCREMENT,
  seller_id INTEGER REFERENCES users(user_id),
  product_name TEXT NOT NULL,
  description TEXT,
  price_per_unit REAL NOT NULL,
  unit TEXT,
  available_quantity INTEGER NOT NULL DEFAULT 0
    CHECK (available_quantity >= 0),
  product_image_url TEXT,
  created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
  updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS recipes (
  recipe_id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER REFERENCES users(user_id),
  recipe_name TEXT NOT NULL,
  ingredients TEXT,
  instructions TEXT,
  recipe_image_url TEXT,
  created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
  updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS ingredients (
  ingredient_id INTEGER PRIMARY KEY AUTOINCREMENT,
  ingredient_name TEXT UNIQUE NOT NULL,
  description TEXT,
  unit TEXT NOT NULL DEFAULT 'piece',
  created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS recipe_ingredients (
  recipe_ingredient_id INTEGER PRIMARY KEY AUTOINCREMENT,
  recipe_id INTEGER REFERENCES recipes(recipe_id) ON DELETE CASCADE,
  ingredient_id INTEGER REFERENCES ingredients(ingredient_id),
  quantity REAL NOT NULL,
  unit TEXT
);

CREATE TABLE IF NOT EXISTS orders (
  order_id INTEGER PRIMARY KEY AUTOINCREMENT,
  buyer_id INTEGER REFERENCES users(user_id),
  order_date TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
  total_amount REAL NOT NULL,
  delivery_address TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'pending'
    CHECK (status IN ('pending', 'confirmed', 'shipped', 'delivered', 'cancelled'))
);

CREATE TABLE IF NOT EXISTS order_items (
  order_item_id INTEGER PRIMARY KEY AUTOINCREMENT,
  order_id INTEGER REFERENCES orders(order_id),
  product_id INTEGER REFERENCES products(product_id),
  quantity INTEGER NOT NULL,
  price_at_time_of_order REAL NOT NULL
);

INSERT OR IGNORE INTO ingredients (ingredient_name, description, unit) VALUES
('Chicken Breast', 'Fresh chicken breast meat', 'kg'),
('Chicken Thighs', 'Fresh chicken thigh meat', 'kg'),
('Chicken Wings', 'Fresh chicken wings', 'kg'),
('Salt', 'Table salt for seasoning', 'g'),
('Black Pepper', 'Ground black pepper', 'g'),
('Garlic', 'Fresh garlic cloves', 'piece'),
('Onion', 'Fresh onions', 'piece'),
('Ginger', 'Fresh ginger root', 'g'),
('Cooking Oil', 'Vegetable cooking oil', 'ml'),
('Flour', 'All-purpose flour', 'g'),
('Eggs', 'Fresh chicken eggs', 'piece'),
('Breadcrumbs', 'Bread crumbs for coating', 'g'),
('Soy Sauce', 'Dark soy sauce', 'ml'),
('Honey', 'Natural honey', 'ml'),
('Lemon', 'Fresh lemons', 'piece'),
('Tomatoes', 'Fresh tomatoes', 'piece'),
('Bell Peppers', 'Fresh bell peppers', 'piece'),
('Carrots', 'Fresh carrots', 'piece'),
('Potatoes', 'Fresh potatoes', 'piece'),
('Rice', 'White rice', 'g');
";

pub async fn init_db(database_url: &str) -> SqlitePool {
    let options = SqliteConnectOptions::from_str(database_url)
        .expect("Database misconfigured!")
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .expect("Database misconfigured!");

    apply_schema(&pool).await.expect("Schema setup failed!");
    info!("Database ready at {database_url}");

    pool
}

/// Creates all tables and seeds the common ingredient list. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
