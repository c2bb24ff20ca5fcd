//! Multi-vendor food marketplace REST API.
//!
//! Buyers browse products and recipes, place orders against live stock;
//! sellers manage their catalog; admins manage orders and ingredients.
//! Order placement and cancellation are the interesting parts: both run as
//! single SQLite transactions that keep the product stock counters
//! consistent (see [`routes::orders`]).

use std::{sync::Arc, time::Duration};

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, post, put},
    Router,
};

use signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod routes;
pub mod state;

use routes::{ingredients, orders, products, recipes, users};
use state::State;

pub fn router(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(|| async { "MDF Market API is running" }))
        .route("/api/users/register", post(users::register))
        .route("/api/users/login", post(users::login))
        .route(
            "/api/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route(
            "/api/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/api/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route(
            "/api/recipes",
            get(recipes::list_recipes).post(recipes::create_recipe),
        )
        .route("/api/recipes/:id", axum::routing::delete(recipes::delete_recipe))
        .route(
            "/api/recipes/:id/ingredients",
            get(ingredients::list_recipe_ingredients),
        )
        .route(
            "/api/ingredients",
            get(ingredients::list_ingredients).post(ingredients::create_ingredient),
        )
        .route(
            "/api/ingredients/:id",
            put(ingredients::update_ingredient).delete(ingredients::delete_ingredient),
        )
        .route(
            "/api/orders",
            post(orders::create_order).get(orders::list_my_orders),
        )
        .route("/api/orders/all", get(orders::list_all_orders))
        .route("/api/orders/seller", get(orders::list_seller_orders))
        .route("/api/orders/:id/status", put(orders::update_order_status))
        .route("/api/orders/:id/items", get(orders::list_order_items))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::new().await;

    info!("Starting server...");
    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
