//! HTTP API server with observability for the order engine.
//!
//! Provides REST endpoints for carts, checkout, orders and payments, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod sweeper;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use domain::Context;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    let admin = Router::new()
        .route("/orders", get(routes::admin::list_orders))
        .route("/orders/{id}/status", put(routes::admin::transition))
        .route("/products", post(routes::admin::create_product))
        .route("/products/{id}", put(routes::admin::replace_product))
        .route("/products/{id}/stock", post(routes::admin::adjust_stock));

    Router::new()
        .route("/health", get(routes::ops::health))
        .route("/products/{id}", get(routes::admin::get_product))
        .route("/cart", get(routes::cart::get).delete(routes::cart::clear))
        .route("/cart/items", post(routes::cart::add))
        .route(
            "/cart/items/{id}",
            put(routes::cart::update).delete(routes::cart::remove),
        )
        .route("/checkout", post(routes::orders::checkout))
        .route("/orders", get(routes::orders::list))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/status", get(routes::orders::status))
        .route("/orders/{id}/cancel", put(routes::orders::cancel))
        .route("/payments", get(routes::payments::list))
        .route("/payments/callback", post(routes::payments::callback))
        .route("/payments/{id}", get(routes::payments::get))
        .route("/payments/{id}/reference", post(routes::payments::attach_reference))
        .nest("/admin", admin)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state with one service per concern, all sharing `ctx`.
pub fn create_state(ctx: Context) -> Arc<AppState> {
    Arc::new(AppState::new(ctx))
}
