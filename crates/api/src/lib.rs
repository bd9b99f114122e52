//! HTTP services for the shop backend.
//!
//! Two binaries share this crate:
//! - `inventory-srv` exposes the inventory RPC boundary (`/inventory/...`)
//! - `order-srv` serves carts, checkout and order queries
//!
//! Both log through `tracing` and export Prometheus metrics on `/metrics`.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod server;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::inventory::InventoryState;
use routes::orders::OrderState;

/// Router of `inventory-srv`.
pub fn create_inventory_app(service: InventoryState, metrics_handle: PrometheusHandle) -> Router {
    let inventory = Router::new()
        .route("/inventory/reserve", post(routes::inventory::reserve))
        .route("/inventory/release", post(routes::inventory::release))
        .route(
            "/inventory/{product_id}",
            get(routes::inventory::stock_detail).put(routes::inventory::set_stock),
        )
        .with_state(service);

    Router::new()
        .route("/health", get(routes::ops::inventory_health))
        .merge(inventory)
        .merge(metrics_router(metrics_handle))
        .layer(TraceLayer::new_for_http())
}

/// Router of `order-srv`.
///
/// `/orders/{id}` takes the order id; its `status` and `cancel` children take
/// the order number.
pub fn create_order_app(state: Arc<OrderState>, metrics_handle: PrometheusHandle) -> Router {
    let shop = Router::new()
        .route(
            "/shopcarts",
            get(routes::cart::list).post(routes::cart::add),
        )
        .route(
            "/shopcarts/{product_id}",
            patch(routes::cart::update).delete(routes::cart::remove),
        )
        .route(
            "/orders",
            get(routes::orders::list).post(routes::orders::create),
        )
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/status", patch(routes::orders::update_status))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .with_state(state);

    Router::new()
        .route("/health", get(routes::ops::order_health))
        .merge(shop)
        .merge(metrics_router(metrics_handle))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(handle)
}
