//! Order service entry point.

use std::sync::Arc;

use api::config::{Config, ORDER_PORT};
use api::server::{init_tracing, install_metrics, shutdown_signal};

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env(ORDER_PORT);
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = install_metrics().expect("failed to install Prometheus recorder");

    // 3. Stores, inventory and catalog clients
    let state = api::bootstrap::build_order_state(&config)
        .await
        .expect("failed to initialise order service");
    let state = Arc::new(state);

    // 4. Close unpaid orders in the background
    let expiry = orders::spawn_expiry_worker(state.orchestrator.clone());

    // 5. Serve
    let app = api::create_order_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting order service");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    expiry.abort();
    tracing::info!("order service shut down gracefully");
}
