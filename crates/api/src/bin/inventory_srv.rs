//! Inventory service entry point.

use api::config::{Config, INVENTORY_PORT};
use api::server::{init_tracing, install_metrics, shutdown_signal};

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env(INVENTORY_PORT);
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = install_metrics().expect("failed to install Prometheus recorder");

    // 3. Ledger and lock provider
    let service = api::bootstrap::build_inventory_service(&config)
        .await
        .expect("failed to initialise inventory service");

    // 4. Serve
    let app = api::create_inventory_app(service, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting inventory service");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("inventory service shut down gracefully");
}
