//! Builds service state from [`Config`].

use std::sync::Arc;
use std::time::Duration;

use inventory::{
    InMemoryLockProvider, InMemoryStockLedger, InventoryService, LeasedProductLock,
    LedgerInventoryService, LockProvider, PgStockLedger, RedisLockProvider, StockLedger,
};
use orders::{
    CartStore, CatalogLookup, CheckoutSettings, HttpCatalogClient, HttpInventoryClient,
    InMemoryCatalog, InMemoryOrderStore, OrderOrchestrator, OrderStore, PgOrderStore,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Config;
use crate::error::StartupError;
use crate::routes::orders::OrderState;

/// The inventory service selected by `DATABASE_URL` and `REDIS_URL`.
pub async fn build_inventory_service(
    config: &Config,
) -> Result<Arc<dyn InventoryService>, StartupError> {
    let lease = config.lock.lease;
    let service = match (&config.database_url, &config.redis_url) {
        (Some(db), Some(redis)) => leased(
            pg_ledger(db).await?,
            RedisLockProvider::connect(redis, config.lock).await?,
            lease,
        ),
        (Some(db), None) => leased(
            pg_ledger(db).await?,
            InMemoryLockProvider::new(config.lock),
            lease,
        ),
        (None, Some(redis)) => leased(
            InMemoryStockLedger::new(),
            RedisLockProvider::connect(redis, config.lock).await?,
            lease,
        ),
        (None, None) => leased(
            InMemoryStockLedger::new(),
            InMemoryLockProvider::new(config.lock),
            lease,
        ),
    };
    tracing::info!(
        ledger = backend(config.database_url.is_some(), "postgres"),
        locks = backend(config.redis_url.is_some(), "redis"),
        "inventory service ready"
    );
    Ok(service)
}

/// The order service state selected by `DATABASE_URL`, `INVENTORY_URL` and
/// `CATALOG_URL`.
pub async fn build_order_state(config: &Config) -> Result<OrderState, StartupError> {
    let (carts, orders): (Arc<dyn CartStore>, Arc<dyn OrderStore>) = match &config.database_url
    {
        Some(url) => {
            let store = PgOrderStore::new(connect(url).await?);
            store.run_migrations().await?;
            let store = Arc::new(store);
            let carts: Arc<dyn CartStore> = store.clone();
            let orders: Arc<dyn OrderStore> = store;
            (carts, orders)
        }
        None => {
            let store = Arc::new(InMemoryOrderStore::new());
            let carts: Arc<dyn CartStore> = store.clone();
            let orders: Arc<dyn OrderStore> = store;
            (carts, orders)
        }
    };

    let inventory: Arc<dyn InventoryService> = match &config.inventory_url {
        Some(url) => Arc::new(HttpInventoryClient::new(url.as_str(), config.rpc_timeout)?),
        None => build_inventory_service(config).await?,
    };

    let catalog: Arc<dyn CatalogLookup> = match &config.catalog_url {
        Some(url) => Arc::new(HttpCatalogClient::new(url.as_str(), config.rpc_timeout)?),
        None => {
            tracing::warn!("CATALOG_URL not set, using an empty in-memory catalog");
            Arc::new(InMemoryCatalog::new())
        }
    };

    tracing::info!(
        store = backend(config.database_url.is_some(), "postgres"),
        inventory = config.inventory_url.as_deref().unwrap_or("in-process"),
        "order service ready"
    );
    Ok(order_state(
        carts,
        orders,
        catalog,
        inventory,
        config.checkout.clone(),
    ))
}

/// Wires an [`OrderState`] from its parts.
pub fn order_state(
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn CatalogLookup>,
    inventory: Arc<dyn InventoryService>,
    settings: CheckoutSettings,
) -> OrderState {
    let orchestrator = OrderOrchestrator::new(carts.clone(), catalog, inventory, orders, settings);
    OrderState {
        orchestrator: Arc::new(orchestrator),
        carts,
    }
}

fn backend(configured: bool, name: &'static str) -> &'static str {
    if configured { name } else { "memory" }
}

fn leased<S, P>(ledger: S, provider: P, lease: Duration) -> Arc<dyn InventoryService>
where
    S: StockLedger + 'static,
    P: LockProvider + 'static,
{
    Arc::new(LedgerInventoryService::new(
        ledger,
        LeasedProductLock::new(provider, lease),
    ))
}

async fn connect(url: &str) -> Result<PgPool, StartupError> {
    Ok(PgPoolOptions::new().max_connections(10).connect(url).await?)
}

async fn pg_ledger(url: &str) -> Result<PgStockLedger, StartupError> {
    let ledger = PgStockLedger::new(connect(url).await?);
    ledger.run_migrations().await?;
    Ok(ledger)
}
