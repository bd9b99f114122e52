//! Service configuration loaded from environment variables.

use std::time::Duration;

use inventory::LockSettings;
use orders::CheckoutSettings;

/// Default port of `inventory-srv`.
pub const INVENTORY_PORT: u16 = 50059;
/// Default port of `order-srv`.
pub const ORDER_PORT: u16 = 3000;

/// Configuration shared by both binaries.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default: `0.0.0.0` and the service's port)
/// - `RUST_LOG`: tracing filter directive (default: `info`)
/// - `DATABASE_URL`: Postgres; in-memory stores when unset
/// - `REDIS_URL`: lease provider; in-process leases when unset
/// - `INVENTORY_URL`: remote inventory for `order-srv`; in-process when unset
/// - `CATALOG_URL`: catalog service; an empty in-memory catalog when unset
/// - `LOCK_LEASE_MS`, `LOCK_WAIT_MS`, `LOCK_RETRY_MS`
/// - `PERSIST_TIMEOUT_MS`, `ORDER_TTL_SECS`, `EXPIRY_SWEEP_SECS`
/// - `RPC_TIMEOUT_MS`: timeout of calls to inventory and catalog
///
/// Unparseable numbers fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub inventory_url: Option<String>,
    pub catalog_url: Option<String>,
    pub lock: LockSettings,
    pub checkout: CheckoutSettings,
    pub rpc_timeout: Duration,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env(default_port: u16) -> Self {
        Self::from_lookup(default_port, |key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults.
    pub fn from_lookup(default_port: u16, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::with_port(default_port);
        let text = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let number = |key: &str| text(key).and_then(|value| value.trim().parse::<u64>().ok());
        let millis = |key: &str, default: Duration| {
            number(key).map(Duration::from_millis).unwrap_or(default)
        };
        let secs = |key: &str, default: Duration| {
            number(key).map(Duration::from_secs).unwrap_or(default)
        };

        Self {
            host: text("HOST").unwrap_or(defaults.host),
            port: text("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            log_level: text("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: text("DATABASE_URL"),
            redis_url: text("REDIS_URL"),
            inventory_url: text("INVENTORY_URL"),
            catalog_url: text("CATALOG_URL"),
            lock: LockSettings {
                lease: millis("LOCK_LEASE_MS", defaults.lock.lease),
                wait: millis("LOCK_WAIT_MS", defaults.lock.wait),
                retry_delay: millis("LOCK_RETRY_MS", defaults.lock.retry_delay),
            },
            checkout: CheckoutSettings {
                persist_timeout: millis("PERSIST_TIMEOUT_MS", defaults.checkout.persist_timeout),
                order_ttl: secs("ORDER_TTL_SECS", defaults.checkout.order_ttl),
                sweep_interval: secs("EXPIRY_SWEEP_SECS", defaults.checkout.sweep_interval),
                ..defaults.checkout
            },
            rpc_timeout: millis("RPC_TIMEOUT_MS", defaults.rpc_timeout),
        }
    }

    /// Defaults with the given port.
    pub fn with_port(port: u16) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port,
            log_level: "info".to_string(),
            database_url: None,
            redis_url: None,
            inventory_url: None,
            catalog_url: None,
            lock: LockSettings::default(),
            checkout: CheckoutSettings::default(),
            rpc_timeout: Duration::from_secs(3),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_port(ORDER_PORT)
    }
}
