//! Inventory service: the stock ledger and its reservation protocol.
//!
//! Stock is the one piece of state shared by every order placement. This
//! crate owns it:
//! - [`StockLedger`] holds the authoritative unit count per product
//! - [`LockProvider`] grants named, time-bounded leases across processes
//! - [`LedgerInventoryService`] implements `reserve` (all-or-nothing bulk
//!   decrement) and `release` (its compensation) on top of both
//!
//! The [`rpc`] module fixes the JSON shapes used when the service is called
//! over the network.

pub mod error;
pub mod ledger;
pub mod lock;
pub mod model;
pub mod rpc;
pub mod service;

pub use common::ProductId;
pub use error::{InventoryError, LockError, Result};
pub use ledger::{InMemoryStockLedger, LedgerTransaction, PgStockLedger, StockLedger};
pub use lock::{
    InMemoryLockProvider, Lease, LeasedProductLock, LockProvider, LockSettings, ProductLock,
    RedisLockProvider, product_key,
};
pub use model::{StockLine, StockRecord};
pub use service::{InventoryService, LedgerInventoryService};
