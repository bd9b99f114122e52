//! Order service: shopping carts, the checkout saga and order lifecycle.
//!
//! Placing an order touches two independently owned resources, the stock
//! ledger behind the inventory service and the order store. They cannot share
//! a transaction, so [`OrderOrchestrator`] runs checkout as a saga:
//! 1. Read the user's checked cart lines
//! 2. Snapshot prices from the catalog
//! 3. Reserve stock
//! 4. Persist the order and clear the purchased cart lines
//!
//! If step 4 fails the reserved stock is released again.

pub mod cart;
pub mod catalog;
pub mod error;
pub mod inventory_client;
pub mod model;
pub mod order_number;
pub mod saga;
pub mod store;

pub use cart::{CartStore, MAX_CART_QUANTITY};
pub use catalog::{CatalogItem, CatalogLookup, HttpCatalogClient, InMemoryCatalog};
pub use error::{CatalogError, CheckoutError, Compensation, Result, StoreError};
pub use inventory_client::HttpInventoryClient;
pub use model::{
    CartLine, Order, OrderDetail, OrderDraft, OrderLine, OrderStatus, ShippingInfo,
};
pub use saga::{
    CheckoutSettings, CheckoutStep, OrderOrchestrator, PlacedOrder, spawn_expiry_worker,
};
pub use store::{InMemoryOrderStore, OrderStore, PgOrderStore};
