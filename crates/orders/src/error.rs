//! Order service error types.

use std::time::Duration;

use common::ProductId;
use inventory::{InventoryError, StockLine};
use thiserror::Error;

use crate::saga::CheckoutStep;

/// Errors from the catalog lookup.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog answered without one of the requested products.
    #[error("Product {0} is not available in the catalog")]
    ProductUnavailable(ProductId),

    /// The catalog could not be reached or answered with an error.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the cart and order stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A cart quantity was not positive or exceeded the per-line cap.
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },

    /// No cart line exists for the product.
    #[error("Cart line for product {0} not found")]
    CartLineNotFound(ProductId),

    /// No order matched the lookup, including orders owned by someone else.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Another order already uses the generated order number.
    #[error("Order number {0} already exists")]
    DuplicateOrderNumber(String),

    /// The purchased cart lines changed while the order was being placed.
    #[error("Cart changed during checkout: expected {expected} lines, removed {removed}")]
    CartChanged { expected: usize, removed: usize },

    /// Persisting did not finish within the configured bound.
    #[error("Timed out after {0:?} persisting order")]
    Timeout(Duration),

    /// The task persisting the order stopped before reporting a result.
    #[error("Persistence task aborted: {0}")]
    Aborted(String),

    /// A stored value could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn order_not_found(id: impl std::fmt::Display) -> Self {
        StoreError::OrderNotFound(id.to_string())
    }
}

/// What happened to reserved stock after a checkout failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    /// The failure happened before anything was reserved.
    NotRequired,
    /// The reserved stock was released again.
    Released,
    /// Releasing the reserved stock failed; stock needs manual reconciliation.
    Failed,
}

impl Compensation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compensation::NotRequired => "not_required",
            Compensation::Released => "released",
            Compensation::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Compensation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors returned by the checkout saga and order lifecycle operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The user has no checked cart lines.
    #[error("Nothing to check out")]
    NothingToCheckout,

    /// Shipping details were missing or malformed.
    #[error("Invalid order request: {0}")]
    InvalidRequest(String),

    /// A checked product is not in the catalog.
    #[error(transparent)]
    ProductUnavailable(CatalogError),

    /// A dependency could not be reached. Nothing was reserved.
    #[error("Dependency unavailable during {step}: {reason}")]
    DependencyUnavailable { step: CheckoutStep, reason: String },

    /// The inventory refused the reservation. Nothing was reserved.
    #[error(transparent)]
    Inventory(InventoryError),

    /// Persisting the order failed after stock had been reserved.
    ///
    /// `compensation` tells whether the stock was released again.
    #[error("Failed to persist order (compensation: {compensation}): {source}")]
    Persistence {
        #[source]
        source: StoreError,
        compensation: Compensation,
        items: Vec<StockLine>,
    },

    /// An order was closed but its stock could not be returned.
    #[error("Order {order_number} closed but its stock was not released: {source}")]
    StockNotReturned {
        order_number: String,
        #[source]
        source: InventoryError,
        items: Vec<StockLine>,
    },

    /// The order was not found for this user.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// A store operation outside the saga failed.
    #[error(transparent)]
    Store(StoreError),
}

impl CheckoutError {
    /// Reports the compensation outcome carried by this error.
    pub fn compensation(&self) -> Compensation {
        match self {
            CheckoutError::Persistence { compensation, .. } => *compensation,
            CheckoutError::StockNotReturned { .. } => Compensation::Failed,
            _ => Compensation::NotRequired,
        }
    }

    /// Returns true when the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::DependencyUnavailable { .. } => true,
            CheckoutError::Inventory(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Short label used as the `reason` of the failure metric.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::NothingToCheckout => "nothing_to_checkout",
            CheckoutError::InvalidRequest(_) => "invalid_request",
            CheckoutError::ProductUnavailable(_) => "product_unavailable",
            CheckoutError::DependencyUnavailable { .. } => "dependency_unavailable",
            CheckoutError::Inventory(InventoryError::InsufficientStock { .. }) => {
                "insufficient_stock"
            }
            CheckoutError::Inventory(InventoryError::LockUnavailable(_)) => "lock_unavailable",
            CheckoutError::Inventory(_) => "inventory",
            CheckoutError::Persistence { .. } => "persistence",
            CheckoutError::StockNotReturned { .. } => "stock_not_returned",
            CheckoutError::OrderNotFound(_) => "order_not_found",
            CheckoutError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(id) => CheckoutError::OrderNotFound(id),
            other => CheckoutError::Store(other),
        }
    }
}

/// Result type for checkout operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;
