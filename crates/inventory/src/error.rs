//! Inventory error types.

use std::time::Duration;

use common::ProductId;
use thiserror::Error;

/// Failures of the mutual-exclusion provider.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lease is held elsewhere and the bounded wait ran out.
    #[error("Timed out after {waited:?} waiting for lock '{key}'")]
    Timeout { key: String, waited: Duration },

    /// The provider could not be reached or refused the request.
    #[error("Lock provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the stock ledger and the inventory service.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// A reservation line asked for zero or fewer units.
    #[error("Invalid quantity {quantity} for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },

    /// A stock level would be negative or out of range.
    #[error("Invalid stock level {units} for product {product_id}")]
    InvalidStockLevel { product_id: ProductId, units: i64 },

    /// No stock record exists for the product; there is nothing to sell.
    #[error("No stock record for product {0}")]
    RecordNotFound(ProductId),

    /// The product has fewer available units than requested.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    /// The per-product lock could not be obtained.
    #[error("Lock unavailable: {0}")]
    LockUnavailable(#[from] LockError),

    /// The inventory service could not be reached.
    #[error("Inventory service unavailable: {0}")]
    Unavailable(String),

    /// The remote inventory service reported an internal failure.
    #[error("Inventory service internal error: {0}")]
    Internal(String),

    /// A database error occurred.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl InventoryError {
    /// Returns true when the caller may retry the same request later.
    ///
    /// Only dependency outages qualify. Input and stock errors will fail the
    /// same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InventoryError::LockUnavailable(_) | InventoryError::Unavailable(_)
        )
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
