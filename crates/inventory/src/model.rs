//! Stock records and reservation lines.

use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};

/// The authoritative stock count for one product.
///
/// `available_units` is never negative. `version` increases by one on every
/// write, so two reads with the same version saw the same count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub product_id: ProductId,
    pub available_units: i32,
    pub version: i64,
}

impl StockRecord {
    /// A freshly stocked product.
    pub fn new(product_id: ProductId, available_units: i32) -> Self {
        Self {
            product_id,
            available_units,
            version: 1,
        }
    }
}

/// One `(product, quantity)` pair of a reserve or release request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

impl StockLine {
    pub fn new(product_id: ProductId, quantity: i32) -> Self {
        Self { product_id, quantity }
    }
}

/// Rejects any line with a non-positive quantity.
///
/// Runs before a single lock is taken, so a bad request has no side effects.
pub fn validate_lines(items: &[StockLine]) -> Result<()> {
    match items.iter().find(|line| line.quantity <= 0) {
        Some(line) => Err(InventoryError::InvalidQuantity {
            product_id: line.product_id,
            quantity: line.quantity,
        }),
        None => Ok(()),
    }
}
