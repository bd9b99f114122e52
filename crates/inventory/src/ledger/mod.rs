//! The stock ledger: authoritative available-unit counts per product.

mod memory;
mod postgres;

pub use memory::InMemoryStockLedger;
pub use postgres::PgStockLedger;

use async_trait::async_trait;
use common::ProductId;

use crate::error::Result;
use crate::model::StockRecord;

/// Storage for [`StockRecord`]s.
///
/// `set` is a plain upsert used for stocking and restocking. Decrements and
/// increments go through a [`LedgerTransaction`] so a whole reservation batch
/// commits or rolls back together.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Transaction handle returned by [`StockLedger::begin`].
    type Tx: LedgerTransaction;

    /// Loads the record for a product.
    ///
    /// Fails with `RecordNotFound` when the product was never stocked.
    async fn get(&self, product_id: ProductId) -> Result<StockRecord>;

    /// Creates or overwrites the available units for a product.
    async fn set(&self, product_id: ProductId, units: i32) -> Result<StockRecord>;

    /// Opens a transaction for staged adjustments.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// A unit of staged ledger writes.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Adds `delta` to the product's available units.
    ///
    /// The check and the write are one atomic step: if the result would be
    /// negative nothing is written and `InsufficientStock` is returned.
    /// Callers hold the product lock around this call.
    async fn adjust(&mut self, product_id: ProductId, delta: i32) -> Result<StockRecord>;

    /// Makes every staged adjustment durable and visible to other callers.
    ///
    /// Fails as a whole with `InsufficientStock` if a staged decrement no
    /// longer fits the committed units.
    async fn commit(self) -> Result<()>;

    /// Discards every staged adjustment.
    async fn rollback(self) -> Result<()>;
}
