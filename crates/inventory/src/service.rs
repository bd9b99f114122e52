//! The inventory service: reserve and release over the stock ledger.

use async_trait::async_trait;
use common::ProductId;

use crate::error::{InventoryError, Result};
use crate::ledger::{LedgerTransaction, StockLedger};
use crate::lock::ProductLock;
use crate::model::{StockLine, StockRecord, validate_lines};

/// Operations exposed by the inventory service.
///
/// This is the boundary the order orchestrator calls, either in process or
/// through [`crate::rpc`].
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Stocks or restocks a product with an absolute unit count.
    async fn set_stock(&self, product_id: ProductId, units: i32) -> Result<StockRecord>;

    /// Returns the current stock record of a product.
    async fn stock_detail(&self, product_id: ProductId) -> Result<StockRecord>;

    /// Decrements every line's product by its quantity, or none of them.
    async fn reserve(&self, items: &[StockLine]) -> Result<()>;

    /// Increments every line's product by its quantity, or none of them.
    ///
    /// The compensation for [`InventoryService::reserve`].
    async fn release(&self, items: &[StockLine]) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Reserve,
    Release,
}

impl Direction {
    fn delta(self, quantity: i32) -> i32 {
        match self {
            Direction::Reserve => -quantity,
            Direction::Release => quantity,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Direction::Reserve => "reserve",
            Direction::Release => "release",
        }
    }
}

/// [`InventoryService`] over a [`StockLedger`], serialized per product by a
/// [`ProductLock`].
///
/// A batch runs in one ledger transaction. Each line takes its product's lock
/// only while its adjustment is staged, so a batch never holds two locks at
/// once and batches touching disjoint products never wait on each other. The
/// first failing line rolls the whole transaction back.
#[derive(Debug, Clone)]
pub struct LedgerInventoryService<S, L> {
    ledger: S,
    lock: L,
}

impl<S, L> LedgerInventoryService<S, L>
where
    S: StockLedger,
    L: ProductLock,
{
    pub fn new(ledger: S, lock: L) -> Self {
        Self { ledger, lock }
    }

    /// Returns the underlying ledger.
    pub fn ledger(&self) -> &S {
        &self.ledger
    }

    async fn apply(&self, items: &[StockLine], direction: Direction) -> Result<()> {
        validate_lines(items)?;
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.ledger.begin().await?;
        for line in items {
            let delta = direction.delta(line.quantity);
            let staged = self
                .lock
                .with_product_lock(line.product_id, || tx.adjust(line.product_id, delta))
                .await;

            if let Err(e) = staged {
                tracing::debug!(
                    product_id = %line.product_id,
                    operation = direction.as_str(),
                    error = %e,
                    "rolling back stock batch"
                );
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(error = %rollback, "failed to roll back stock batch");
                }
                return Err(e);
            }
        }
        tx.commit().await
    }
}

#[async_trait]
impl<S, L> InventoryService for LedgerInventoryService<S, L>
where
    S: StockLedger,
    L: ProductLock,
{
    #[tracing::instrument(skip(self))]
    async fn set_stock(&self, product_id: ProductId, units: i32) -> Result<StockRecord> {
        let record = self.ledger.set(product_id, units).await?;
        tracing::info!(available = record.available_units, "Stock level set");
        Ok(record)
    }

    async fn stock_detail(&self, product_id: ProductId) -> Result<StockRecord> {
        self.ledger.get(product_id).await
    }

    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    async fn reserve(&self, items: &[StockLine]) -> Result<()> {
        match self.apply(items, Direction::Reserve).await {
            Ok(()) => {
                metrics::counter!("inventory_reserve_total").increment(1);
                tracing::info!("Stock reserved");
                Ok(())
            }
            Err(e) => {
                let reason = match &e {
                    InventoryError::InsufficientStock { .. } => "insufficient_stock",
                    InventoryError::RecordNotFound(_) => "record_not_found",
                    InventoryError::InvalidQuantity { .. } => "invalid_quantity",
                    InventoryError::LockUnavailable(_) => "lock_unavailable",
                    _ => "internal",
                };
                metrics::counter!("inventory_reserve_rejected_total", "reason" => reason)
                    .increment(1);
                tracing::warn!(error = %e, "Reservation rejected");
                Err(e)
            }
        }
    }

    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    async fn release(&self, items: &[StockLine]) -> Result<()> {
        self.apply(items, Direction::Release).await?;
        metrics::counter!("inventory_release_total").increment(1);
        tracing::info!("Stock released");
        Ok(())
    }
}
