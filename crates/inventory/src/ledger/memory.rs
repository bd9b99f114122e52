use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::ProductId;

use super::{LedgerTransaction, StockLedger};
use crate::error::{InventoryError, Result};
use crate::model::StockRecord;

type Records = Arc<Mutex<HashMap<ProductId, StockRecord>>>;

fn guard(records: &Records) -> MutexGuard<'_, HashMap<ProductId, StockRecord>> {
    records.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory stock ledger for tests and single-process deployments.
///
/// A transaction stages its deltas privately and applies them to the shared
/// table only on commit, so other callers never see a batch half done.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockLedger {
    records: Records,
}

impl InMemoryStockLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the available units for a product, if stocked.
    pub fn available(&self, product_id: ProductId) -> Option<i32> {
        guard(&self.records)
            .get(&product_id)
            .map(|record| record.available_units)
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    type Tx = InMemoryLedgerTx;

    async fn get(&self, product_id: ProductId) -> Result<StockRecord> {
        guard(&self.records)
            .get(&product_id)
            .copied()
            .ok_or(InventoryError::RecordNotFound(product_id))
    }

    async fn set(&self, product_id: ProductId, units: i32) -> Result<StockRecord> {
        if units < 0 {
            return Err(InventoryError::InvalidStockLevel {
                product_id,
                units: i64::from(units),
            });
        }

        let mut records = guard(&self.records);
        let record = records
            .entry(product_id)
            .and_modify(|record| {
                record.available_units = units;
                record.version += 1;
            })
            .or_insert_with(|| StockRecord::new(product_id, units));
        Ok(*record)
    }

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(InMemoryLedgerTx {
            records: self.records.clone(),
            staged: Vec::new(),
        })
    }
}

/// Transaction over an [`InMemoryStockLedger`].
///
/// Commit re-checks every staged product against the committed units, so a
/// batch that lost a race with another commit fails as a whole.
#[derive(Debug)]
pub struct InMemoryLedgerTx {
    records: Records,
    /// Net delta per product, in staging order.
    staged: Vec<(ProductId, i32)>,
}

impl InMemoryLedgerTx {
    fn staged_delta(&self, product_id: ProductId) -> i64 {
        self.staged
            .iter()
            .find(|(id, _)| *id == product_id)
            .map_or(0, |(_, delta)| i64::from(*delta))
    }

    fn stage(&mut self, product_id: ProductId, net: i32) {
        match self.staged.iter_mut().find(|(id, _)| *id == product_id) {
            Some(entry) => entry.1 = net,
            None => self.staged.push((product_id, net)),
        }
    }
}

/// `record`'s units plus `delta`, refused when below zero or out of range.
fn checked_units(record: &StockRecord, delta: i32) -> Result<i32> {
    let product_id = record.product_id;
    let updated = i64::from(record.available_units) + i64::from(delta);
    if updated < 0 {
        return Err(InventoryError::InsufficientStock {
            product_id,
            requested: delta.saturating_neg(),
            available: record.available_units,
        });
    }
    i32::try_from(updated).map_err(|_| InventoryError::InvalidStockLevel {
        product_id,
        units: updated,
    })
}

#[async_trait]
impl LedgerTransaction for InMemoryLedgerTx {
    async fn adjust(&mut self, product_id: ProductId, delta: i32) -> Result<StockRecord> {
        let committed = guard(&self.records)
            .get(&product_id)
            .copied()
            .ok_or(InventoryError::RecordNotFound(product_id))?;

        // What this transaction sees: committed units plus its own staged delta.
        let staged = self.staged_delta(product_id);
        let visible = StockRecord {
            available_units: i32::try_from(i64::from(committed.available_units) + staged)
                .unwrap_or(committed.available_units),
            ..committed
        };
        let units = checked_units(&visible, delta)?;

        let net = staged + i64::from(delta);
        let net = i32::try_from(net).map_err(|_| InventoryError::InvalidStockLevel {
            product_id,
            units: net,
        })?;
        self.stage(product_id, net);

        Ok(StockRecord {
            available_units: units,
            version: committed.version + 1,
            ..committed
        })
    }

    async fn commit(self) -> Result<()> {
        let mut records = guard(&self.records);

        let mut updates = Vec::with_capacity(self.staged.len());
        for &(product_id, net) in &self.staged {
            let record = records
                .get(&product_id)
                .ok_or(InventoryError::RecordNotFound(product_id))?;
            updates.push((product_id, checked_units(record, net)?));
        }

        for (product_id, units) in updates {
            if let Some(record) = records.get_mut(&product_id) {
                record.available_units = units;
                record.version += 1;
            }
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDGET: ProductId = ProductId::new(1);

    #[tokio::test]
    async fn test_set_creates_then_overwrites() {
        let ledger = InMemoryStockLedger::new();

        let created = ledger.set(WIDGET, 10).await.unwrap();
        assert_eq!(created.available_units, 10);
        assert_eq!(created.version, 1);

        let restocked = ledger.set(WIDGET, 4).await.unwrap();
        assert_eq!(restocked.available_units, 4);
        assert_eq!(restocked.version, 2);
    }

    #[tokio::test]
    async fn test_set_rejects_negative_units() {
        let ledger = InMemoryStockLedger::new();
        let result = ledger.set(WIDGET, -1).await;
        assert!(matches!(result, Err(InventoryError::InvalidStockLevel { .. })));
        assert!(ledger.available(WIDGET).is_none());
    }

    #[tokio::test]
    async fn test_get_missing_record() {
        let ledger = InMemoryStockLedger::new();
        let result = ledger.get(WIDGET).await;
        assert!(matches!(result, Err(InventoryError::RecordNotFound(id)) if id == WIDGET));
    }

    #[tokio::test]
    async fn test_adjust_refuses_to_go_negative() {
        let ledger = InMemoryStockLedger::new();
        ledger.set(WIDGET, 2).await.unwrap();

        let mut tx = ledger.begin().await.unwrap();
        let result = tx.adjust(WIDGET, -3).await;
        assert!(matches!(
            result,
            Err(InventoryError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            })
        ));
        tx.commit().await.unwrap();

        assert_eq!(ledger.available(WIDGET), Some(2));
    }

    #[tokio::test]
    async fn test_commit_keeps_adjustments() {
        let ledger = InMemoryStockLedger::new();
        ledger.set(WIDGET, 5).await.unwrap();

        let mut tx = ledger.begin().await.unwrap();
        let record = tx.adjust(WIDGET, -3).await.unwrap();
        assert_eq!(record.available_units, 2);
        tx.commit().await.unwrap();

        let record = ledger.get(WIDGET).await.unwrap();
        assert_eq!(record.available_units, 2);
        assert_eq!(record.version, 2);
    }

    #[tokio::test]
    async fn test_rollback_restores_units() {
        let ledger = InMemoryStockLedger::new();
        ledger.set(WIDGET, 5).await.unwrap();
        ledger.set(ProductId::new(2), 1).await.unwrap();

        let mut tx = ledger.begin().await.unwrap();
        tx.adjust(WIDGET, -3).await.unwrap();
        tx.adjust(ProductId::new(2), -1).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(ledger.available(WIDGET), Some(5));
        assert_eq!(ledger.available(ProductId::new(2)), Some(1));
    }

    #[tokio::test]
    async fn test_drop_without_commit_rolls_back() {
        let ledger = InMemoryStockLedger::new();
        ledger.set(WIDGET, 5).await.unwrap();

        {
            let mut tx = ledger.begin().await.unwrap();
            tx.adjust(WIDGET, -5).await.unwrap();
        }

        assert_eq!(ledger.available(WIDGET), Some(5));
    }

    #[tokio::test]
    async fn test_staged_adjustments_are_invisible_until_commit() {
        let ledger = InMemoryStockLedger::new();
        ledger.set(WIDGET, 5).await.unwrap();

        let mut tx = ledger.begin().await.unwrap();
        tx.adjust(WIDGET, -5).await.unwrap();
        assert_eq!(ledger.available(WIDGET), Some(5));
        assert_eq!(ledger.get(WIDGET).await.unwrap().available_units, 5);

        // Another transaction still sees the committed units.
        let mut other = ledger.begin().await.unwrap();
        other.adjust(WIDGET, -1).await.unwrap();
        other.commit().await.unwrap();
        assert_eq!(ledger.available(WIDGET), Some(4));

        drop(tx);
        assert_eq!(ledger.available(WIDGET), Some(4));
    }

    #[tokio::test]
    async fn test_adjust_counts_own_staged_deltas() {
        let ledger = InMemoryStockLedger::new();
        ledger.set(WIDGET, 5).await.unwrap();

        let mut tx = ledger.begin().await.unwrap();
        let record = tx.adjust(WIDGET, -3).await.unwrap();
        assert_eq!(record.available_units, 2);

        let result = tx.adjust(WIDGET, -3).await;
        assert!(matches!(
            result,
            Err(InventoryError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            })
        ));

        let record = tx.adjust(WIDGET, 1).await.unwrap();
        assert_eq!(record.available_units, 3);
        tx.commit().await.unwrap();
        assert_eq!(ledger.available(WIDGET), Some(3));
    }

    #[tokio::test]
    async fn test_commit_fails_whole_batch_after_losing_race() {
        let ledger = InMemoryStockLedger::new();
        ledger.set(WIDGET, 5).await.unwrap();
        ledger.set(ProductId::new(2), 5).await.unwrap();

        let mut first = ledger.begin().await.unwrap();
        first.adjust(ProductId::new(2), -1).await.unwrap();
        first.adjust(WIDGET, -4).await.unwrap();

        let mut second = ledger.begin().await.unwrap();
        second.adjust(WIDGET, -3).await.unwrap();
        second.commit().await.unwrap();

        let result = first.commit().await;
        assert!(matches!(
            result,
            Err(InventoryError::InsufficientStock {
                requested: 4,
                available: 2,
                ..
            })
        ));
        assert_eq!(ledger.available(WIDGET), Some(2));
        assert_eq!(ledger.available(ProductId::new(2)), Some(5));
    }
}
