use async_trait::async_trait;
use common::ProductId;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use super::{LedgerTransaction, StockLedger};
use crate::error::{InventoryError, Result};
use crate::model::StockRecord;

/// PostgreSQL-backed stock ledger.
///
/// The `stock_records` table carries a `CHECK (available_units >= 0)`
/// constraint in addition to the guarded update below.
#[derive(Clone)]
pub struct PgStockLedger {
    pool: PgPool,
}

impl PgStockLedger {
    /// Creates a new ledger over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        // Both services may share one database and its migration table.
        let mut migrator = sqlx::migrate!("../../migrations/inventory");
        migrator.set_ignore_missing(true).run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<StockRecord> {
        Ok(StockRecord {
            product_id: ProductId::new(row.try_get("product_id")?),
            available_units: row.try_get("available_units")?,
            version: row.try_get("version")?,
        })
    }
}

#[async_trait]
impl StockLedger for PgStockLedger {
    type Tx = PgLedgerTx;

    async fn get(&self, product_id: ProductId) -> Result<StockRecord> {
        let row = sqlx::query(
            r#"
            SELECT product_id, available_units, version
            FROM stock_records
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_record(row),
            None => Err(InventoryError::RecordNotFound(product_id)),
        }
    }

    async fn set(&self, product_id: ProductId, units: i32) -> Result<StockRecord> {
        if units < 0 {
            return Err(InventoryError::InvalidStockLevel {
                product_id,
                units: i64::from(units),
            });
        }

        let row = sqlx::query(
            r#"
            INSERT INTO stock_records (product_id, available_units, version)
            VALUES ($1, $2, 1)
            ON CONFLICT (product_id) DO UPDATE SET
                available_units = EXCLUDED.available_units,
                version = stock_records.version + 1,
                updated_at = NOW()
            RETURNING product_id, available_units, version
            "#,
        )
        .bind(product_id.as_i64())
        .bind(units)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_record(row)
    }

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(PgLedgerTx {
            tx: self.pool.begin().await?,
        })
    }
}

/// A ledger transaction backed by a PostgreSQL transaction.
///
/// Dropping it without committing rolls back, as with any sqlx transaction.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTx {
    async fn adjust(&mut self, product_id: ProductId, delta: i32) -> Result<StockRecord> {
        // Check and write in one statement; the row lock it takes is held
        // until this transaction ends.
        let row = sqlx::query(
            r#"
            UPDATE stock_records
            SET available_units = available_units + $2,
                version = version + 1,
                updated_at = NOW()
            WHERE product_id = $1 AND available_units + $2 >= 0
            RETURNING product_id, available_units, version
            "#,
        )
        .bind(product_id.as_i64())
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = row {
            return PgStockLedger::row_to_record(row);
        }

        let available: Option<i32> =
            sqlx::query_scalar("SELECT available_units FROM stock_records WHERE product_id = $1")
                .bind(product_id.as_i64())
                .fetch_optional(&mut *self.tx)
                .await?;

        match available {
            Some(available) => Err(InventoryError::InsufficientStock {
                product_id,
                requested: delta.saturating_neg(),
                available,
            }),
            None => Err(InventoryError::RecordNotFound(product_id)),
        }
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
