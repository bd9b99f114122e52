use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, Page, PageRequest, ProductId, UserId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use super::OrderStore;
use crate::cart::{CartStore, MAX_CART_QUANTITY, updated_quantity, validate_add_quantity};
use crate::error::StoreError;
use crate::model::{CartLine, Order, OrderDetail, OrderDraft, OrderLine, OrderStatus, ShippingInfo};

const ORDER_COLUMNS: &str = "id, order_number, user_id, total_cents, status, address, \
                             recipient_name, recipient_phone, note, created_at";

const UNPAID: [&str; 2] = ["PAYING", "WAIT_BUYER_PAY"];

/// PostgreSQL-backed cart and order store.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Creates a new store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        // Both services may share one database and its migration table.
        let mut migrator = sqlx::migrate!("../../migrations/orders");
        migrator.set_ignore_missing(true).run(&self.pool).await
    }

    fn row_to_cart_line(row: PgRow) -> Result<CartLine, StoreError> {
        Ok(CartLine {
            user_id: UserId::new(row.try_get("user_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: row.try_get("quantity")?,
            checked: row.try_get("checked")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order, StoreError> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get("id")?),
            order_number: row.try_get("order_number")?,
            user_id: UserId::new(row.try_get("user_id")?),
            total: Money::from_cents(row.try_get("total_cents")?),
            status: status.parse().map_err(StoreError::Corrupt)?,
            shipping: ShippingInfo {
                address: row.try_get("address")?,
                recipient_name: row.try_get("recipient_name")?,
                recipient_phone: row.try_get("recipient_phone")?,
                note: row.try_get("note")?,
            },
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order_line(row: PgRow) -> Result<OrderLine, StoreError> {
        Ok(OrderLine {
            product_id: ProductId::new(row.try_get("product_id")?),
            product_name: row.try_get("product_name")?,
            product_image: row.try_get("product_image")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            quantity: row.try_get("quantity")?,
        })
    }

    async fn fetch_lines(
        tx: &mut Transaction<'static, Postgres>,
        order_id: OrderId,
    ) -> Result<Vec<OrderLine>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, product_name, product_image, unit_price_cents, quantity
            FROM order_lines
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter().map(Self::row_to_order_line).collect()
    }
}

fn map_insert_error(err: sqlx::Error, order_number: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.constraint() == Some("unique_order_number") => {
            StoreError::DuplicateOrderNumber(order_number.to_string())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl CartStore for PgOrderStore {
    async fn list(&self, user_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, product_id, quantity, checked
            FROM cart_lines
            WHERE user_id = $1
            ORDER BY product_id
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_cart_line).collect()
    }

    async fn add(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartLine, StoreError> {
        validate_add_quantity(product_id, quantity)?;

        let row = sqlx::query(
            r#"
            INSERT INTO cart_lines (user_id, product_id, quantity, checked)
            VALUES ($1, $2, $3, FALSE)
            ON CONFLICT (user_id, product_id) DO UPDATE SET
                quantity = LEAST(cart_lines.quantity + EXCLUDED.quantity, $4),
                updated_at = NOW()
            RETURNING user_id, product_id, quantity, checked
            "#,
        )
        .bind(user_id.as_i64())
        .bind(product_id.as_i64())
        .bind(quantity)
        .bind(MAX_CART_QUANTITY)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_cart_line(row)
    }

    async fn update(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Option<i32>,
        checked: bool,
    ) -> Result<CartLine, StoreError> {
        // 0 keeps the stored quantity.
        let requested = updated_quantity(product_id, 0, quantity)?;
        let row = sqlx::query(
            r#"
            UPDATE cart_lines
            SET checked = $3,
                quantity = CASE WHEN $4 > 0 THEN $4 ELSE quantity END,
                updated_at = NOW()
            WHERE user_id = $1 AND product_id = $2
            RETURNING user_id, product_id, quantity, checked
            "#,
        )
        .bind(user_id.as_i64())
        .bind(product_id.as_i64())
        .bind(checked)
        .bind(requested)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_cart_line(row),
            None => Err(StoreError::CartLineNotFound(product_id)),
        }
    }

    async fn remove(&self, user_id: UserId, product_id: ProductId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE user_id = $1 AND product_id = $2")
            .bind(user_id.as_i64())
            .bind(product_id.as_i64())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::CartLineNotFound(product_id));
        }
        Ok(())
    }

    async fn checked_lines(&self, user_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, product_id, quantity, checked
            FROM cart_lines
            WHERE user_id = $1 AND checked
            ORDER BY product_id
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_cart_line).collect()
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    #[tracing::instrument(skip(self, draft), fields(order_number = %draft.order.order_number))]
    async fn place_order(&self, draft: &OrderDraft) -> Result<(), StoreError> {
        let order = &draft.order;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, user_id, total_cents, status, address,
                                recipient_name, recipient_phone, note, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.user_id.as_i64())
        .bind(order.total.cents())
        .bind(order.status.as_str())
        .bind(&order.shipping.address)
        .bind(&order.shipping.recipient_name)
        .bind(&order.shipping.recipient_phone)
        .bind(&order.shipping.note)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, &order.order_number))?;

        for line in &draft.lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, product_id, product_name, product_image,
                                         unit_price_cents, quantity)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(line.product_id.as_i64())
            .bind(&line.product_name)
            .bind(&line.product_image)
            .bind(line.unit_price.cents())
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        }

        let purchased: Vec<i64> = draft.purchased_products().map(|id| id.as_i64()).collect();
        let removed = sqlx::query(
            "DELETE FROM cart_lines WHERE user_id = $1 AND checked AND product_id = ANY($2)",
        )
        .bind(order.user_id.as_i64())
        .bind(purchased.as_slice())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let removed = usize::try_from(removed).unwrap_or(usize::MAX);
        if removed != purchased.len() {
            tx.rollback().await?;
            return Err(StoreError::CartChanged {
                expected: purchased.len(),
                removed,
            });
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Order>, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id.as_i64())
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 \
             ORDER BY created_at DESC, id LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_i64())
            .bind(i64::from(page.page_size()))
            .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(Self::row_to_order)
                .collect::<Result<_, _>>()?,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn get_detail(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<OrderDetail, StoreError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND user_id = $2");
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .bind(user_id.as_i64())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::order_not_found(order_id))?;

        let order = Self::row_to_order(row)?;
        let lines = Self::fetch_lines(&mut tx, order_id).await?;
        tx.commit().await?;

        Ok(OrderDetail { order, lines })
    }

    async fn update_status(
        &self,
        order_number: &str,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, updated_at = NOW() WHERE order_number = $1",
        )
        .bind(order_number)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::order_not_found(order_number));
        }
        Ok(())
    }

    async fn close_if_unpaid(
        &self,
        order_number: &str,
        owner: Option<UserId>,
    ) -> Result<Option<Vec<OrderLine>>, StoreError> {
        let owner = owner.map(|user_id| user_id.as_i64());
        let mut tx = self.pool.begin().await?;
        let closed: Option<uuid::Uuid> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE order_number = $1 AND status = ANY($3)
              AND ($4::BIGINT IS NULL OR user_id = $4)
            RETURNING id
            "#,
        )
        .bind(order_number)
        .bind(OrderStatus::TradeClosed.as_str())
        .bind(&UNPAID[..])
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = closed else {
            let exists: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM orders
                    WHERE order_number = $1 AND ($2::BIGINT IS NULL OR user_id = $2)
                )
                "#,
            )
            .bind(order_number)
            .bind(owner)
            .fetch_one(&mut *tx)
            .await?;
            tx.rollback().await?;
            return if exists {
                Ok(None)
            } else {
                Err(StoreError::order_not_found(order_number))
            };
        };

        let lines = Self::fetch_lines(&mut tx, OrderId::from_uuid(id)).await?;
        tx.commit().await?;
        Ok(Some(lines))
    }

    async fn unpaid_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<String>, StoreError> {
        let numbers = sqlx::query_scalar(
            r#"
            SELECT order_number FROM orders
            WHERE status = ANY($1) AND created_at < $2
            ORDER BY created_at
            LIMIT $3
            "#,
        )
        .bind(&UNPAID[..])
        .bind(cutoff)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(numbers)
    }
}
