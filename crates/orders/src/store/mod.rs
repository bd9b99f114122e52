//! Durable order records and the cart tables they are placed from.

mod memory;
mod postgres;

pub use memory::InMemoryOrderStore;
pub use postgres::PgOrderStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, PageRequest, UserId};

use crate::error::StoreError;
use crate::model::{Order, OrderDetail, OrderDraft, OrderLine, OrderStatus};

/// Storage for orders and their lines.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists an order in one local transaction.
    ///
    /// Inserts the header and every line, then deletes exactly the user's
    /// checked cart lines for the purchased products. Fails with
    /// `DuplicateOrderNumber` when the number is taken and with `CartChanged`
    /// when the purchased lines are no longer all present and checked; either
    /// way nothing is written.
    async fn place_order(&self, draft: &OrderDraft) -> Result<(), StoreError>;

    /// A page of the user's orders, newest first.
    async fn list_by_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Order>, StoreError>;

    /// Loads an order and its lines.
    ///
    /// The owner is part of the lookup itself, so another user's order id
    /// yields `OrderNotFound`.
    async fn get_detail(&self, order_id: OrderId, user_id: UserId)
    -> Result<OrderDetail, StoreError>;

    /// Sets the status of an order. Setting the current status again is a no-op.
    async fn update_status(&self, order_number: &str, status: OrderStatus)
    -> Result<(), StoreError>;

    /// Moves an unpaid order to `TRADE_CLOSED`.
    ///
    /// Returns the order's lines when this call closed it and `None` when the
    /// order was already paid or closed, so at most one caller ever gets to
    /// return its stock. With an `owner`, another user's order yields
    /// `OrderNotFound`.
    async fn close_if_unpaid(
        &self,
        order_number: &str,
        owner: Option<UserId>,
    ) -> Result<Option<Vec<OrderLine>>, StoreError>;

    /// Order numbers of unpaid orders created before `cutoff`, oldest first.
    async fn unpaid_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<String>, StoreError>;
}
