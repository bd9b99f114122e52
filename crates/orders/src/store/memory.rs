use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, PageRequest, ProductId, UserId};

use super::OrderStore;
use crate::cart::{CartStore, merged_quantity, updated_quantity, validate_add_quantity};
use crate::error::StoreError;
use crate::model::{CartLine, Order, OrderDetail, OrderDraft, OrderLine, OrderStatus};

#[derive(Debug, Default)]
struct State {
    carts: HashMap<UserId, BTreeMap<ProductId, CartLine>>,
    orders: HashMap<OrderId, OrderDetail>,
    by_number: HashMap<String, OrderId>,
    failures: Vec<StoreError>,
    place_delay: Option<Duration>,
}

/// In-memory cart and order store.
///
/// Every operation runs under one mutex, which gives `place_order` the same
/// all-or-nothing behaviour as the database transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `place_order` call fail with `error` without writing.
    ///
    /// Queued errors are returned in the order they were added.
    pub fn fail_next_place(&self, error: StoreError) {
        self.lock().failures.push(error);
    }

    /// Delays every `place_order` call before it touches any state.
    pub fn set_place_delay(&self, delay: Option<Duration>) {
        self.lock().place_delay = delay;
    }

    /// Number of stored orders across all users.
    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CartStore for InMemoryOrderStore {
    async fn list(&self, user_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        Ok(self
            .lock()
            .carts
            .get(&user_id)
            .map(|lines| lines.values().copied().collect())
            .unwrap_or_default())
    }

    async fn add(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartLine, StoreError> {
        validate_add_quantity(product_id, quantity)?;

        let mut state = self.lock();
        let line = state
            .carts
            .entry(user_id)
            .or_default()
            .entry(product_id)
            .and_modify(|line| line.quantity = merged_quantity(line.quantity, quantity))
            .or_insert(CartLine {
                user_id,
                product_id,
                quantity,
                checked: false,
            });
        Ok(*line)
    }

    async fn update(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Option<i32>,
        checked: bool,
    ) -> Result<CartLine, StoreError> {
        let mut state = self.lock();
        let line = state
            .carts
            .get_mut(&user_id)
            .and_then(|lines| lines.get_mut(&product_id))
            .ok_or(StoreError::CartLineNotFound(product_id))?;

        line.quantity = updated_quantity(product_id, line.quantity, quantity)?;
        line.checked = checked;
        Ok(*line)
    }

    async fn remove(&self, user_id: UserId, product_id: ProductId) -> Result<(), StoreError> {
        self.lock()
            .carts
            .get_mut(&user_id)
            .and_then(|lines| lines.remove(&product_id))
            .map(|_| ())
            .ok_or(StoreError::CartLineNotFound(product_id))
    }

    async fn checked_lines(&self, user_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        Ok(self
            .lock()
            .carts
            .get(&user_id)
            .map(|lines| lines.values().filter(|line| line.checked).copied().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn place_order(&self, draft: &OrderDraft) -> Result<(), StoreError> {
        let delay = self.lock().place_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if !state.failures.is_empty() {
            return Err(state.failures.remove(0));
        }

        let order = &draft.order;
        if state.by_number.contains_key(&order.order_number) {
            return Err(StoreError::DuplicateOrderNumber(order.order_number.clone()));
        }

        let expected = draft.lines.len();
        let cart = state.carts.entry(order.user_id).or_default();
        let present = draft
            .purchased_products()
            .filter(|id| cart.get(id).is_some_and(|line| line.checked))
            .count();
        if present != expected {
            return Err(StoreError::CartChanged {
                expected,
                removed: present,
            });
        }
        for product_id in draft.purchased_products() {
            cart.remove(&product_id);
        }

        state.by_number.insert(order.order_number.clone(), order.id);
        state.orders.insert(
            order.id,
            OrderDetail {
                order: order.clone(),
                lines: draft.lines.clone(),
            },
        );
        Ok(())
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Order>, StoreError> {
        let state = self.lock();
        let mut orders: Vec<&Order> = state
            .orders
            .values()
            .map(|detail| &detail.order)
            .filter(|order| order.user_id == user_id)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = orders.len() as u64;
        let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let items = orders
            .into_iter()
            .skip(skip)
            .take(page.page_size() as usize)
            .cloned()
            .collect();
        Ok(Page { items, total })
    }

    async fn get_detail(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<OrderDetail, StoreError> {
        self.lock()
            .orders
            .get(&order_id)
            .filter(|detail| detail.order.user_id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::order_not_found(order_id))
    }

    async fn update_status(
        &self,
        order_number: &str,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let id = *state
            .by_number
            .get(order_number)
            .ok_or_else(|| StoreError::order_not_found(order_number))?;
        if let Some(detail) = state.orders.get_mut(&id) {
            detail.order.status = status;
        }
        Ok(())
    }

    async fn close_if_unpaid(
        &self,
        order_number: &str,
        owner: Option<UserId>,
    ) -> Result<Option<Vec<OrderLine>>, StoreError> {
        let mut state = self.lock();
        let id = *state
            .by_number
            .get(order_number)
            .ok_or_else(|| StoreError::order_not_found(order_number))?;
        let detail = state
            .orders
            .get_mut(&id)
            .filter(|detail| owner.is_none_or(|user_id| detail.order.user_id == user_id))
            .ok_or_else(|| StoreError::order_not_found(order_number))?;

        if !detail.order.status.is_unpaid() {
            return Ok(None);
        }
        detail.order.status = OrderStatus::TradeClosed;
        Ok(Some(detail.lines.clone()))
    }

    async fn unpaid_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.lock();
        let mut unpaid: Vec<&Order> = state
            .orders
            .values()
            .map(|detail| &detail.order)
            .filter(|order| order.status.is_unpaid() && order.created_at < cutoff)
            .collect();
        unpaid.sort_by_key(|order| order.created_at);
        Ok(unpaid
            .into_iter()
            .take(limit as usize)
            .map(|order| order.order_number.clone())
            .collect())
    }
}
