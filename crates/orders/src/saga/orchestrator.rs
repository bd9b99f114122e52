//! Order orchestrator driving the checkout saga.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{Money, OrderId, Page, PageRequest, ProductId, UserId};
use inventory::{InventoryService, StockLine};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::cart::CartStore;
use crate::catalog::{CatalogItem, CatalogLookup};
use crate::error::{CatalogError, CheckoutError, Compensation, Result, StoreError};
use crate::model::{Order, OrderDetail, OrderDraft, OrderLine, OrderStatus, ShippingInfo};
use crate::order_number;
use crate::saga::CheckoutStep;
use crate::store::OrderStore;

/// Bounds and intervals of the checkout saga and the expiry sweep.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Upper bound for persisting one order, number retries included.
    pub persist_timeout: Duration,
    /// Order numbers tried before a collision is reported.
    pub max_order_number_attempts: u32,
    /// Age after which an unpaid order is closed.
    pub order_ttl: Duration,
    pub sweep_interval: Duration,
    /// Orders closed per sweep at most.
    pub sweep_batch: u32,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            persist_timeout: Duration::from_secs(5),
            max_order_number_attempts: 3,
            order_ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
            sweep_batch: 100,
        }
    }
}

/// What a successful checkout returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub total: Money,
}

/// Runs checkouts and the order lifecycle operations around them.
///
/// Dependencies are trait objects so the binaries can pick in-process or
/// remote implementations from configuration.
pub struct OrderOrchestrator {
    carts: Arc<dyn CartStore>,
    catalog: Arc<dyn CatalogLookup>,
    inventory: Arc<dyn InventoryService>,
    orders: Arc<dyn OrderStore>,
    settings: CheckoutSettings,
}

impl OrderOrchestrator {
    pub fn new(
        carts: Arc<dyn CartStore>,
        catalog: Arc<dyn CatalogLookup>,
        inventory: Arc<dyn InventoryService>,
        orders: Arc<dyn OrderStore>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            carts,
            catalog,
            inventory,
            orders,
            settings,
        }
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    /// Buys the user's checked cart lines.
    ///
    /// Steps run in order: read cart, price, reserve stock, persist the order
    /// and clear the purchased cart lines. Failures before the reservation
    /// leave nothing behind. Failures after it release the reserved stock
    /// before the error is returned, and the error reports whether that
    /// release worked.
    #[tracing::instrument(skip(self, shipping), fields(user_id = %user_id))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        shipping: ShippingInfo,
    ) -> Result<PlacedOrder> {
        metrics::counter!("checkout_total").increment(1);
        let started = Instant::now();

        let result = self.run_checkout(user_id, shipping).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(placed) => {
                tracing::info!(order_number = %placed.order_number, total = %placed.total, "order placed");
            }
            Err(e) => {
                metrics::counter!("checkout_failed_total", "reason" => e.reason()).increment(1);
                tracing::warn!(error = %e, compensation = %e.compensation(), "checkout failed");
            }
        }
        result
    }

    async fn run_checkout(&self, user_id: UserId, shipping: ShippingInfo) -> Result<PlacedOrder> {
        validate_shipping(&shipping)?;
        let mut step = CheckoutStep::default();

        let cart = self
            .carts
            .checked_lines(user_id)
            .await
            .map_err(|e| CheckoutError::DependencyUnavailable {
                step: CheckoutStep::CartRead,
                reason: e.to_string(),
            })?;
        if cart.is_empty() {
            return Err(CheckoutError::NothingToCheckout);
        }
        advance(&mut step);

        let ids: Vec<ProductId> = cart.iter().map(|line| line.product_id).collect();
        let catalog: HashMap<ProductId, CatalogItem> = self
            .catalog
            .batch_get(&ids)
            .await
            .map_err(|e| match e {
                CatalogError::Unavailable(reason) => CheckoutError::DependencyUnavailable {
                    step: CheckoutStep::Priced,
                    reason,
                },
                missing => CheckoutError::ProductUnavailable(missing),
            })?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        let lines = cart
            .iter()
            .map(|line| {
                let item = catalog.get(&line.product_id).ok_or_else(|| {
                    CheckoutError::ProductUnavailable(CatalogError::ProductUnavailable(
                        line.product_id,
                    ))
                })?;
                Ok(OrderLine {
                    product_id: line.product_id,
                    product_name: item.name.clone(),
                    product_image: item.image.clone(),
                    unit_price: item.price,
                    quantity: line.quantity,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let total = order_total(&lines)?;
        advance(&mut step);

        let items = stock_lines(&lines);
        self.inventory
            .reserve(&items)
            .await
            .map_err(CheckoutError::Inventory)?;
        advance(&mut step);

        let draft = OrderDraft {
            order: Order {
                id: OrderId::new(),
                order_number: order_number::generate(user_id),
                user_id,
                total,
                status: OrderStatus::Paying,
                shipping,
                created_at: Utc::now(),
            },
            lines,
        };

        // From here on the stock is decremented. The remaining steps run in
        // their own task so that dropping this future cannot skip the release.
        let task = tokio::spawn(
            persist_or_compensate(
                Arc::clone(&self.orders),
                Arc::clone(&self.inventory),
                self.settings.clone(),
                step,
                draft,
                items.clone(),
            )
            .in_current_span(),
        );
        match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(items = ?items, error = %e, "persistence task aborted, stock needs reconciliation");
                Err(CheckoutError::Persistence {
                    source: StoreError::Aborted(e.to_string()),
                    compensation: if step.requires_compensation() {
                        Compensation::Failed
                    } else {
                        Compensation::NotRequired
                    },
                    items,
                })
            }
        }
    }

    /// Closes one of the user's unpaid orders and returns its stock.
    ///
    /// Returns `Ok(false)` when the order was already paid or closed; only
    /// the call that closes the order releases stock. Another user's order
    /// is reported as not found.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, user_id: UserId, order_number: &str) -> Result<bool> {
        self.close_and_release(order_number, Some(user_id)).await
    }

    /// Closes an unpaid order, restricted to `owner` when given, and
    /// releases its stock.
    pub(crate) async fn close_and_release(
        &self,
        order_number: &str,
        owner: Option<UserId>,
    ) -> Result<bool> {
        let Some(lines) = self.orders.close_if_unpaid(order_number, owner).await? else {
            return Ok(false);
        };

        let items = stock_lines(&lines);
        match self.inventory.release(&items).await {
            Ok(()) => {
                tracing::info!("order closed, stock released");
                Ok(true)
            }
            Err(source) => {
                tracing::error!(items = ?items, error = %source, "order closed but stock release failed, stock needs reconciliation");
                Err(CheckoutError::StockNotReturned {
                    order_number: order_number.to_string(),
                    source,
                    items,
                })
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, user_id: UserId, page: PageRequest) -> Result<Page<Order>> {
        Ok(self.orders.list_by_user(user_id, page).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn order_detail(&self, order_id: OrderId, user_id: UserId) -> Result<OrderDetail> {
        Ok(self.orders.get_detail(order_id, user_id).await?)
    }

    /// Sets an order's status as reported by payment or shipment events.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, order_number: &str, status: OrderStatus) -> Result<()> {
        Ok(self.orders.update_status(order_number, status).await?)
    }

    pub(crate) fn orders(&self) -> &dyn OrderStore {
        self.orders.as_ref()
    }
}

/// Persists the order and releases the stock again if that fails.
#[tracing::instrument(skip_all, fields(order_number = %draft.order.order_number))]
async fn persist_or_compensate(
    orders: Arc<dyn OrderStore>,
    inventory: Arc<dyn InventoryService>,
    settings: CheckoutSettings,
    mut step: CheckoutStep,
    mut draft: OrderDraft,
    items: Vec<StockLine>,
) -> Result<PlacedOrder> {
    let persisted = tokio::time::timeout(
        settings.persist_timeout,
        persist_with_fresh_numbers(orders.as_ref(), &mut draft, settings.max_order_number_attempts),
    )
    .await
    .unwrap_or_else(|_| Err(StoreError::Timeout(settings.persist_timeout)));

    let source = match persisted {
        Ok(()) => {
            advance(&mut step);
            advance(&mut step);
            return Ok(PlacedOrder {
                order_id: draft.order.id,
                order_number: draft.order.order_number,
                total: draft.order.total,
            });
        }
        Err(e) => e,
    };

    tracing::warn!(after = %step, error = %source, "persisting order failed");
    let compensation = if step.requires_compensation() {
        let outcome = match inventory.release(&items).await {
            Ok(()) => Compensation::Released,
            Err(e) => {
                tracing::error!(items = ?items, error = %e, "compensation failed, stock needs reconciliation");
                Compensation::Failed
            }
        };
        metrics::counter!("checkout_compensations_total", "outcome" => outcome.as_str())
            .increment(1);
        outcome
    } else {
        Compensation::NotRequired
    };

    Err(CheckoutError::Persistence {
        source,
        compensation,
        items,
    })
}

/// Places the order, drawing a new number whenever the current one is taken.
async fn persist_with_fresh_numbers(
    orders: &dyn OrderStore,
    draft: &mut OrderDraft,
    max_attempts: u32,
) -> std::result::Result<(), StoreError> {
    let mut attempt = 1;
    loop {
        match orders.place_order(draft).await {
            Err(StoreError::DuplicateOrderNumber(number)) if attempt < max_attempts => {
                tracing::warn!(order_number = %number, attempt, "order number taken, regenerating");
                draft.order.order_number = order_number::generate(draft.order.user_id);
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Moves `step` to the one that follows it and logs the completed step.
fn advance(step: &mut CheckoutStep) {
    if let Some(next) = step.next() {
        *step = next;
        tracing::info!(step = %next, "checkout step completed");
    }
}

/// Sum of the line subtotals, refused as invalid input when it overflows.
fn order_total(lines: &[OrderLine]) -> Result<Money> {
    lines
        .iter()
        .try_fold(Money::zero(), |total, line| {
            line.unit_price
                .checked_times(line.quantity)
                .and_then(|subtotal| total.checked_add(subtotal))
        })
        .ok_or_else(|| CheckoutError::InvalidRequest("order total is out of range".to_string()))
}

fn stock_lines(lines: &[OrderLine]) -> Vec<StockLine> {
    lines
        .iter()
        .map(|line| StockLine::new(line.product_id, line.quantity))
        .collect()
}

/// Field name, value, whether it is required, and its maximum length in
/// characters as stored by the order tables.
fn shipping_fields(shipping: &ShippingInfo) -> [(&'static str, &str, bool, usize); 4] {
    [
        ("address", shipping.address.as_str(), true, 200),
        ("recipient_name", shipping.recipient_name.as_str(), true, 40),
        ("recipient_phone", shipping.recipient_phone.as_str(), true, 20),
        ("note", shipping.note.as_str(), false, 200),
    ]
}

fn validate_shipping(shipping: &ShippingInfo) -> Result<()> {
    for (field, value, required, max) in shipping_fields(shipping) {
        if required && value.trim().is_empty() {
            return Err(CheckoutError::InvalidRequest(format!("{field} is required")));
        }
        if value.chars().count() > max {
            return Err(CheckoutError::InvalidRequest(format!(
                "{field} must be at most {max} characters"
            )));
        }
    }
    Ok(())
}
