//! Checkout saga behaviour over in-memory stores and an in-process inventory.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use common::{Money, PageRequest, ProductId, UserId};
use inventory::{
    InMemoryLockProvider, InMemoryStockLedger, InventoryError, InventoryService,
    LeasedProductLock, LedgerInventoryService, LockSettings, StockLine, StockRecord,
};
use orders::{
    CartStore, CheckoutError, CheckoutSettings, CheckoutStep, Compensation, InMemoryCatalog,
    InMemoryOrderStore, OrderOrchestrator, OrderStatus, ShippingInfo, StoreError,
    spawn_expiry_worker,
};

const ALICE: UserId = UserId::new(1);
const BOB: UserId = UserId::new(2);
const PEN: ProductId = ProductId::new(1);
const INK: ProductId = ProductId::new(2);

type LocalInventory =
    LedgerInventoryService<InMemoryStockLedger, LeasedProductLock<InMemoryLockProvider>>;

/// Delegates to a real inventory but can be told to refuse releases.
struct FlakyInventory {
    inner: LocalInventory,
    fail_release: AtomicBool,
}

#[async_trait]
impl InventoryService for FlakyInventory {
    async fn set_stock(&self, product_id: ProductId, units: i32) -> inventory::Result<StockRecord> {
        self.inner.set_stock(product_id, units).await
    }

    async fn stock_detail(&self, product_id: ProductId) -> inventory::Result<StockRecord> {
        self.inner.stock_detail(product_id).await
    }

    async fn reserve(&self, items: &[StockLine]) -> inventory::Result<()> {
        self.inner.reserve(items).await
    }

    async fn release(&self, items: &[StockLine]) -> inventory::Result<()> {
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(InventoryError::Unavailable("connection refused".to_string()));
        }
        self.inner.release(items).await
    }
}

struct Harness {
    orchestrator: Arc<OrderOrchestrator>,
    store: InMemoryOrderStore,
    catalog: InMemoryCatalog,
    inventory: Arc<FlakyInventory>,
}

impl Harness {
    fn new(settings: CheckoutSettings) -> Self {
        let lock_settings = LockSettings::default();
        let inventory = Arc::new(FlakyInventory {
            inner: LedgerInventoryService::new(
                InMemoryStockLedger::new(),
                LeasedProductLock::new(
                    InMemoryLockProvider::new(lock_settings),
                    lock_settings.lease,
                ),
            ),
            fail_release: AtomicBool::new(false),
        });
        let store = InMemoryOrderStore::new();
        let catalog = InMemoryCatalog::new();
        catalog.insert(PEN, "Fountain pen", Money::from_cents(1250));
        catalog.insert(INK, "Ink bottle", Money::from_cents(400));

        let orchestrator = Arc::new(OrderOrchestrator::new(
            Arc::new(store.clone()),
            Arc::new(catalog.clone()),
            inventory.clone(),
            Arc::new(store.clone()),
            settings,
        ));
        Self {
            orchestrator,
            store,
            catalog,
            inventory,
        }
    }

    async fn stock(&self, product_id: ProductId, units: i32) {
        self.inventory.set_stock(product_id, units).await.unwrap();
    }

    async fn available(&self, product_id: ProductId) -> i32 {
        self.inventory
            .stock_detail(product_id)
            .await
            .unwrap()
            .available_units
    }

    async fn cart(&self, user_id: UserId, product_id: ProductId, quantity: i32, checked: bool) {
        self.store.add(user_id, product_id, quantity).await.unwrap();
        self.store
            .update(user_id, product_id, None, checked)
            .await
            .unwrap();
    }
}

fn shipping() -> ShippingInfo {
    ShippingInfo {
        address: "221B Baker Street".to_string(),
        recipient_name: "Ada".to_string(),
        recipient_phone: "555-0100".to_string(),
        note: "leave at the door".to_string(),
    }
}

#[tokio::test]
async fn test_checkout_buys_only_checked_lines() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 10).await;
    h.stock(INK, 10).await;
    h.cart(ALICE, PEN, 2, true).await;
    h.cart(ALICE, INK, 1, false).await;

    let placed = h.orchestrator.place_order(ALICE, shipping()).await.unwrap();

    assert_eq!(placed.total, Money::from_cents(2500));
    assert_eq!(h.available(PEN).await, 8);
    assert_eq!(h.available(INK).await, 10);

    let remaining = h.store.list(ALICE).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].product_id, INK);

    let detail = h
        .orchestrator
        .order_detail(placed.order_id, ALICE)
        .await
        .unwrap();
    assert_eq!(detail.order.order_number, placed.order_number);
    assert_eq!(detail.order.status, OrderStatus::Paying);
    assert_eq!(detail.lines.len(), 1);
    assert_eq!(detail.lines[0].product_id, PEN);
    assert_eq!(detail.lines[0].quantity, 2);
    assert_eq!(detail.lines[0].unit_price, Money::from_cents(1250));
}

#[tokio::test]
async fn test_prices_are_snapshotted_at_checkout() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 5).await;
    h.cart(ALICE, PEN, 1, true).await;

    let placed = h.orchestrator.place_order(ALICE, shipping()).await.unwrap();
    h.catalog.set_price(PEN, Money::from_cents(9999));

    let detail = h
        .orchestrator
        .order_detail(placed.order_id, ALICE)
        .await
        .unwrap();
    assert_eq!(detail.order.total, Money::from_cents(1250));
    assert_eq!(detail.lines[0].unit_price, Money::from_cents(1250));
}

#[tokio::test]
async fn test_empty_cart_touches_nothing() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 10).await;
    h.cart(ALICE, PEN, 2, false).await;

    let err = h.orchestrator.place_order(ALICE, shipping()).await.unwrap_err();

    assert!(matches!(err, CheckoutError::NothingToCheckout));
    assert_eq!(err.compensation(), Compensation::NotRequired);
    assert_eq!(h.available(PEN).await, 10);
    assert_eq!(h.store.order_count(), 0);
    assert_eq!(h.store.list(ALICE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_shipping_details_are_rejected() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 10).await;
    h.cart(ALICE, PEN, 1, true).await;

    let mut info = shipping();
    info.address.clear();
    let err = h.orchestrator.place_order(ALICE, info).await.unwrap_err();

    assert!(matches!(err, CheckoutError::InvalidRequest(_)));
    assert_eq!(h.available(PEN).await, 10);
}

#[tokio::test]
async fn test_unknown_product_aborts_before_reserving() {
    let h = Harness::new(CheckoutSettings::default());
    let ghost = ProductId::new(99);
    h.stock(PEN, 10).await;
    h.stock(ghost, 10).await;
    h.cart(ALICE, PEN, 1, true).await;
    h.cart(ALICE, ghost, 1, true).await;

    let err = h.orchestrator.place_order(ALICE, shipping()).await.unwrap_err();

    assert!(matches!(err, CheckoutError::ProductUnavailable(_)));
    assert_eq!(h.available(PEN).await, 10);
    assert_eq!(h.available(ghost).await, 10);
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn test_catalog_outage_is_dependency_unavailable() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 10).await;
    h.cart(ALICE, PEN, 1, true).await;
    h.catalog.set_unavailable(true);

    let err = h.orchestrator.place_order(ALICE, shipping()).await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::DependencyUnavailable {
            step: CheckoutStep::Priced,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(h.available(PEN).await, 10);
}

#[tokio::test]
async fn test_insufficient_stock_leaves_no_order() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 10).await;
    h.stock(INK, 1).await;
    h.cart(ALICE, PEN, 2, true).await;
    h.cart(ALICE, INK, 3, true).await;

    let err = h.orchestrator.place_order(ALICE, shipping()).await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Inventory(InventoryError::InsufficientStock { product_id, .. }) if product_id == INK
    ));
    assert_eq!(err.compensation(), Compensation::NotRequired);
    assert_eq!(h.available(PEN).await, 10);
    assert_eq!(h.available(INK).await, 1);
    assert_eq!(h.store.order_count(), 0);
    assert_eq!(h.store.checked_lines(ALICE).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_persistence_failure_releases_stock() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 5).await;
    h.cart(ALICE, PEN, 3, true).await;
    h.store.fail_next_place(StoreError::Corrupt("disk full".to_string()));

    let err = h.orchestrator.place_order(ALICE, shipping()).await.unwrap_err();

    assert!(matches!(
        &err,
        CheckoutError::Persistence {
            compensation: Compensation::Released,
            ..
        }
    ));
    assert_eq!(h.available(PEN).await, 5);
    assert_eq!(h.store.order_count(), 0);
    assert_eq!(h.store.checked_lines(ALICE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_compensation_is_reported() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 5).await;
    h.cart(ALICE, PEN, 3, true).await;
    h.store.fail_next_place(StoreError::Corrupt("disk full".to_string()));
    h.inventory.fail_release.store(true, Ordering::SeqCst);

    let err = h.orchestrator.place_order(ALICE, shipping()).await.unwrap_err();

    match err {
        CheckoutError::Persistence {
            compensation,
            items,
            ..
        } => {
            assert_eq!(compensation, Compensation::Failed);
            assert_eq!(items, vec![StockLine::new(PEN, 3)]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.available(PEN).await, 2);
}

#[tokio::test]
async fn test_order_number_collision_is_retried() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 5).await;
    h.cart(ALICE, PEN, 1, true).await;
    h.store
        .fail_next_place(StoreError::DuplicateOrderNumber("taken".to_string()));

    let placed = h.orchestrator.place_order(ALICE, shipping()).await.unwrap();

    assert_eq!(h.store.order_count(), 1);
    assert_eq!(h.available(PEN).await, 4);
    assert!(placed.order_number.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn test_order_number_collisions_are_bounded() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 5).await;
    h.cart(ALICE, PEN, 1, true).await;
    for _ in 0..3 {
        h.store
            .fail_next_place(StoreError::DuplicateOrderNumber("taken".to_string()));
    }

    let err = h.orchestrator.place_order(ALICE, shipping()).await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Persistence {
            source: StoreError::DuplicateOrderNumber(_),
            compensation: Compensation::Released,
            ..
        }
    ));
    assert_eq!(h.available(PEN).await, 5);
}

#[tokio::test]
async fn test_slow_persistence_times_out_and_compensates() {
    let h = Harness::new(CheckoutSettings {
        persist_timeout: Duration::from_millis(50),
        ..CheckoutSettings::default()
    });
    h.stock(PEN, 5).await;
    h.cart(ALICE, PEN, 2, true).await;
    h.store.set_place_delay(Some(Duration::from_millis(500)));

    let err = h.orchestrator.place_order(ALICE, shipping()).await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Persistence {
            source: StoreError::Timeout(_),
            compensation: Compensation::Released,
            ..
        }
    ));
    assert_eq!(h.available(PEN).await, 5);
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn test_dropped_checkout_still_settles() {
    let h = Harness::new(CheckoutSettings {
        persist_timeout: Duration::from_millis(100),
        ..CheckoutSettings::default()
    });
    h.stock(PEN, 5).await;
    h.cart(ALICE, PEN, 2, true).await;
    h.store.set_place_delay(Some(Duration::from_millis(500)));

    let orchestrator = h.orchestrator.clone();
    let checkout = tokio::spawn(async move { orchestrator.place_order(ALICE, shipping()).await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    checkout.abort();

    // The persistence task outlives the caller and releases after its timeout.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.available(PEN).await, 5);
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn test_orders_are_scoped_to_their_owner() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 5).await;
    h.cart(ALICE, PEN, 1, true).await;
    let placed = h.orchestrator.place_order(ALICE, shipping()).await.unwrap();

    let err = h
        .orchestrator
        .order_detail(placed.order_id, BOB)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::OrderNotFound(_)));

    let page = h
        .orchestrator
        .list_orders(BOB, PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(page.total, 0);

    let page = h
        .orchestrator
        .list_orders(ALICE, PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].order_number, placed.order_number);
}

#[tokio::test]
async fn test_cancel_releases_stock_once() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 5).await;
    h.cart(ALICE, PEN, 3, true).await;
    let placed = h.orchestrator.place_order(ALICE, shipping()).await.unwrap();
    assert_eq!(h.available(PEN).await, 2);

    assert!(h.orchestrator.cancel_order(ALICE, &placed.order_number).await.unwrap());
    assert!(!h.orchestrator.cancel_order(ALICE, &placed.order_number).await.unwrap());

    assert_eq!(h.available(PEN).await, 5);
    let detail = h
        .orchestrator
        .order_detail(placed.order_id, ALICE)
        .await
        .unwrap();
    assert_eq!(detail.order.status, OrderStatus::TradeClosed);
}

#[tokio::test]
async fn test_paid_orders_are_not_cancelled() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 5).await;
    h.cart(ALICE, PEN, 1, true).await;
    let placed = h.orchestrator.place_order(ALICE, shipping()).await.unwrap();
    h.orchestrator
        .update_status(&placed.order_number, OrderStatus::TradeSuccess)
        .await
        .unwrap();

    assert!(!h.orchestrator.cancel_order(ALICE, &placed.order_number).await.unwrap());
    assert_eq!(h.available(PEN).await, 4);
}

#[tokio::test]
async fn test_cancel_is_scoped_to_the_owner() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 5).await;
    h.cart(ALICE, PEN, 3, true).await;
    let placed = h.orchestrator.place_order(ALICE, shipping()).await.unwrap();

    let err = h
        .orchestrator
        .cancel_order(BOB, &placed.order_number)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::OrderNotFound(_)));
    assert_eq!(h.available(PEN).await, 2);

    let detail = h
        .orchestrator
        .order_detail(placed.order_id, ALICE)
        .await
        .unwrap();
    assert_eq!(detail.order.status, OrderStatus::Paying);
}

#[tokio::test]
async fn test_overlong_shipping_field_reserves_nothing() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 5).await;
    h.cart(ALICE, PEN, 2, true).await;

    let mut long_name = shipping();
    long_name.recipient_name = "x".repeat(41);
    let err = h
        .orchestrator
        .place_order(ALICE, long_name)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::InvalidRequest(_)));
    assert_eq!(err.compensation(), Compensation::NotRequired);
    assert_eq!(h.available(PEN).await, 5);
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn test_overflowing_total_is_rejected_before_reserving() {
    let h = Harness::new(CheckoutSettings::default());
    h.catalog
        .insert(PEN, "Gold pen", Money::from_cents(5_000_000_000_000_000_000));
    h.stock(PEN, 5).await;
    h.cart(ALICE, PEN, 2, true).await;

    let err = h
        .orchestrator
        .place_order(ALICE, shipping())
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::InvalidRequest(_)));
    assert_eq!(h.available(PEN).await, 5);
    assert_eq!(h.store.checked_lines(ALICE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_unknown_order() {
    let h = Harness::new(CheckoutSettings::default());
    let err = h.orchestrator.cancel_order(ALICE, "404").await.unwrap_err();
    assert!(matches!(err, CheckoutError::OrderNotFound(_)));
}

#[tokio::test]
async fn test_cancel_reports_stock_not_returned() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 5).await;
    h.cart(ALICE, PEN, 2, true).await;
    let placed = h.orchestrator.place_order(ALICE, shipping()).await.unwrap();
    h.inventory.fail_release.store(true, Ordering::SeqCst);

    let err = h
        .orchestrator
        .cancel_order(ALICE, &placed.order_number)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::StockNotReturned { .. }));
    assert_eq!(err.compensation(), Compensation::Failed);
}

#[tokio::test]
async fn test_expiry_closes_only_old_unpaid_orders() {
    let h = Harness::new(CheckoutSettings::default());
    h.stock(PEN, 10).await;
    h.cart(ALICE, PEN, 2, true).await;
    let unpaid = h.orchestrator.place_order(ALICE, shipping()).await.unwrap();
    h.cart(BOB, PEN, 3, true).await;
    let paid = h.orchestrator.place_order(BOB, shipping()).await.unwrap();
    h.orchestrator
        .update_status(&paid.order_number, OrderStatus::TradeSuccess)
        .await
        .unwrap();
    assert_eq!(h.available(PEN).await, 5);

    // Nothing is old enough yet.
    assert_eq!(h.orchestrator.expire_unpaid(Utc::now()).await.unwrap(), 0);

    let later = Utc::now() + TimeDelta::hours(1);
    assert_eq!(h.orchestrator.expire_unpaid(later).await.unwrap(), 1);
    assert_eq!(h.orchestrator.expire_unpaid(later).await.unwrap(), 0);

    assert_eq!(h.available(PEN).await, 7);
    let detail = h
        .orchestrator
        .order_detail(unpaid.order_id, ALICE)
        .await
        .unwrap();
    assert_eq!(detail.order.status, OrderStatus::TradeClosed);
}

#[tokio::test]
async fn test_expiry_worker_sweeps_periodically() {
    let h = Harness::new(CheckoutSettings {
        order_ttl: Duration::ZERO,
        sweep_interval: Duration::from_millis(20),
        ..CheckoutSettings::default()
    });
    h.stock(PEN, 4).await;
    h.cart(ALICE, PEN, 4, true).await;
    let placed = h.orchestrator.place_order(ALICE, shipping()).await.unwrap();

    let worker = spawn_expiry_worker(h.orchestrator.clone());
    tokio::time::sleep(Duration::from_millis(200)).await;
    worker.abort();

    assert_eq!(h.available(PEN).await, 4);
    let detail = h
        .orchestrator
        .order_detail(placed.order_id, ALICE)
        .await
        .unwrap();
    assert_eq!(detail.order.status, OrderStatus::TradeClosed);
}
