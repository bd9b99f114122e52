//! The order service checking out against a real inventory server and a stub
//! catalog, both bound to ephemeral ports.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use common::ProductId;
use inventory::{InventoryError, InventoryService};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{
    CheckoutSettings, HttpCatalogClient, HttpInventoryClient, InMemoryOrderStore, StoreError,
};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| api::server::install_metrics().unwrap())
        .clone()
}

async fn spawn_server(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Answers `POST /goods/batch` for products 1 and 2 only.
async fn goods_batch(Json(req): Json<serde_json::Value>) -> Json<serde_json::Value> {
    let known = [
        serde_json::json!({ "id": 1, "name": "Kettle", "price_cents": 3200, "image": "kettle.png" }),
        serde_json::json!({ "id": 2, "name": "Teapot", "price_cents": 2100 }),
    ];
    let ids: Vec<i64> = req["ids"]
        .as_array()
        .map(|ids| ids.iter().filter_map(|id| id.as_i64()).collect())
        .unwrap_or_default();
    let data: Vec<serde_json::Value> = known
        .into_iter()
        .filter(|item| item["id"].as_i64().is_some_and(|id| ids.contains(&id)))
        .collect();
    Json(serde_json::json!({ "data": data }))
}

struct Cluster {
    orders_app: axum::Router,
    store: InMemoryOrderStore,
    inventory: HttpInventoryClient,
}

async fn start() -> Cluster {
    let service = api::bootstrap::build_inventory_service(&api::config::Config::default())
        .await
        .unwrap();
    let inventory_url = spawn_server(api::create_inventory_app(service, get_metrics_handle())).await;
    let catalog_url = spawn_server(axum::Router::new().route("/goods/batch", post(goods_batch))).await;

    let inventory = HttpInventoryClient::new(inventory_url, Duration::from_secs(2)).unwrap();
    let catalog = HttpCatalogClient::new(catalog_url, Duration::from_secs(2)).unwrap();
    let store = InMemoryOrderStore::new();

    let state = api::bootstrap::order_state(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(catalog),
        Arc::new(inventory.clone()),
        CheckoutSettings::default(),
    );
    Cluster {
        orders_app: api::create_order_app(Arc::new(state), get_metrics_handle()),
        store,
        inventory,
    }
}

impl Cluster {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", "42")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.orders_app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn cart(&self, product_id: i64, quantity: i32, checked: bool) {
        self.send(
            "POST",
            "/shopcarts",
            serde_json::json!({ "product_id": product_id, "quantity": quantity }),
        )
        .await;
        self.send(
            "PATCH",
            &format!("/shopcarts/{product_id}"),
            serde_json::json!({ "checked": checked }),
        )
        .await;
    }

    async fn available(&self, product_id: i64) -> i32 {
        self.inventory
            .stock_detail(ProductId::new(product_id))
            .await
            .unwrap()
            .available_units
    }
}

fn shipping() -> serde_json::Value {
    serde_json::json!({
        "address": "3 Mill Lane",
        "recipient_name": "Noor",
        "recipient_phone": "555-0142"
    })
}

#[tokio::test]
async fn test_checkout_over_http() {
    let cluster = start().await;
    cluster.inventory.set_stock(ProductId::new(1), 10).await.unwrap();
    cluster.inventory.set_stock(ProductId::new(2), 10).await.unwrap();
    cluster.cart(1, 2, true).await;
    cluster.cart(2, 1, false).await;

    let (status, placed) = cluster.send("POST", "/orders", shipping()).await;

    assert_eq!(status, StatusCode::CREATED, "{placed}");
    assert_eq!(placed["total"], 6400);
    assert_eq!(cluster.available(1).await, 8);
    assert_eq!(cluster.available(2).await, 10);

    let (_, cart) = cluster.send("GET", "/shopcarts", serde_json::Value::Null).await;
    assert_eq!(cart["total"], 1);
    assert_eq!(cart["items"][0]["product_id"], 2);
}

#[tokio::test]
async fn test_remote_insufficient_stock_keeps_its_type() {
    let cluster = start().await;
    cluster.inventory.set_stock(ProductId::new(1), 1).await.unwrap();

    let err = cluster
        .inventory
        .reserve(&[inventory::StockLine::new(ProductId::new(1), 3)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InventoryError::InsufficientStock {
            requested: 3,
            available: 1,
            ..
        }
    ));

    cluster.cart(1, 3, true).await;
    let (status, body) = cluster.send("POST", "/orders", shipping()).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(cluster.available(1).await, 1);
}

#[tokio::test]
async fn test_product_missing_from_catalog() {
    let cluster = start().await;
    cluster.inventory.set_stock(ProductId::new(3), 10).await.unwrap();
    cluster.cart(3, 1, true).await;

    let (status, _) = cluster.send("POST", "/orders", shipping()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(cluster.available(3).await, 10);
}

#[tokio::test]
async fn test_remote_compensation_restores_stock() {
    let cluster = start().await;
    cluster.inventory.set_stock(ProductId::new(1), 5).await.unwrap();
    cluster.cart(1, 3, true).await;
    cluster
        .store
        .fail_next_place(StoreError::Corrupt("write rejected".to_string()));

    let (status, body) = cluster.send("POST", "/orders", shipping()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["compensation"], "released");
    assert_eq!(cluster.available(1).await, 5);
    assert_eq!(cluster.store.order_count(), 0);
}

#[tokio::test]
async fn test_cancel_returns_stock_over_http() {
    let cluster = start().await;
    cluster.inventory.set_stock(ProductId::new(2), 4).await.unwrap();
    cluster.cart(2, 4, true).await;
    let (_, placed) = cluster.send("POST", "/orders", shipping()).await;
    let number = placed["order_number"].as_str().unwrap().to_string();
    assert_eq!(cluster.available(2).await, 0);

    let (status, body) = cluster
        .send("POST", &format!("/orders/{number}/cancel"), serde_json::Value::Null)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], true);
    assert_eq!(cluster.available(2).await, 4);
}
