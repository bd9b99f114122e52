//! Checkout and order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{OrderId, PageRequest};
use orders::{
    CartStore, Order, OrderDetail, OrderOrchestrator, OrderStatus, PlacedOrder, ShippingInfo,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::CurrentUser;

/// Shared state of `order-srv`.
pub struct OrderState {
    pub orchestrator: Arc<OrderOrchestrator>,
    pub carts: Arc<dyn CartStore>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderListResponse {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub items: Vec<Order>,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub order_number: String,
    pub cancelled: bool,
}

// -- Handlers --

/// POST /orders: check out the user's checked cart lines.
#[tracing::instrument(skip(state, shipping))]
pub async fn create(
    State(state): State<Arc<OrderState>>,
    CurrentUser(user_id): CurrentUser,
    Json(shipping): Json<ShippingInfo>,
) -> Result<(StatusCode, Json<PlacedOrder>), ApiError> {
    let placed = state.orchestrator.place_order(user_id, shipping).await?;
    Ok((StatusCode::CREATED, Json(placed)))
}

/// GET /orders?page=&page_size=: the user's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<OrderState>>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let page = PageRequest::new(query.page.unwrap_or(1), query.page_size.unwrap_or(0));
    let result = state.orchestrator.list_orders(user_id, page).await?;
    Ok(Json(OrderListResponse {
        total: result.total,
        page: page.page(),
        page_size: page.page_size(),
        items: result.items,
    }))
}

/// GET /orders/{id}: one of the user's orders with its lines.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<OrderState>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderDetail>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let detail = state.orchestrator.order_detail(order_id, user_id).await?;
    Ok(Json(detail))
}

/// PATCH /orders/{order_number}/status: set by payment and shipment events.
#[tracing::instrument(skip(state, req))]
pub async fn update_status(
    State(state): State<Arc<OrderState>>,
    Path(order_number): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator
        .update_status(&order_number, req.status)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /orders/{order_number}/cancel: close one of the user's unpaid orders
/// and return its stock.
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<OrderState>>,
    CurrentUser(user_id): CurrentUser,
    Path(order_number): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = state
        .orchestrator
        .cancel_order(user_id, &order_number)
        .await?;
    Ok(Json(CancelResponse {
        order_number,
        cancelled,
    }))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    uuid::Uuid::parse_str(id)
        .map(OrderId::from_uuid)
        .map_err(|_| ApiError::NotFound(format!("Order not found: {id}")))
}
