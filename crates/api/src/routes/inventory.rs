//! Inventory RPC endpoints.
//!
//! Failures are answered with an [`inventory::rpc::RpcError`] body so the
//! order service's client can rebuild the typed error.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use inventory::rpc::{SetStockRequest, StockLinesRequest};
use inventory::{InventoryService, StockRecord};

use crate::error::ApiError;

/// Shared state of `inventory-srv`.
pub type InventoryState = Arc<dyn InventoryService>;

/// POST /inventory/reserve: decrement every line or none.
#[tracing::instrument(skip(service, req), fields(lines = req.items.len()))]
pub async fn reserve(
    State(service): State<InventoryState>,
    Json(req): Json<StockLinesRequest>,
) -> Result<StatusCode, ApiError> {
    service.reserve(&req.items).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /inventory/release: increment every line or none.
#[tracing::instrument(skip(service, req), fields(lines = req.items.len()))]
pub async fn release(
    State(service): State<InventoryState>,
    Json(req): Json<StockLinesRequest>,
) -> Result<StatusCode, ApiError> {
    service.release(&req.items).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /inventory/{product_id}: set the absolute stock level.
#[tracing::instrument(skip(service, req))]
pub async fn set_stock(
    State(service): State<InventoryState>,
    Path(product_id): Path<i64>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<StockRecord>, ApiError> {
    let record = service.set_stock(ProductId::new(product_id), req.units).await?;
    Ok(Json(record))
}

/// GET /inventory/{product_id}
#[tracing::instrument(skip(service))]
pub async fn stock_detail(
    State(service): State<InventoryState>,
    Path(product_id): Path<i64>,
) -> Result<Json<StockRecord>, ApiError> {
    let record = service.stock_detail(ProductId::new(product_id)).await?;
    Ok(Json(record))
}
