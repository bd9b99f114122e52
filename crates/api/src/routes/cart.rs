//! Shopping cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use orders::CartLine;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::CurrentUser;
use crate::routes::orders::OrderState;

#[derive(Debug, Deserialize)]
pub struct AddLineRequest {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLineRequest {
    #[serde(default)]
    pub quantity: Option<i32>,
    pub checked: bool,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub total: usize,
    pub items: Vec<CartLine>,
}

/// GET /shopcarts
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<OrderState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<CartResponse>, ApiError> {
    let items = state.carts.list(user_id).await?;
    Ok(Json(CartResponse {
        total: items.len(),
        items,
    }))
}

/// POST /shopcarts: add units of a product, merging into an existing line.
#[tracing::instrument(skip(state, req), fields(product_id = req.product_id))]
pub async fn add(
    State(state): State<Arc<OrderState>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<AddLineRequest>,
) -> Result<(StatusCode, Json<CartLine>), ApiError> {
    let line = state
        .carts
        .add(user_id, ProductId::new(req.product_id), req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(line)))
}

/// PATCH /shopcarts/{product_id}: set the checked flag and optionally the quantity.
#[tracing::instrument(skip(state, req))]
pub async fn update(
    State(state): State<Arc<OrderState>>,
    CurrentUser(user_id): CurrentUser,
    Path(product_id): Path<i64>,
    Json(req): Json<UpdateLineRequest>,
) -> Result<Json<CartLine>, ApiError> {
    let line = state
        .carts
        .update(user_id, ProductId::new(product_id), req.quantity, req.checked)
        .await?;
    Ok(Json(line))
}

/// DELETE /shopcarts/{product_id}
#[tracing::instrument(skip(state))]
pub async fn remove(
    State(state): State<Arc<OrderState>>,
    CurrentUser(user_id): CurrentUser,
    Path(product_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .carts
        .remove(user_id, ProductId::new(product_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
