//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::rpc::{ErrorKind, RpcError};
use inventory::{InventoryError, LockError};
use orders::{CatalogError, CheckoutError, Compensation, StoreError};
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// The caller did not identify itself.
    Unauthorized(String),
    /// Resource not found.
    NotFound(String),
    /// Inventory error; rendered as an [`RpcError`] body.
    Inventory(InventoryError),
    /// Checkout or order lifecycle error.
    Checkout(CheckoutError),
    /// Cart or order store error.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, msg, None),
            ApiError::Unauthorized(msg) => json_error(StatusCode::UNAUTHORIZED, msg, None),
            ApiError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, msg, None),
            ApiError::Inventory(err) => inventory_error_to_response(&err),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Store(err) => {
                let status = store_status(&err);
                json_error(status, err.to_string(), None)
            }
        }
    }
}

fn json_error(status: StatusCode, message: String, compensation: Option<Compensation>) -> Response {
    if status.is_server_error() {
        tracing::error!(error = %message, "request failed");
    }
    let body = match compensation {
        Some(compensation) => serde_json::json!({
            "error": message,
            "compensation": compensation.as_str(),
        }),
        None => serde_json::json!({ "error": message }),
    };
    (status, axum::Json(body)).into_response()
}

fn inventory_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidQuantity => StatusCode::BAD_REQUEST,
        ErrorKind::RecordNotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientStock => StatusCode::CONFLICT,
        ErrorKind::LockUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn inventory_error_to_response(err: &InventoryError) -> Response {
    let body = RpcError::from(err);
    let status = inventory_status(body.kind);
    if status.is_server_error() {
        tracing::warn!(error = %err, "inventory request failed");
    }
    (status, axum::Json(body)).into_response()
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
        StoreError::CartLineNotFound(_) | StoreError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::CartChanged { .. } | StoreError::DuplicateOrderNumber(_) => {
            StatusCode::CONFLICT
        }
        StoreError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Aborted(_) | StoreError::Corrupt(_) | StoreError::Database(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn checkout_error_to_response(err: CheckoutError) -> Response {
    let status = match &err {
        CheckoutError::NothingToCheckout | CheckoutError::InvalidRequest(_) => {
            StatusCode::BAD_REQUEST
        }
        CheckoutError::ProductUnavailable(CatalogError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CheckoutError::ProductUnavailable(_) | CheckoutError::OrderNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        CheckoutError::DependencyUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        CheckoutError::Inventory(e) => inventory_status(RpcError::from(e).kind),
        CheckoutError::Persistence { .. } | CheckoutError::StockNotReturned { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        CheckoutError::Store(e) => store_status(e),
    };
    let compensation = match err.compensation() {
        Compensation::NotRequired => None,
        reported => Some(reported),
    };
    json_error(status, err.to_string(), compensation)
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

/// Failures while wiring a service together at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Lock provider unavailable: {0}")]
    Lock(#[from] LockError),

    #[error("Inventory client setup failed: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Catalog client setup failed: {0}")]
    Catalog(#[from] CatalogError),
}
