//! JSON shapes of the inventory service's network boundary.
//!
//! `reserve` and `release` are the saga's compensation point, so these types
//! are shared by the server routes and the client used by the order service.

use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, LockError};
use crate::model::StockLine;

/// Body of `POST /inventory/reserve` and `POST /inventory/release`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLinesRequest {
    pub items: Vec<StockLine>,
}

/// Body of `PUT /inventory/{product_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStockRequest {
    pub units: i32,
}

/// Machine-readable failure category carried by [`RpcError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientStock,
    RecordNotFound,
    LockUnavailable,
    InvalidQuantity,
    Internal,
}

/// Error body returned by every failing inventory endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<i32>,
}

impl RpcError {
    fn new(kind: ErrorKind, err: &InventoryError) -> Self {
        Self {
            error: err.to_string(),
            kind,
            product_id: None,
            requested: None,
            available: None,
        }
    }
}

impl From<&InventoryError> for RpcError {
    fn from(err: &InventoryError) -> Self {
        match err {
            InventoryError::InsufficientStock {
                product_id,
                requested,
                available,
            } => Self {
                product_id: Some(*product_id),
                requested: Some(*requested),
                available: Some(*available),
                ..Self::new(ErrorKind::InsufficientStock, err)
            },
            InventoryError::RecordNotFound(product_id) => Self {
                product_id: Some(*product_id),
                ..Self::new(ErrorKind::RecordNotFound, err)
            },
            InventoryError::InvalidQuantity {
                product_id,
                quantity,
            } => Self {
                product_id: Some(*product_id),
                requested: Some(*quantity),
                ..Self::new(ErrorKind::InvalidQuantity, err)
            },
            InventoryError::InvalidStockLevel { product_id, .. } => Self {
                product_id: Some(*product_id),
                ..Self::new(ErrorKind::InvalidQuantity, err)
            },
            InventoryError::LockUnavailable(_) | InventoryError::Unavailable(_) => {
                Self::new(ErrorKind::LockUnavailable, err)
            }
            InventoryError::Internal(_) | InventoryError::Storage(_) => {
                Self::new(ErrorKind::Internal, err)
            }
        }
    }
}

impl From<RpcError> for InventoryError {
    /// Rebuilds the typed error on the calling side.
    ///
    /// Fields missing from a malformed body degrade to `Internal` rather than
    /// inventing a product id.
    fn from(rpc: RpcError) -> Self {
        match (rpc.kind, rpc.product_id) {
            (ErrorKind::InsufficientStock, Some(product_id)) => InventoryError::InsufficientStock {
                product_id,
                requested: rpc.requested.unwrap_or_default(),
                available: rpc.available.unwrap_or_default(),
            },
            (ErrorKind::RecordNotFound, Some(product_id)) => {
                InventoryError::RecordNotFound(product_id)
            }
            (ErrorKind::InvalidQuantity, Some(product_id)) => InventoryError::InvalidQuantity {
                product_id,
                quantity: rpc.requested.unwrap_or_default(),
            },
            (ErrorKind::LockUnavailable, _) => {
                InventoryError::LockUnavailable(LockError::Unavailable(rpc.error))
            }
            _ => InventoryError::Internal(rpc.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_body() {
        let err = InventoryError::InsufficientStock {
            product_id: ProductId::new(3),
            requested: 4,
            available: 1,
        };
        let body = serde_json::to_value(RpcError::from(&err)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "error": "Insufficient stock for product 3: requested 4, available 1",
                "kind": "insufficient_stock",
                "product_id": 3,
                "requested": 4,
                "available": 1,
            })
        );
    }

    #[test]
    fn test_errors_survive_the_wire() {
        let original = InventoryError::InsufficientStock {
            product_id: ProductId::new(3),
            requested: 4,
            available: 1,
        };
        let body = serde_json::to_string(&RpcError::from(&original)).unwrap();
        let decoded: RpcError = serde_json::from_str(&body).unwrap();
        assert!(matches!(
            InventoryError::from(decoded),
            InventoryError::InsufficientStock {
                requested: 4,
                available: 1,
                ..
            }
        ));

        let lock = InventoryError::LockUnavailable(LockError::Unavailable("down".to_string()));
        let decoded = InventoryError::from(RpcError::from(&lock));
        assert!(decoded.is_retryable());
    }

    #[test]
    fn test_malformed_body_degrades_to_internal() {
        let body: RpcError =
            serde_json::from_str(r#"{"error":"boom","kind":"record_not_found"}"#).unwrap();
        assert!(matches!(InventoryError::from(body), InventoryError::Internal(_)));
    }

    #[test]
    fn test_request_wire_shape() {
        let request: StockLinesRequest =
            serde_json::from_str(r#"{"items":[{"product_id":1,"quantity":2}]}"#).unwrap();
        assert_eq!(request.items, vec![StockLine::new(ProductId::new(1), 2)]);
    }
}
