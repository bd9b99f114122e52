//! Inventory service client over the HTTP/JSON boundary.

use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;
use inventory::rpc::{RpcError, SetStockRequest, StockLinesRequest};
use inventory::{InventoryError, InventoryService, StockLine, StockRecord};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

/// [`InventoryService`] backed by a remote inventory service.
///
/// Transport failures and timeouts surface as [`InventoryError::Unavailable`],
/// which callers treat as retryable. Error bodies are decoded back into the
/// variant the server reported.
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    base_url: String,
    http: Client,
}

impl HttpInventoryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, InventoryError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InventoryError::Unavailable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, InventoryError> {
        let response = request
            .send()
            .await
            .map_err(|e| InventoryError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<RpcError>(&text) {
            Ok(rpc) => Err(rpc.into()),
            Err(_) if status == StatusCode::SERVICE_UNAVAILABLE => Err(
                InventoryError::Unavailable(format!("inventory returned {status}: {text}")),
            ),
            Err(_) => Err(InventoryError::Internal(format!(
                "inventory returned {status}: {text}"
            ))),
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, InventoryError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| InventoryError::Internal(format!("malformed inventory response: {e}")))
    }
}

#[async_trait]
impl InventoryService for HttpInventoryClient {
    async fn set_stock(&self, product_id: ProductId, units: i32) -> Result<StockRecord, InventoryError> {
        let request = self
            .http
            .put(self.url(&format!("/inventory/{product_id}")))
            .json(&SetStockRequest { units });
        self.send_json(request).await
    }

    async fn stock_detail(&self, product_id: ProductId) -> Result<StockRecord, InventoryError> {
        let request = self.http.get(self.url(&format!("/inventory/{product_id}")));
        self.send_json(request).await
    }

    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    async fn reserve(&self, items: &[StockLine]) -> Result<(), InventoryError> {
        let request = self.http.post(self.url("/inventory/reserve")).json(&StockLinesRequest {
            items: items.to_vec(),
        });
        self.send(request).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    async fn release(&self, items: &[StockLine]) -> Result<(), InventoryError> {
        let request = self.http.post(self.url("/inventory/release")).json(&StockLinesRequest {
            items: items.to_vec(),
        });
        self.send(request).await?;
        Ok(())
    }
}
