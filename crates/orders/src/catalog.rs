//! Batch price and name lookup against the catalog service.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{Money, ProductId};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Catalog data for one product at lookup time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ProductId,
    pub name: String,
    #[serde(rename = "price_cents")]
    pub price: Money,
    #[serde(default)]
    pub image: String,
}

/// Read-only product lookup.
///
/// Products missing from the answer are simply absent; callers decide what
/// absence means.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn batch_get(&self, ids: &[ProductId]) -> Result<Vec<CatalogItem>, CatalogError>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    items: HashMap<ProductId, CatalogItem>,
    unavailable: bool,
}

/// In-memory catalog for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub fn insert(&self, id: ProductId, name: impl Into<String>, price: Money) {
        let item = CatalogItem {
            id,
            name: name.into(),
            price,
            image: String::new(),
        };
        self.write().items.insert(id, item);
    }

    /// Changes the price of a listed product.
    pub fn set_price(&self, id: ProductId, price: Money) {
        if let Some(item) = self.write().items.get_mut(&id) {
            item.price = price;
        }
    }

    /// Makes every lookup fail as if the catalog were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryCatalogState> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl CatalogLookup for InMemoryCatalog {
    async fn batch_get(&self, ids: &[ProductId]) -> Result<Vec<CatalogItem>, CatalogError> {
        let state = self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.unavailable {
            return Err(CatalogError::Unavailable("catalog offline".to_string()));
        }
        Ok(ids
            .iter()
            .filter_map(|id| state.items.get(id).cloned())
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    ids: &'a [ProductId],
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    data: Vec<CatalogItem>,
}

/// Catalog client over HTTP: `POST {base_url}/goods/batch`.
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    base_url: String,
    http: Client,
}

impl HttpCatalogClient {
    /// Creates a client whose requests give up after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CatalogError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl CatalogLookup for HttpCatalogClient {
    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    async fn batch_get(&self, ids: &[ProductId]) -> Result<Vec<CatalogItem>, CatalogError> {
        let url = format!("{}/goods/batch", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&BatchRequest { ids })
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CatalogError::Unavailable(format!(
                "batch lookup failed with status {status}: {text}"
            )));
        }

        let parsed: BatchResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Unavailable(format!("malformed catalog response: {e}")))?;
        Ok(parsed.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_products_are_absent() {
        let catalog = InMemoryCatalog::new();
        catalog.insert(ProductId::new(1), "Widget", Money::from_cents(1250));

        let items = catalog
            .batch_get(&[ProductId::new(1), ProductId::new(2)])
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price, Money::from_cents(1250));
    }

    #[tokio::test]
    async fn test_unavailable_catalog() {
        let catalog = InMemoryCatalog::new();
        catalog.set_unavailable(true);
        let result = catalog.batch_get(&[ProductId::new(1)]).await;
        assert!(matches!(result, Err(CatalogError::Unavailable(_))));
    }

    #[test]
    fn test_item_wire_shape() {
        let item: CatalogItem = serde_json::from_value(serde_json::json!({
            "id": 3,
            "name": "Gadget",
            "price_cents": 999,
            "image": "g.png"
        }))
        .unwrap();
        assert_eq!(item.id, ProductId::new(3));
        assert_eq!(item.price, Money::from_cents(999));
    }
}
