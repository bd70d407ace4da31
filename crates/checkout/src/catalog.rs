//! Product catalog lookups used to reject checkouts of unknown products.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised by a catalog lookup.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// The catalog does not know the product.
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    /// The catalog could not be reached or answered with an error.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    /// The client could not be constructed.
    #[error("Catalog client error: {0}")]
    Client(String),
}

/// Product metadata returned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: ProductId,
    pub name: String,
    pub price: Option<f64>,
}

impl ProductInfo {
    pub fn new(id: ProductId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            price: None,
        }
    }
}

/// Synchronous product lookup.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, product_id: ProductId) -> Result<ProductInfo, CatalogError>;
}

/// Wire shape of a catalog product; every field is optional.
#[derive(Debug, Deserialize)]
struct ProductPayload {
    id: Option<ProductId>,
    name: Option<String>,
    price: Option<f64>,
}

/// Catalog client calling `GET {base_url}/v1/products/{id}`.
#[derive(Debug, Clone)]
pub struct HttpProductCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProductCatalog {
    /// Creates a client with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ProductCatalog for HttpProductCatalog {
    #[tracing::instrument(skip(self))]
    async fn get_product(&self, product_id: ProductId) -> Result<ProductInfo, CatalogError> {
        let url = format!("{}/v1/products/{}", self.base_url, product_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(product_id));
        }
        if !status.is_success() {
            tracing::warn!(%status, %product_id, "Catalog returned an error status");
            return Err(CatalogError::Unavailable(format!(
                "catalog returned {status} for product {product_id}"
            )));
        }

        let payload: ProductPayload = response
            .json()
            .await
            .map_err(|e| CatalogError::Unavailable(format!("invalid product payload: {e}")))?;

        Ok(ProductInfo {
            id: payload.id.unwrap_or(product_id),
            name: payload.name.unwrap_or_default(),
            price: payload.price,
        })
    }
}

/// In-memory catalog for testing.
#[derive(Clone, Default)]
pub struct InMemoryProductCatalog {
    products: Arc<RwLock<HashMap<ProductId, ProductInfo>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog knowing the given product ids.
    pub fn with_products(ids: impl IntoIterator<Item = i64>) -> Self {
        let products = ids
            .into_iter()
            .map(|id| {
                let id = ProductId::new(id);
                (id, ProductInfo::new(id, format!("product-{id}")))
            })
            .collect();

        Self {
            products: Arc::new(RwLock::new(products)),
            unavailable: Arc::default(),
        }
    }

    pub async fn insert(&self, product: ProductInfo) {
        self.products.write().await.insert(product.id, product);
    }

    /// Makes every lookup fail as if the catalog were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn get_product(&self, product_id: ProductId) -> Result<ProductInfo, CatalogError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("catalog is down".to_string()));
        }
        self.products
            .read()
            .await
            .get(&product_id)
            .cloned()
            .ok_or(CatalogError::NotFound(product_id))
    }
}
