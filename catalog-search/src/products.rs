//! Read-only access to the relational product store

use crate::error::{ErrorContext, Result, SearchError};
use crate::types::{Product, ProductId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lookup interface over the authoritative product records
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Fetch one product
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>>;

    /// Every product, ordered by id
    async fn find_all(&self) -> Result<Vec<Product>>;
}

/// In-memory product repository
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductRepository {
    products: Arc<DashMap<ProductId, Product>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryProductRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository holding `products`
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let repository = Self::new();
        for product in products {
            repository.insert(product);
        }
        repository
    }

    /// Load a JSON array of products from disk
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("reading product catalog")?;
        let products: Vec<Product> =
            serde_json::from_str(&content).context("parsing product catalog")?;
        tracing::debug!("Loaded {} products from {}", products.len(), path.display());
        Ok(Self::with_products(products))
    }

    /// Insert or replace a product, returning the previous record
    pub fn insert(&self, product: Product) -> Option<Product> {
        self.products.insert(product.id.clone(), product)
    }

    /// Remove a product
    pub fn remove(&self, id: &ProductId) -> Option<Product> {
        self.products.remove(id).map(|(_, p)| p)
    }

    /// Number of products held
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Whether the repository is empty
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Simulate the database being unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SearchError::Storage(
                "product repository unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>> {
        self.check_available()?;
        Ok(self.products.get(id).map(|p| p.clone()))
    }

    async fn find_all(&self) -> Result<Vec<Product>> {
        self.check_available()?;
        let mut products: Vec<Product> = self.products.iter().map(|p| p.value().clone()).collect();
        products.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(products)
    }
}
