//! Product catalog.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{Product, ProductPatch};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::messaging::EventPublisher;
use crate::repository::{ProductQuery, RepoError, Store};
use crate::{Result, ShopError};

pub const DEFAULT_PAGE_SIZE: u64 = 2;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
    pub total_items: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

impl Pagination {
    fn new(page: u64, limit: u64, total_items: u64, keyword: Option<String>) -> Self {
        let total_pages = total_items.div_ceil(limit).max(1);
        Self {
            page,
            limit,
            total_pages,
            total_items,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
            keyword,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub pagination: Pagination,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Store,
    events: EventPublisher,
}

fn duplicate_sku(err: RepoError) -> ShopError {
    match err {
        RepoError::Conflict { .. } => ShopError::AlreadyExists("a product with this SKU already exists".into()),
        other => other.into(),
    }
}

fn not_found() -> ShopError {
    ShopError::NotFound("product not found".into())
}

impl CatalogService {
    pub fn new(store: Store, events: EventPublisher) -> Self {
        Self { store, events }
    }

    /// Newest first. `page` and `limit` below 1 are raised to 1; `limit` is
    /// capped at [`MAX_PAGE_SIZE`]. A blank keyword means no filter.
    pub async fn list(&self, page: Option<u64>, limit: Option<u64>, keyword: Option<String>) -> Result<ProductPage> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let keyword = keyword.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());

        let query = ProductQuery {
            keyword: keyword.clone(),
            offset: (page - 1).saturating_mul(limit),
            limit,
        };
        let (products, total) = self.store.products.list(&query).await?;
        Ok(ProductPage { products, pagination: Pagination::new(page, limit, total, keyword) })
    }

    pub async fn get(&self, id: Uuid) -> Result<Product> {
        self.store.products.get(id).await?.ok_or_else(not_found)
    }

    #[tracing::instrument(skip(self, product), fields(sku = %product.sku))]
    pub async fn create(&self, product: Product) -> Result<Product> {
        let product = self.store.products.insert(product).await.map_err(duplicate_sku)?;
        tracing::info!(product_id = %product.id, "product created");
        self.events
            .publish(DomainEvent::Product(ProductEvent::Created { product_id: product.id, sku: product.sku.clone() }))
            .await;
        Ok(product)
    }

    pub async fn update(&self, id: Uuid, patch: ProductPatch) -> Result<Product> {
        self.store.products.update(id, patch).await.map_err(duplicate_sku)?.ok_or_else(not_found)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<Product> {
        let product = self.store.products.delete(id).await?.ok_or_else(not_found)?;
        tracing::info!(sku = %product.sku, "product deleted");
        self.events
            .publish(DomainEvent::Product(ProductEvent::Deleted { product_id: product.id, sku: product.sku.clone() }))
            .await;
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_bounds() {
        let p = Pagination::new(1, 2, 5, None);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next_page);
        assert!(!p.has_prev_page);

        let empty = Pagination::new(1, 2, 0, None);
        assert_eq!(empty.total_pages, 1);
        assert!(!empty.has_next_page);

        let last = Pagination::new(3, 2, 5, Some("tee".into()));
        assert!(!last.has_next_page);
        assert!(last.has_prev_page);
    }
}
