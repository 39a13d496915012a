//! Shopping carts and post-checkout reconciliation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartItemPatch, CartStatus, Product, MAX_UNIT_PRICE};
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::value_objects::{ProductCategory, Sku};
use crate::messaging::EventPublisher;
use crate::repository::{RepoError, Store};
use crate::{Result, ShopError};

/// Catalog fields shown next to a cart line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    pub image: String,
    pub sku: Sku,
    pub category: ProductCategory,
}

impl From<&Product> for ProductSummary {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            price: p.price,
            image: p.image.clone(),
            sku: p.sku.clone(),
            category: p.category,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: u32,
    pub price_snapshot: i64,
    pub checked: bool,
    pub line_total: i64,
    /// `None` once the product has left the catalog.
    pub product: Option<ProductSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMeta {
    pub total_quantity: u64,
    /// Over every line, checked or not.
    pub total_amount: i64,
    pub checked_amount: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartLine>,
    pub status: CartStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub meta: CartMeta,
}

#[derive(Clone)]
pub struct CartService {
    store: Store,
    events: EventPublisher,
}

fn line_missing(err: RepoError) -> ShopError {
    match err {
        RepoError::NotFound => ShopError::NotFound("this product is not in the cart".into()),
        other => other.into(),
    }
}

impl CartService {
    pub fn new(store: Store, events: EventPublisher) -> Self {
        Self { store, events }
    }

    pub async fn get(&self, user_id: Uuid) -> Result<CartView> {
        let cart = self.store.carts.get_or_create(user_id).await?;
        self.view(cart).await
    }

    /// Adds `quantity` of a catalog product, merging into an existing line.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: u32,
        price_snapshot: Option<i64>,
        checked: Option<bool>,
    ) -> Result<CartView> {
        if quantity == 0 {
            return Err(ShopError::invalid("quantity must be at least 1"));
        }
        check_snapshot(price_snapshot)?;
        let product = self
            .store
            .products
            .get(product_id)
            .await?
            .ok_or_else(|| ShopError::NotFound("product not found".into()))?;
        let cart = self
            .store
            .carts
            .add_item(user_id, product_id, quantity, price_snapshot, checked, product.price)
            .await?;
        self.view(cart).await
    }

    pub async fn update_item(&self, user_id: Uuid, product_id: Uuid, patch: CartItemPatch) -> Result<CartView> {
        check_snapshot(patch.price_snapshot)?;
        let cart = self.store.carts.update_item(user_id, product_id, patch).await.map_err(line_missing)?;
        self.view(cart).await
    }

    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> Result<CartView> {
        let cart = self.store.carts.remove_item(user_id, product_id).await.map_err(line_missing)?;
        self.view(cart).await
    }

    pub async fn clear(&self, user_id: Uuid) -> Result<CartView> {
        let cart = self.store.carts.clear(user_id).await?;
        self.view(cart).await
    }

    /// Pulls purchased products out of the buyer's cart. References that are
    /// not product ids are skipped; with nothing left to match this is a no-op.
    /// Running it twice removes nothing the second time.
    #[tracing::instrument(skip(self, product_refs))]
    pub async fn reconcile(&self, user_id: Option<Uuid>, product_refs: &[String]) -> Result<u64> {
        let Some(user_id) = user_id else { return Ok(0) };
        let ids: Vec<Uuid> = product_refs.iter().filter_map(|r| Uuid::parse_str(r.trim()).ok()).collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = self.store.carts.remove_products(user_id, &ids).await?;
        tracing::debug!(removed, "cart reconciled");
        self.events
            .publish(DomainEvent::Cart(CartEvent::Reconciled { user_id, removed_items: removed }))
            .await;
        Ok(removed)
    }

    async fn view(&self, cart: Cart) -> Result<CartView> {
        let ids: Vec<Uuid> = cart.items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, Product> = if ids.is_empty() {
            HashMap::new()
        } else {
            self.store.products.find_many(&ids).await?.into_iter().map(|p| (p.id, p)).collect()
        };

        let meta = CartMeta {
            total_quantity: cart.total_quantity(),
            total_amount: cart.total_amount(),
            checked_amount: cart.checked_amount(),
        };
        let items = cart
            .items
            .iter()
            .map(|item| CartLine {
                product_id: item.product_id,
                quantity: item.quantity,
                price_snapshot: item.price_snapshot,
                checked: item.checked,
                line_total: item.line_total(),
                product: products.get(&item.product_id).map(ProductSummary::from),
            })
            .collect();

        Ok(CartView {
            id: cart.id,
            user_id: cart.user_id,
            items,
            status: cart.status,
            memo: cart.memo,
            created_at: cart.created_at,
            updated_at: cart.updated_at,
            meta,
        })
    }
}

fn check_snapshot(price_snapshot: Option<i64>) -> Result<()> {
    match price_snapshot {
        Some(price) if !(0..=MAX_UNIT_PRICE).contains(&price) => {
            Err(ShopError::invalid(format!("priceSnapshot must be between 0 and {MAX_UNIT_PRICE}")))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Product;

    fn service() -> (CartService, Store) {
        let store = Store::memory();
        (CartService::new(store.clone(), EventPublisher::disabled()), store)
    }

    async fn seed(store: &Store, sku: &str, price: i64) -> Product {
        let product = Product::create(Sku::new(sku).unwrap(), sku, price, ProductCategory::Tops, "/img.png", None);
        store.products.insert(product).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_merges_and_totals() {
        let (carts, store) = service();
        let user = Uuid::new_v4();
        let tee = seed(&store, "TEE", 10_000).await;
        carts.add_item(user, tee.id, 2, None, None).await.unwrap();
        let view = carts.add_item(user, tee.id, 3, None, Some(false)).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].quantity, 5);
        assert_eq!(view.items[0].product.as_ref().unwrap().name, "TEE");
        assert_eq!(view.meta, CartMeta { total_quantity: 5, total_amount: 50_000, checked_amount: 0 });
    }

    #[tokio::test]
    async fn test_add_unknown_product() {
        let (carts, _) = service();
        let err = carts.add_item(Uuid::new_v4(), Uuid::new_v4(), 1, None, None).await.unwrap_err();
        assert!(matches!(err, ShopError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reconcile_skips_malformed_refs() {
        let (carts, store) = service();
        let user = Uuid::new_v4();
        let tee = seed(&store, "TEE", 10_000).await;
        let cap = seed(&store, "CAP", 5_000).await;
        carts.add_item(user, tee.id, 1, None, None).await.unwrap();
        carts.add_item(user, cap.id, 1, None, None).await.unwrap();

        let refs = vec![tee.id.to_string(), "not-a-product".to_string()];
        assert_eq!(carts.reconcile(Some(user), &refs).await.unwrap(), 1);
        assert_eq!(carts.reconcile(Some(user), &refs).await.unwrap(), 0);
        assert_eq!(carts.reconcile(None, &refs).await.unwrap(), 0);
        assert_eq!(carts.reconcile(Some(user), &["junk".to_string()]).await.unwrap(), 0);

        let view = carts.get(user).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].product_id, cap.id);
    }
}
