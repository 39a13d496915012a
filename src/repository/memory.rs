//! In-process store used by the test-suite and `STORAGE_BACKEND=memory`.
//!
//! All collections sit behind one `RwLock`; each trait method takes the lock
//! once, so every operation is atomic with respect to the others. The lock is
//! never held across an `.await`.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    CartRepository, OrderFilter, OrderRepository, ProductQuery, ProductRepository, RepoError, RepoResult,
    UserRepository,
};
use crate::domain::aggregates::{
    Cart, CartItemPatch, Order, Product, ProductPatch, StatusChange, User, UserPatch,
};
use crate::domain::value_objects::{Email, Sku};

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    products: HashMap<Uuid, Product>,
    carts: HashMap<Uuid, Cart>,
    orders: Vec<Order>,
}

fn conflict(key: &str) -> RepoError {
    RepoError::Conflict { key: key.to_string() }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn list(&self) -> RepoResult<Vec<User>> {
        let mut users: Vec<User> = self.tables.read().users.values().cloned().collect();
        users.sort_by_key(|u| (u.created_at, u.id));
        Ok(users)
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[Uuid]) -> RepoResult<Vec<User>> {
        let tables = self.tables.read();
        Ok(ids.iter().filter_map(|id| tables.users.get(id).cloned()).collect())
    }

    async fn find_by_email(&self, email: &Email) -> RepoResult<Option<User>> {
        Ok(self.tables.read().users.values().find(|u| &u.email == email).cloned())
    }

    async fn insert(&self, user: User) -> RepoResult<User> {
        let mut tables = self.tables.write();
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(conflict("users.email"));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> RepoResult<Option<User>> {
        let mut tables = self.tables.write();
        if let Some(email) = &patch.email {
            if tables.users.values().any(|u| &u.email == email && u.id != id) {
                return Err(conflict("users.email"));
            }
        }
        Ok(tables.users.get_mut(&id).map(|user| {
            user.apply(patch);
            user.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> RepoResult<Option<User>> {
        let mut tables = self.tables.write();
        tables.carts.remove(&id);
        Ok(tables.users.remove(&id))
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn list(&self, query: &ProductQuery) -> RepoResult<(Vec<Product>, u64)> {
        let tables = self.tables.read();
        let mut matches: Vec<&Product> = tables
            .products
            .values()
            .filter(|p| query.keyword.as_deref().map_or(true, |k| p.matches_keyword(k)))
            .collect();
        matches.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        let total = matches.len() as u64;
        let page = matches
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Product>> {
        Ok(self.tables.read().products.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[Uuid]) -> RepoResult<Vec<Product>> {
        let tables = self.tables.read();
        Ok(ids.iter().filter_map(|id| tables.products.get(id).cloned()).collect())
    }

    async fn find_by_sku(&self, sku: &Sku) -> RepoResult<Option<Product>> {
        Ok(self.tables.read().products.values().find(|p| &p.sku == sku).cloned())
    }

    async fn insert(&self, product: Product) -> RepoResult<Product> {
        let mut tables = self.tables.write();
        if tables.products.values().any(|p| p.sku == product.sku) {
            return Err(conflict("products.sku"));
        }
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update(&self, id: Uuid, patch: ProductPatch) -> RepoResult<Option<Product>> {
        let mut tables = self.tables.write();
        if let Some(sku) = &patch.sku {
            if tables.products.values().any(|p| &p.sku == sku && p.id != id) {
                return Err(conflict("products.sku"));
            }
        }
        Ok(tables.products.get_mut(&id).map(|product| {
            product.apply(patch);
            product.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> RepoResult<Option<Product>> {
        Ok(self.tables.write().products.remove(&id))
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn get_or_create(&self, user_id: Uuid) -> RepoResult<Cart> {
        Ok(self.tables.write().carts.entry(user_id).or_insert_with(|| Cart::new(user_id)).clone())
    }

    async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: u32,
        price_snapshot: Option<i64>,
        checked: Option<bool>,
        catalog_price: i64,
    ) -> RepoResult<Cart> {
        let mut tables = self.tables.write();
        let cart = tables.carts.entry(user_id).or_insert_with(|| Cart::new(user_id));
        cart.add_or_merge(product_id, quantity, price_snapshot, checked, catalog_price);
        Ok(cart.clone())
    }

    async fn update_item(&self, user_id: Uuid, product_id: Uuid, patch: CartItemPatch) -> RepoResult<Cart> {
        let mut tables = self.tables.write();
        let cart = tables.carts.entry(user_id).or_insert_with(|| Cart::new(user_id));
        cart.update_item(product_id, &patch).map_err(|_| RepoError::NotFound)?;
        Ok(cart.clone())
    }

    async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> RepoResult<Cart> {
        let mut tables = self.tables.write();
        let cart = tables.carts.entry(user_id).or_insert_with(|| Cart::new(user_id));
        cart.remove_item(product_id).map_err(|_| RepoError::NotFound)?;
        Ok(cart.clone())
    }

    async fn clear(&self, user_id: Uuid) -> RepoResult<Cart> {
        let mut tables = self.tables.write();
        let cart = tables.carts.entry(user_id).or_insert_with(|| Cart::new(user_id));
        cart.clear();
        Ok(cart.clone())
    }

    async fn remove_products(&self, user_id: Uuid, product_ids: &[Uuid]) -> RepoResult<u64> {
        let mut tables = self.tables.write();
        Ok(tables.carts.get_mut(&user_id).map_or(0, |cart| cart.remove_products(product_ids) as u64))
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn find_duplicate(&self, order_id: &str, transaction_id: &str) -> RepoResult<Option<Order>> {
        Ok(self
            .tables
            .read()
            .orders
            .iter()
            .find(|o| o.order_id == order_id || o.payment.transaction_id == transaction_id)
            .cloned())
    }

    async fn insert(&self, order: Order) -> RepoResult<Order> {
        let mut tables = self.tables.write();
        if tables.orders.iter().any(|o| o.order_id == order.order_id) {
            return Err(conflict("orders.order_id"));
        }
        if tables.orders.iter().any(|o| o.payment.transaction_id == order.payment.transaction_id) {
            return Err(conflict("orders.payment_transaction_id"));
        }
        tables.orders.push(order.clone());
        Ok(order)
    }

    async fn find(&self, id: &str) -> RepoResult<Option<Order>> {
        let tables = self.tables.read();
        Ok(locate(&tables.orders, id).map(|idx| tables.orders[idx].clone()))
    }

    async fn list(&self, filter: &OrderFilter) -> RepoResult<Vec<Order>> {
        let tables = self.tables.read();
        let mut orders: Vec<Order> = tables
            .orders
            .iter()
            .filter(|o| filter.user_id.map_or(true, |u| o.user_id == Some(u)))
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| (b.order_date, b.id).cmp(&(a.order_date, a.id)));
        Ok(orders)
    }

    async fn update_status(&self, id: &str, change: &StatusChange) -> RepoResult<Option<Order>> {
        let mut tables = self.tables.write();
        Ok(locate(&tables.orders, id).map(|idx| {
            let order = &mut tables.orders[idx];
            order.apply_status(change);
            order.clone()
        }))
    }
}

/// Business order id first, internal id second.
fn locate(orders: &[Order], id: &str) -> Option<usize> {
    orders.iter().position(|o| o.order_id == id).or_else(|| {
        Uuid::parse_str(id).ok().and_then(|uuid| orders.iter().position(|o| o.id == uuid))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderDraft, OrderStatus, PaymentRecord};

    fn order(order_id: &str, tx: &str) -> Order {
        let draft = OrderDraft { order_id: order_id.into(), ..OrderDraft::default() };
        let payment = PaymentRecord { method: "card".into(), amount: 100, paid_at: None, transaction_id: tx.into() };
        Order::place(draft, payment, true, "system")
    }

    #[tokio::test]
    async fn test_order_unique_keys() {
        let store = MemoryStore::default();
        OrderRepository::insert(&store, order("o-1", "imp_1")).await.unwrap();
        assert!(matches!(OrderRepository::insert(&store, order("o-1", "imp_2")).await, Err(RepoError::Conflict { .. })));
        assert!(matches!(OrderRepository::insert(&store, order("o-2", "imp_1")).await, Err(RepoError::Conflict { .. })));
        assert!(store.find_duplicate("o-9", "imp_1").await.unwrap().is_some());
        assert!(store.find_duplicate("o-9", "imp_9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_internal_id_fallback() {
        let store = MemoryStore::default();
        let placed = OrderRepository::insert(&store, order("o-1", "imp_1")).await.unwrap();
        let found = store.find(&placed.id.to_string()).await.unwrap().unwrap();
        assert_eq!(found.order_id, "o-1");
        let changed = store
            .update_status(&placed.id.to_string(), &StatusChange::new(OrderStatus::Shipped, "admin", None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(changed.history.len(), 2);
        assert!(store.find("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_products_without_cart_is_noop() {
        let store = MemoryStore::default();
        assert_eq!(store.remove_products(Uuid::new_v4(), &[Uuid::new_v4()]).await.unwrap(), 0);
    }
}
