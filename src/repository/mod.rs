//! Persistence seams.
//!
//! Each collection is reached through an object-safe async trait so the
//! services can run against PostgreSQL in production and the in-process
//! store in tests. Implementations must enforce the unique keys themselves
//! (email, SKU, one cart per user, order id, transaction id) and report a
//! violation as [`RepoError::Conflict`]; callers treat that as authoritative.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{
    Cart, CartItemPatch, Order, OrderStatus, Product, ProductPatch, StatusChange, User, UserPatch,
};
use crate::domain::value_objects::{Email, Sku};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum RepoError {
    /// A unique key is already taken; `key` names which one.
    #[error("duplicate value for unique key {key}")]
    Conflict { key: String },
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored record is malformed: {0}")]
    Corrupt(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Clone, Debug, Default)]
pub struct ProductQuery {
    pub keyword: Option<String>,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Clone, Debug, Default)]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn list(&self) -> RepoResult<Vec<User>>;
    async fn get(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn find_many(&self, ids: &[Uuid]) -> RepoResult<Vec<User>>;
    async fn find_by_email(&self, email: &Email) -> RepoResult<Option<User>>;
    async fn insert(&self, user: User) -> RepoResult<User>;
    async fn update(&self, id: Uuid, patch: UserPatch) -> RepoResult<Option<User>>;
    async fn delete(&self, id: Uuid) -> RepoResult<Option<User>>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Newest first, with the total number of matches.
    async fn list(&self, query: &ProductQuery) -> RepoResult<(Vec<Product>, u64)>;
    async fn get(&self, id: Uuid) -> RepoResult<Option<Product>>;
    async fn find_many(&self, ids: &[Uuid]) -> RepoResult<Vec<Product>>;
    async fn find_by_sku(&self, sku: &Sku) -> RepoResult<Option<Product>>;
    async fn insert(&self, product: Product) -> RepoResult<Product>;
    async fn update(&self, id: Uuid, patch: ProductPatch) -> RepoResult<Option<Product>>;
    async fn delete(&self, id: Uuid) -> RepoResult<Option<Product>>;
}

/// Every mutation is a single atomic operation on the buyer's cart and
/// returns the cart as it stands afterwards.
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn get_or_create(&self, user_id: Uuid) -> RepoResult<Cart>;
    async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: u32,
        price_snapshot: Option<i64>,
        checked: Option<bool>,
        catalog_price: i64,
    ) -> RepoResult<Cart>;
    /// [`RepoError::NotFound`] when the cart holds no line for `product_id`.
    async fn update_item(&self, user_id: Uuid, product_id: Uuid, patch: CartItemPatch) -> RepoResult<Cart>;
    /// [`RepoError::NotFound`] when the cart holds no line for `product_id`.
    async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> RepoResult<Cart>;
    async fn clear(&self, user_id: Uuid) -> RepoResult<Cart>;
    /// Pulls every line for `product_ids` and reactivates the cart.
    /// Returns the number of lines removed; a missing cart removes nothing.
    async fn remove_products(&self, user_id: Uuid, product_ids: &[Uuid]) -> RepoResult<u64>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Any order already holding `order_id` or `transaction_id`.
    async fn find_duplicate(&self, order_id: &str, transaction_id: &str) -> RepoResult<Option<Order>>;
    /// Fails with [`RepoError::Conflict`] if either unique key is taken.
    async fn insert(&self, order: Order) -> RepoResult<Order>;
    /// Looks up by business order id, then by internal id.
    async fn find(&self, id: &str) -> RepoResult<Option<Order>>;
    /// Newest first.
    async fn list(&self, filter: &OrderFilter) -> RepoResult<Vec<Order>>;
    /// Applies `change` in one atomic step (status, history append, paid stamp).
    async fn update_status(&self, id: &str, change: &StatusChange) -> RepoResult<Option<Order>>;
}

/// The four collections plus a liveness probe for `/health`.
#[derive(Clone)]
pub struct Store {
    pub users: Arc<dyn UserRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub carts: Arc<dyn CartRepository>,
    pub orders: Arc<dyn OrderRepository>,
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    Postgres(sqlx::PgPool),
    Memory,
}

impl Store {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool.clone()));
        Self {
            users: store.clone(),
            products: store.clone(),
            carts: store.clone(),
            orders: store,
            backend: Backend::Postgres(pool),
        }
    }

    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            users: store.clone(),
            products: store.clone(),
            carts: store.clone(),
            orders: store,
            backend: Backend::Memory,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend { Backend::Postgres(_) => "postgres", Backend::Memory => "memory" }
    }

    pub async fn ping(&self) -> RepoResult<()> {
        match &self.backend {
            Backend::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
                Ok(())
            }
            Backend::Memory => Ok(()),
        }
    }
}
