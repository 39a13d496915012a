//! PostgreSQL repositories.
//!
//! Nested order data (items, recipient, address, discounts, history) lives in
//! JSONB columns; cart lines are rows keyed by `(cart_id, product_id)` so that
//! add-or-merge is a single upsert. Status changes append to `history` inside
//! one `UPDATE`, never by read-modify-write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    CartRepository, OrderFilter, OrderRepository, ProductQuery, ProductRepository, RepoError, RepoResult,
    UserRepository,
};
use crate::domain::aggregates::{
    Cart, CartItem, CartItemPatch, Delivery, Discounts, HistoryEntry, Order, OrderItem, PaymentRecord, Product, MAX_ITEM_QUANTITY,
    ProductPatch, Recipient, ShippingAddress, StatusChange, User, UserPatch,
};
use crate::domain::value_objects::{Email, Sku};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

/// Unique-index violations become [`RepoError::Conflict`] named after the index.
fn map_write_err(err: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return RepoError::Conflict { key: db.constraint().unwrap_or("unique").to_string() };
        }
    }
    RepoError::Database(err)
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> RepoError {
    RepoError::Corrupt(format!("{what}: {err}"))
}

// =============================================================================
// Users
// =============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid, email: String, name: String, password_hash: String, role: String,
    address: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepoError;
    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: r.id,
            email: Email::parse(&r.email).map_err(|e| corrupt("users.email", e))?,
            name: r.name,
            password_hash: r.password_hash,
            role: r.role.parse().map_err(|e: String| corrupt("users.role", e))?,
            address: r.address,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn users(rows: Vec<UserRow>) -> RepoResult<Vec<User>> {
    rows.into_iter().map(User::try_from).collect()
}

#[async_trait]
impl UserRepository for PgStore {
    async fn list(&self) -> RepoResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY created_at, id")
            .fetch_all(&self.pool).await?;
        users(rows)
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?
            .map(User::try_from).transpose()
    }

    async fn find_many(&self, ids: &[Uuid]) -> RepoResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ANY($1)")
            .bind(ids).fetch_all(&self.pool).await?;
        users(rows)
    }

    async fn find_by_email(&self, email: &Email) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email.as_str()).fetch_optional(&self.pool).await?
            .map(User::try_from).transpose()
    }

    async fn insert(&self, user: User) -> RepoResult<User> {
        sqlx::query_as::<_, UserRow>("INSERT INTO users (id, email, name, password_hash, role, address, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *")
            .bind(user.id).bind(user.email.as_str()).bind(&user.name).bind(&user.password_hash)
            .bind(user.role.as_str()).bind(&user.address).bind(user.created_at).bind(user.updated_at)
            .fetch_one(&self.pool).await.map_err(map_write_err)?
            .try_into()
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> RepoResult<Option<User>> {
        let (set_address, address) = match patch.address {
            Some(address) => (true, address),
            None => (false, None),
        };
        sqlx::query_as::<_, UserRow>("UPDATE users SET email = COALESCE($2, email), name = COALESCE($3, name), password_hash = COALESCE($4, password_hash), role = COALESCE($5, role), address = CASE WHEN $6 THEN $7 ELSE address END, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(patch.email.as_ref().map(Email::as_str)).bind(patch.name).bind(patch.password_hash)
            .bind(patch.role.map(|r| r.as_str())).bind(set_address).bind(address)
            .fetch_optional(&self.pool).await.map_err(map_write_err)?
            .map(User::try_from).transpose()
    }

    async fn delete(&self, id: Uuid) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, UserRow>("DELETE FROM users WHERE id = $1 RETURNING *")
            .bind(id).fetch_optional(&self.pool).await?
            .map(User::try_from).transpose()
    }
}

// =============================================================================
// Products
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, sku: String, name: String, price: i64, category: String, image: String,
    description: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepoError;
    fn try_from(r: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: r.id,
            sku: Sku::new(r.sku).map_err(|e| corrupt("products.sku", e))?,
            name: r.name,
            price: r.price,
            category: r.category.parse().map_err(|e| corrupt("products.category", e))?,
            image: r.image,
            description: r.description,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn products(rows: Vec<ProductRow>) -> RepoResult<Vec<Product>> {
    rows.into_iter().map(Product::try_from).collect()
}

/// `%keyword%` with LIKE metacharacters escaped.
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl ProductRepository for PgStore {
    async fn list(&self, query: &ProductQuery) -> RepoResult<(Vec<Product>, u64)> {
        let pattern = query.keyword.as_deref().map(like_pattern);
        let filter = "($1::text IS NULL OR name ILIKE $1 OR sku ILIKE $1 OR category ILIKE $1)";
        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM products WHERE {filter}"))
            .bind(&pattern).fetch_one(&self.pool).await?;
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT * FROM products WHERE {filter} ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(&pattern)
        .bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(query.offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool).await?;
        Ok((products(rows)?, u64::try_from(total.0).unwrap_or(0)))
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?
            .map(Product::try_from).transpose()
    }

    async fn find_many(&self, ids: &[Uuid]) -> RepoResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(ids).fetch_all(&self.pool).await?;
        products(rows)
    }

    async fn find_by_sku(&self, sku: &Sku) -> RepoResult<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE sku = $1")
            .bind(sku.as_str()).fetch_optional(&self.pool).await?
            .map(Product::try_from).transpose()
    }

    async fn insert(&self, p: Product) -> RepoResult<Product> {
        sqlx::query_as::<_, ProductRow>("INSERT INTO products (id, sku, name, price, category, image, description, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *")
            .bind(p.id).bind(p.sku.as_str()).bind(&p.name).bind(p.price).bind(p.category.as_str())
            .bind(&p.image).bind(&p.description).bind(p.created_at).bind(p.updated_at)
            .fetch_one(&self.pool).await.map_err(map_write_err)?
            .try_into()
    }

    async fn update(&self, id: Uuid, patch: ProductPatch) -> RepoResult<Option<Product>> {
        let (set_description, description) = match patch.description {
            Some(description) => (true, description),
            None => (false, None),
        };
        sqlx::query_as::<_, ProductRow>("UPDATE products SET sku = COALESCE($2, sku), name = COALESCE($3, name), price = COALESCE($4, price), category = COALESCE($5, category), image = COALESCE($6, image), description = CASE WHEN $7 THEN $8 ELSE description END, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(patch.sku.as_ref().map(Sku::as_str)).bind(patch.name).bind(patch.price)
            .bind(patch.category.map(|c| c.as_str())).bind(patch.image).bind(set_description).bind(description)
            .fetch_optional(&self.pool).await.map_err(map_write_err)?
            .map(Product::try_from).transpose()
    }

    async fn delete(&self, id: Uuid) -> RepoResult<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("DELETE FROM products WHERE id = $1 RETURNING *")
            .bind(id).fetch_optional(&self.pool).await?
            .map(Product::try_from).transpose()
    }
}

// =============================================================================
// Carts
// =============================================================================

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid, user_id: Uuid, status: String, memo: Option<String>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow { product_id: Uuid, quantity: i32, price_snapshot: i64, checked: bool }

async fn ensure_cart(conn: &mut PgConnection, user_id: Uuid) -> RepoResult<CartRow> {
    Ok(sqlx::query_as::<_, CartRow>("INSERT INTO carts (id, user_id, status, created_at, updated_at) VALUES ($1, $2, 'active', NOW(), NOW()) ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id RETURNING *")
        .bind(Uuid::now_v7()).bind(user_id).fetch_one(&mut *conn).await?)
}

async fn touch_cart(conn: &mut PgConnection, cart_id: Uuid, reset_status: bool) -> RepoResult<CartRow> {
    Ok(sqlx::query_as::<_, CartRow>("UPDATE carts SET updated_at = NOW(), status = CASE WHEN $2 THEN 'active' ELSE status END, memo = CASE WHEN $2 THEN NULL ELSE memo END WHERE id = $1 RETURNING *")
        .bind(cart_id).bind(reset_status).fetch_one(&mut *conn).await?)
}

async fn load_cart(conn: &mut PgConnection, row: CartRow) -> RepoResult<Cart> {
    let items = sqlx::query_as::<_, CartItemRow>("SELECT product_id, quantity, price_snapshot, checked FROM cart_items WHERE cart_id = $1 ORDER BY added_at, product_id")
        .bind(row.id).fetch_all(&mut *conn).await?;
    Ok(Cart {
        id: row.id,
        user_id: row.user_id,
        items: items
            .into_iter()
            .map(|i| CartItem {
                product_id: i.product_id,
                quantity: u32::try_from(i.quantity).unwrap_or(1),
                price_snapshot: i.price_snapshot,
                checked: i.checked,
            })
            .collect(),
        status: row.status.parse().map_err(|e: String| corrupt("carts.status", e))?,
        memo: row.memo,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[async_trait]
impl CartRepository for PgStore {
    async fn get_or_create(&self, user_id: Uuid) -> RepoResult<Cart> {
        let mut tx = self.pool.begin().await?;
        let row = ensure_cart(&mut tx, user_id).await?;
        let cart = load_cart(&mut tx, row).await?;
        tx.commit().await?;
        Ok(cart)
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
        let quantity = i32::try_from(quantity.min(MAX_ITEM_QUANTITY)).unwrap_or(1);
        let max_quantity = i32::try_from(MAX_ITEM_QUANTITY).unwrap_or(i32::MAX);
        let mut tx = self.pool.begin().await?;
        let cart = ensure_cart(&mut tx, user_id).await?;
        sqlx::query("INSERT INTO cart_items (cart_id, product_id, quantity, price_snapshot, checked, added_at) VALUES ($1, $2, $3, COALESCE($4, $6), COALESCE($5, TRUE), NOW()) ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = LEAST(cart_items.quantity + EXCLUDED.quantity, $7), checked = COALESCE($5, cart_items.checked), price_snapshot = CASE WHEN $4 IS NOT NULL THEN $4 WHEN cart_items.price_snapshot = 0 THEN $6 ELSE cart_items.price_snapshot END")
            .bind(cart.id).bind(product_id).bind(quantity).bind(price_snapshot).bind(checked).bind(catalog_price).bind(max_quantity)
            .execute(&mut *tx).await?;
        let row = touch_cart(&mut tx, cart.id, false).await?;
        let cart = load_cart(&mut tx, row).await?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn update_item(&self, user_id: Uuid, product_id: Uuid, patch: CartItemPatch) -> RepoResult<Cart> {
        let mut tx = self.pool.begin().await?;
        let cart = ensure_cart(&mut tx, user_id).await?;
        let affected = match patch.quantity {
            Some(q) if q <= 0 => sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
                .bind(cart.id).bind(product_id).execute(&mut *tx).await?,
            quantity => sqlx::query("UPDATE cart_items SET quantity = COALESCE($3, quantity), checked = COALESCE($4, checked), price_snapshot = COALESCE($5, price_snapshot) WHERE cart_id = $1 AND product_id = $2")
                .bind(cart.id).bind(product_id)
                .bind(quantity.map(|q| i32::try_from(q.min(i64::from(MAX_ITEM_QUANTITY))).unwrap_or(1)))
                .bind(patch.checked).bind(patch.price_snapshot)
                .execute(&mut *tx).await?,
        };
        if affected.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        let row = touch_cart(&mut tx, cart.id, false).await?;
        let cart = load_cart(&mut tx, row).await?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> RepoResult<Cart> {
        let mut tx = self.pool.begin().await?;
        let cart = ensure_cart(&mut tx, user_id).await?;
        let affected = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart.id).bind(product_id).execute(&mut *tx).await?;
        if affected.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        let row = touch_cart(&mut tx, cart.id, false).await?;
        let cart = load_cart(&mut tx, row).await?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn clear(&self, user_id: Uuid) -> RepoResult<Cart> {
        let mut tx = self.pool.begin().await?;
        let cart = ensure_cart(&mut tx, user_id).await?;
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1").bind(cart.id).execute(&mut *tx).await?;
        let row = touch_cart(&mut tx, cart.id, true).await?;
        let cart = load_cart(&mut tx, row).await?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn remove_products(&self, user_id: Uuid, product_ids: &[Uuid]) -> RepoResult<u64> {
        let removed: i64 = sqlx::query_scalar(
            "WITH target AS (SELECT id FROM carts WHERE user_id = $1), \
             removed AS (DELETE FROM cart_items WHERE cart_id IN (SELECT id FROM target) AND product_id = ANY($2) RETURNING 1), \
             reset AS (UPDATE carts SET status = 'active', memo = NULL, updated_at = NOW() WHERE id IN (SELECT id FROM target) RETURNING 1) \
             SELECT COUNT(*) FROM removed",
        )
        .bind(user_id).bind(product_ids)
        .fetch_one(&self.pool).await?;
        Ok(u64::try_from(removed).unwrap_or(0))
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_id: String,
    user_id: Option<Uuid>,
    status: String,
    order_date: DateTime<Utc>,
    payment_method: String,
    payment_amount: i64,
    paid_at: Option<DateTime<Utc>>,
    payment_transaction_id: String,
    recipient: Json<Recipient>,
    address: Json<ShippingAddress>,
    delivery_message: Option<String>,
    delivery: Json<Delivery>,
    notes: Option<String>,
    items: Json<Vec<OrderItem>>,
    discounts: Json<Discounts>,
    grand_total: i64,
    earned_points: i64,
    history: Json<Vec<HistoryEntry>>,
    source: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepoError;
    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: r.id,
            order_id: r.order_id,
            user_id: r.user_id,
            status: r.status.parse().map_err(|e| corrupt("orders.status", e))?,
            order_date: r.order_date,
            payment: PaymentRecord {
                method: r.payment_method,
                amount: r.payment_amount,
                paid_at: r.paid_at,
                transaction_id: r.payment_transaction_id,
            },
            recipient: r.recipient.0,
            address: r.address.0,
            delivery_message: r.delivery_message,
            delivery: r.delivery.0,
            notes: r.notes,
            items: r.items.0,
            discounts: r.discounts.0,
            grand_total: r.grand_total,
            earned_points: r.earned_points,
            history: r.history.0,
            source: r.source,
            ip_address: r.ip_address,
            user_agent: r.user_agent,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn status_update_sql(column: &str) -> String {
    format!(
        "UPDATE orders SET status = $2, history = history || $3, \
         paid_at = CASE WHEN $2 = 'paid' AND paid_at IS NULL THEN $4 ELSE paid_at END, \
         delivery = delivery || jsonb_strip_nulls(jsonb_build_object( \
             'provider', $5::text, 'trackingNumber', $6::text, \
             'shippedDate', CASE WHEN $2 = 'shipped' AND delivery->>'shippedDate' IS NULL THEN to_jsonb($4::timestamptz) END, \
             'deliveredDate', CASE WHEN $2 = 'completed' AND delivery->>'deliveredDate' IS NULL THEN to_jsonb($4::timestamptz) END)), \
         updated_at = $4 WHERE {column} = $1 RETURNING *"
    )
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn find_duplicate(&self, order_id: &str, transaction_id: &str) -> RepoResult<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE order_id = $1 OR payment_transaction_id = $2 LIMIT 1")
            .bind(order_id).bind(transaction_id).fetch_optional(&self.pool).await?
            .map(Order::try_from).transpose()
    }

    async fn insert(&self, o: Order) -> RepoResult<Order> {
        sqlx::query_as::<_, OrderRow>("INSERT INTO orders (id, order_id, user_id, status, order_date, payment_method, payment_amount, paid_at, payment_transaction_id, recipient, address, delivery_message, items, discounts, grand_total, earned_points, history, source, ip_address, user_agent, created_at, updated_at, delivery, notes) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24) RETURNING *")
            .bind(o.id).bind(&o.order_id).bind(o.user_id).bind(o.status.as_str()).bind(o.order_date)
            .bind(&o.payment.method).bind(o.payment.amount).bind(o.payment.paid_at).bind(&o.payment.transaction_id)
            .bind(Json(&o.recipient)).bind(Json(&o.address)).bind(&o.delivery_message)
            .bind(Json(&o.items)).bind(Json(&o.discounts)).bind(o.grand_total).bind(o.earned_points)
            .bind(Json(&o.history)).bind(&o.source).bind(&o.ip_address).bind(&o.user_agent)
            .bind(o.created_at).bind(o.updated_at).bind(Json(&o.delivery)).bind(&o.notes)
            .fetch_one(&self.pool).await.map_err(map_write_err)?
            .try_into()
    }

    async fn find(&self, id: &str) -> RepoResult<Option<Order>> {
        let by_order_id = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE order_id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        let row = match (by_order_id, Uuid::parse_str(id)) {
            (Some(row), _) => Some(row),
            (None, Ok(uuid)) => sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
                .bind(uuid).fetch_optional(&self.pool).await?,
            (None, Err(_)) => None,
        };
        row.map(Order::try_from).transpose()
    }

    async fn list(&self, filter: &OrderFilter) -> RepoResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::text IS NULL OR status = $2) ORDER BY order_date DESC, id DESC")
            .bind(filter.user_id).bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool).await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn update_status(&self, id: &str, change: &StatusChange) -> RepoResult<Option<Order>> {
        let entry = Json(vec![change.history_entry()]);
        let by_order_id = sqlx::query_as::<_, OrderRow>(&status_update_sql("order_id"))
            .bind(id).bind(change.status.as_str()).bind(&entry).bind(change.at)
            .bind(&change.provider).bind(&change.tracking_number)
            .fetch_optional(&self.pool).await?;
        let row = match (by_order_id, Uuid::parse_str(id)) {
            (Some(row), _) => Some(row),
            (None, Ok(uuid)) => sqlx::query_as::<_, OrderRow>(&status_update_sql("id"))
                .bind(uuid).bind(change.status.as_str()).bind(&entry).bind(change.at)
                .bind(&change.provider).bind(&change.tracking_number)
                .fetch_optional(&self.pool).await?,
            (None, Err(_)) => None,
        };
        row.map(Order::try_from).transpose()
    }
}
