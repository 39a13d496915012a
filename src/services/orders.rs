//! Checkout and order management.
//!
//! Placing an order runs strictly in sequence: duplicate pre-check, gateway
//! verification, insert. The unique indexes on `order_id` and the payment
//! transaction id decide races the pre-check cannot see. Cart reconciliation
//! runs afterwards on its own task and never affects the placed order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::carts::{CartService, ProductSummary};
use crate::domain::aggregates::{
    Delivery, Discounts, HistoryEntry, Order, OrderDraft, OrderItem, OrderStatus, PaymentRecord, Product, Recipient,
    ShippingAddress, StatusChange, User,
};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::messaging::EventPublisher;
use crate::payment::PaymentVerifier;
use crate::repository::{OrderFilter, RepoError, Store};
use crate::{Result, ShopError};

const DUPLICATE_ORDER: &str = "this order has already been processed";
const SYSTEM_ACTOR: &str = "system";

/// A checkout request after shape validation.
#[derive(Clone, Debug, Default)]
pub struct OrderSubmission {
    pub order_id: String,
    pub user_id: Option<Uuid>,
    pub items: Vec<OrderItem>,
    pub transaction_id: String,
    /// Method and amount as claimed by the client; only used as fallbacks.
    pub payment_method: Option<String>,
    pub payment_amount: Option<i64>,
    pub recipient: Recipient,
    pub address: ShippingAddress,
    pub delivery_message: Option<String>,
    pub notes: Option<String>,
    pub discounts: Discounts,
    pub grand_total: Option<i64>,
    pub earned_points: i64,
    pub source: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// An admin's status change request, before parsing.
#[derive(Clone, Debug, Default)]
pub struct StatusUpdate {
    pub status: Option<String>,
    pub memo: Option<String>,
    pub provider: Option<String>,
    pub tracking_number: Option<String>,
}

#[derive(Debug)]
pub struct CreatedOrder {
    pub order: Order,
    /// Handle of the background cart cleanup, when one was started.
    pub reconciliation: Option<JoinHandle<()>>,
}

/// Order line with catalog details joined in.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    #[serde(flatten)]
    pub item: OrderItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductSummary>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Buyer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// An order as listed: lines carry product info, the buyer is resolved.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: Uuid,
    pub order_id: String,
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer: Option<Buyer>,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub payment: PaymentRecord,
    pub recipient: Recipient,
    pub address: ShippingAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_message: Option<String>,
    pub delivery: Delivery,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub items: Vec<OrderLine>,
    pub discounts: Discounts,
    pub grand_total: i64,
    pub earned_points: i64,
    pub history: Vec<HistoryEntry>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderView {
    fn new(order: Order, products: &HashMap<Uuid, Product>, buyers: &HashMap<Uuid, User>) -> Self {
        let items = order
            .items
            .into_iter()
            .map(|item| {
                let product = Uuid::parse_str(&item.product_id).ok().and_then(|id| products.get(&id));
                OrderLine {
                    product_image: product.map(|p| p.image.clone()),
                    product: product.map(ProductSummary::from),
                    item,
                }
            })
            .collect();
        let buyer = order.user_id.and_then(|id| buyers.get(&id)).map(|u| Buyer {
            id: u.id,
            name: u.name.clone(),
            email: u.email.to_string(),
        });
        Self {
            id: order.id,
            order_id: order.order_id,
            user_id: order.user_id,
            buyer,
            status: order.status,
            order_date: order.order_date,
            payment: order.payment,
            recipient: order.recipient,
            address: order.address,
            delivery_message: order.delivery_message,
            delivery: order.delivery,
            notes: order.notes,
            items,
            discounts: order.discounts,
            grand_total: order.grand_total,
            earned_points: order.earned_points,
            history: order.history,
            source: order.source,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct OrderService {
    store: Store,
    verifier: PaymentVerifier,
    carts: CartService,
    events: EventPublisher,
}

impl OrderService {
    pub fn new(store: Store, verifier: PaymentVerifier, carts: CartService, events: EventPublisher) -> Self {
        Self { store, verifier, carts, events }
    }

    /// Verifies the payment and records the order. Nothing is written when
    /// the submission is a duplicate or the gateway disagrees.
    #[tracing::instrument(
        skip(self, submission, actor),
        fields(order_id = %submission.order_id, transaction_id = %submission.transaction_id)
    )]
    pub async fn create(&self, submission: OrderSubmission, actor: Option<&User>) -> Result<CreatedOrder> {
        if submission.order_id.trim().is_empty() || submission.items.is_empty() {
            return Err(ShopError::invalid("order id and order items are required"));
        }
        if submission.transaction_id.trim().is_empty() {
            return Err(ShopError::invalid("payment transactionId is required for verification"));
        }

        if self
            .store
            .orders
            .find_duplicate(&submission.order_id, &submission.transaction_id)
            .await?
            .is_some()
        {
            tracing::info!("duplicate order submission rejected");
            return Err(ShopError::Conflict(DUPLICATE_ORDER.into()));
        }

        let expected_amount = submission.grand_total.or(submission.payment_amount);
        let verified = self
            .verifier
            .verify(&submission.transaction_id, expected_amount, Some(&submission.order_id))
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "payment verification failed");
                ShopError::Verification(e)
            })?;

        let payment = PaymentRecord {
            method: verified
                .pay_method
                .clone()
                .filter(|m| !m.is_empty())
                .or_else(|| submission.payment_method.clone().filter(|m| !m.is_empty()))
                .unwrap_or_else(|| "card".to_string()),
            amount: verified.amount,
            paid_at: Some(verified.paid_at().unwrap_or_else(Utc::now)),
            transaction_id: verified.imp_uid.clone(),
        };

        let actor_id = actor.map(|u| u.id.to_string());
        let draft = OrderDraft {
            order_id: submission.order_id,
            user_id: submission.user_id.or(actor.map(|u| u.id)),
            items: submission.items,
            recipient: submission.recipient,
            address: submission.address,
            delivery_message: submission.delivery_message,
            notes: submission.notes,
            discounts: submission.discounts,
            grand_total: submission.grand_total,
            earned_points: submission.earned_points,
            source: submission.source,
            ip_address: submission.ip_address,
            user_agent: submission.user_agent,
        };
        let order = Order::place(draft, payment, verified.is_paid(), actor_id.as_deref().unwrap_or(SYSTEM_ACTOR));

        let order = self.store.orders.insert(order).await.map_err(|e| match e {
            RepoError::Conflict { key } => {
                tracing::info!(%key, "order insert lost a duplicate race");
                ShopError::Conflict(DUPLICATE_ORDER.into())
            }
            other => other.into(),
        })?;

        tracing::info!(id = %order.id, status = %order.status, grand_total = order.grand_total, "order placed");
        self.events
            .publish(DomainEvent::Order(OrderEvent::Placed {
                order_id: order.order_id.clone(),
                user_id: order.user_id,
                grand_total: order.grand_total,
                status: order.status,
            }))
            .await;

        let reconciliation = order.user_id.map(|user_id| self.spawn_cart_reconciliation(user_id, &order));
        Ok(CreatedOrder { order, reconciliation })
    }

    fn spawn_cart_reconciliation(&self, user_id: Uuid, order: &Order) -> JoinHandle<()> {
        let carts = self.carts.clone();
        let refs = order.product_refs();
        let order_id = order.order_id.clone();
        tokio::spawn(async move {
            if let Err(e) = carts.reconcile(Some(user_id), &refs).await {
                tracing::error!(%order_id, %user_id, error = %e, "cart reconciliation failed");
            }
        })
    }

    /// Customers only ever see their own orders; admins may filter by buyer.
    pub async fn list(
        &self,
        viewer: &User,
        user_id: Option<Uuid>,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderView>> {
        let filter = OrderFilter {
            user_id: if viewer.is_admin() { user_id } else { Some(viewer.id) },
            status,
        };
        let orders = self.store.orders.list(&filter).await?;

        let mut product_ids: Vec<Uuid> = orders
            .iter()
            .flat_map(|o| o.items.iter())
            .filter_map(|i| Uuid::parse_str(&i.product_id).ok())
            .collect();
        product_ids.sort_unstable();
        product_ids.dedup();
        let mut buyer_ids: Vec<Uuid> = orders.iter().filter_map(|o| o.user_id).collect();
        buyer_ids.sort_unstable();
        buyer_ids.dedup();

        let products: HashMap<Uuid, Product> = if product_ids.is_empty() {
            HashMap::new()
        } else {
            self.store.products.find_many(&product_ids).await?.into_iter().map(|p| (p.id, p)).collect()
        };
        let buyers: HashMap<Uuid, User> = if buyer_ids.is_empty() {
            HashMap::new()
        } else {
            self.store.users.find_many(&buyer_ids).await?.into_iter().map(|u| (u.id, u)).collect()
        };

        Ok(orders.into_iter().map(|o| OrderView::new(o, &products, &buyers)).collect())
    }

    /// By business order id first, then by internal id.
    pub async fn get(&self, id: &str) -> Result<Order> {
        self.store
            .orders
            .find(id.trim())
            .await?
            .ok_or_else(|| ShopError::NotFound("order not found".into()))
    }

    #[tracing::instrument(skip(self, update, actor), fields(actor = %actor.id))]
    pub async fn update_status(&self, id: &str, update: StatusUpdate, actor: &User) -> Result<Order> {
        let status = update
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ShopError::invalid("status is required"))?;
        let status = status.parse::<OrderStatus>().map_err(|e| ShopError::invalid(e.to_string()))?;

        let non_blank = |v: Option<String>| v.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let change = StatusChange::new(status, actor.id.to_string(), non_blank(update.memo))
            .with_tracking(non_blank(update.provider), non_blank(update.tracking_number));
        let order = self
            .store
            .orders
            .update_status(id.trim(), &change)
            .await?
            .ok_or_else(|| ShopError::NotFound("order not found".into()))?;

        tracing::info!(order_id = %order.order_id, status = %order.status, "order status changed");
        self.events
            .publish(DomainEvent::Order(OrderEvent::StatusChanged {
                order_id: order.order_id.clone(),
                status: order.status,
                changed_by: change.changed_by,
            }))
            .await;
        Ok(order)
    }
}
