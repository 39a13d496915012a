//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// A placed order. `order_id` is the client-generated business identifier and
/// `payment.transaction_id` the gateway's; both are unique across all orders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_id: String,
    pub user_id: Option<Uuid>,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub payment: PaymentRecord,
    pub recipient: Recipient,
    pub address: ShippingAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_message: Option<String>,
    #[serde(default)]
    pub delivery: Delivery,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub items: Vec<OrderItem>,
    pub discounts: Discounts,
    pub grand_total: i64,
    pub earned_points: i64,
    pub history: Vec<HistoryEntry>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// Catalog product reference as submitted; not required to resolve.
    pub product_id: String,
    pub product_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku_id: Option<String>,
    pub quantity: u32,
    pub unit_price: i64,
    pub line_total: i64,
}

/// Payment as confirmed by the gateway, never as asserted by the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub method: String,
    pub amount: i64,
    pub paid_at: Option<DateTime<Utc>>,
    pub transaction_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub name: String,
    pub contact_number: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub postal_code: String,
    pub address1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
}

/// Shipping progress. The dates are stamped on the first move to `shipped`
/// and `completed` respectively.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipped_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discounts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub coupon_discount: i64,
    #[serde(default)]
    pub used_points: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub status: OrderStatus,
    pub changed_at: DateTime<Utc>,
    pub changed_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Paid, Shipped, Completed, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "shipped" => Ok(Self::Shipped),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown order status {0:?}")]
pub struct UnknownStatus(pub String);

/// Everything about an order that comes from the buyer's submission.
#[derive(Clone, Debug, Default)]
pub struct OrderDraft {
    pub order_id: String,
    pub user_id: Option<Uuid>,
    pub items: Vec<OrderItem>,
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

/// A status transition request; applied atomically by the repository.
#[derive(Clone, Debug)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub changed_by: String,
    pub memo: Option<String>,
    /// Carrier details recorded alongside the change, typically when shipping.
    pub provider: Option<String>,
    pub tracking_number: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    pub fn new(status: OrderStatus, changed_by: impl Into<String>, memo: Option<String>) -> Self {
        Self { status, changed_by: changed_by.into(), memo, provider: None, tracking_number: None, at: Utc::now() }
    }

    pub fn with_tracking(mut self, provider: Option<String>, tracking_number: Option<String>) -> Self {
        self.provider = provider;
        self.tracking_number = tracking_number;
        self
    }

    pub fn history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            status: self.status,
            changed_at: self.at,
            changed_by: self.changed_by.clone(),
            memo: self.memo.clone(),
        }
    }
}

impl Order {
    /// Builds the order to persist once the gateway has confirmed `payment`.
    /// The initial status is `paid` only when the gateway says so.
    pub fn place(draft: OrderDraft, payment: PaymentRecord, gateway_paid: bool, actor: &str) -> Self {
        let now = Utc::now();
        let status = if gateway_paid { OrderStatus::Paid } else { OrderStatus::Pending };
        let grand_total = draft.grand_total.unwrap_or(payment.amount);
        let initial = StatusChange { at: now, ..StatusChange::new(status, actor, None) };
        Self {
            id: Uuid::now_v7(),
            order_id: draft.order_id,
            user_id: draft.user_id,
            status,
            order_date: now,
            payment,
            recipient: draft.recipient,
            address: draft.address,
            delivery_message: draft.delivery_message,
            delivery: Delivery::default(),
            notes: draft.notes,
            items: draft.items,
            discounts: draft.discounts,
            grand_total,
            earned_points: draft.earned_points,
            history: vec![initial.history_entry()],
            source: draft.source.unwrap_or_else(|| "web".to_string()),
            ip_address: draft.ip_address,
            user_agent: draft.user_agent,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the status, appends to history and stamps the paid time on the
    /// first transition to `paid`.
    pub fn apply_status(&mut self, change: &StatusChange) {
        self.status = change.status;
        self.history.push(change.history_entry());
        if change.status == OrderStatus::Paid && self.payment.paid_at.is_none() {
            self.payment.paid_at = Some(change.at);
        }
        if let Some(provider) = &change.provider {
            self.delivery.provider = Some(provider.clone());
        }
        if let Some(tracking_number) = &change.tracking_number {
            self.delivery.tracking_number = Some(tracking_number.clone());
        }
        match change.status {
            OrderStatus::Shipped if self.delivery.shipped_date.is_none() => self.delivery.shipped_date = Some(change.at),
            OrderStatus::Completed if self.delivery.delivered_date.is_none() => {
                self.delivery.delivered_date = Some(change.at)
            }
            _ => {}
        }
        self.updated_at = change.at;
    }

    /// Product references of the purchased lines, in order.
    pub fn product_refs(&self) -> Vec<String> {
        self.items.iter().map(|i| i.product_id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> OrderDraft {
        OrderDraft {
            order_id: "order_1700000000000".into(),
            items: vec![OrderItem {
                product_id: "P1".into(), product_name: "Widget".into(), variant: None, sku_id: None,
                quantity: 2, unit_price: 10_000, line_total: 20_000,
            }],
            ..OrderDraft::default()
        }
    }

    fn payment(paid_at: Option<DateTime<Utc>>) -> PaymentRecord {
        PaymentRecord { method: "card".into(), amount: 20_000, paid_at, transaction_id: "imp_abc".into() }
    }

    #[test]
    fn test_place_paid_order() {
        let order = Order::place(draft(), payment(Some(Utc::now())), true, "system");
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.grand_total, 20_000);
        assert_eq!(order.source, "web");
        assert_eq!(order.history.len(), 1);
        assert_eq!(order.history[0].status, OrderStatus::Paid);
        assert_eq!(order.history[0].changed_by, "system");
    }

    #[test]
    fn test_place_unpaid_order_is_pending() {
        let order = Order::place(draft(), payment(None), false, "system");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.history[0].status, OrderStatus::Pending);
    }

    #[test]
    fn test_apply_status_appends_history() {
        let mut order = Order::place(draft(), payment(None), false, "system");
        order.apply_status(&StatusChange::new(OrderStatus::Shipped, "admin-1", Some("CJ 1234".into())));
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.history.len(), 2);
        assert_eq!(order.history[1].memo.as_deref(), Some("CJ 1234"));
        assert!(order.payment.paid_at.is_none());
    }

    #[test]
    fn test_paid_transition_stamps_paid_at_once() {
        let mut order = Order::place(draft(), payment(None), false, "system");
        order.apply_status(&StatusChange::new(OrderStatus::Paid, "admin-1", None));
        let first = order.payment.paid_at.expect("stamped");
        order.apply_status(&StatusChange::new(OrderStatus::Paid, "admin-1", None));
        assert_eq!(order.payment.paid_at, Some(first));
    }

    #[test]
    fn test_delivery_tracking_and_dates() {
        let mut order = Order::place(draft(), payment(None), true, "system");
        assert_eq!(order.delivery, Delivery::default());

        let shipped = StatusChange::new(OrderStatus::Shipped, "admin-1", None)
            .with_tracking(Some("CJ".into()), Some("1234".into()));
        order.apply_status(&shipped);
        assert_eq!(order.delivery.provider.as_deref(), Some("CJ"));
        assert_eq!(order.delivery.tracking_number.as_deref(), Some("1234"));
        assert_eq!(order.delivery.shipped_date, Some(shipped.at));

        order.apply_status(&StatusChange::new(OrderStatus::Shipped, "admin-1", None));
        assert_eq!(order.delivery.shipped_date, Some(shipped.at));
        assert_eq!(order.delivery.tracking_number.as_deref(), Some("1234"));

        let completed = StatusChange::new(OrderStatus::Completed, "admin-1", None);
        order.apply_status(&completed);
        assert_eq!(order.delivery.delivered_date, Some(completed.at));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("lost".parse::<OrderStatus>().is_err());
    }
}
