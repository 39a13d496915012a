//! Domain events
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::Sku;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
    Cart(CartEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: Uuid, sku: Sku },
    Deleted { product_id: Uuid, sku: Sku },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: String, user_id: Option<Uuid>, grand_total: i64, status: OrderStatus },
    StatusChanged { order_id: String, status: OrderStatus, changed_by: String },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartEvent {
    Reconciled { user_id: Uuid, removed_items: u64 },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Product(ProductEvent::Created { .. }) => "storefront.product.created",
            Self::Product(ProductEvent::Deleted { .. }) => "storefront.product.deleted",
            Self::Order(OrderEvent::Placed { .. }) => "storefront.order.placed",
            Self::Order(OrderEvent::StatusChanged { .. }) => "storefront.order.status_changed",
            Self::Cart(CartEvent::Reconciled { .. }) => "storefront.cart.reconciled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_payload_is_tagged() {
        let event = DomainEvent::Order(OrderEvent::StatusChanged {
            order_id: "order_1".into(), status: OrderStatus::Shipped, changed_by: "admin".into(),
        });
        assert_eq!(event.subject(), "storefront.order.status_changed");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["status"], "shipped");
    }
}
