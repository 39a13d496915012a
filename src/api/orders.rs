use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::Router;
use serde::Deserialize;
use validator::Validate;

use super::extract::{AdminUser, AuthUser, ClientInfo, MaybeAuthUser, ValidatedJson};
use super::ApiResponse;
use crate::domain::aggregates::{Discounts, Order, OrderItem, OrderStatus, Recipient, ShippingAddress};
use crate::services::{parse_id, OrderSubmission, OrderView, StatusUpdate};
use crate::{AppState, Result, ShopError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/status", patch(update_status))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub status: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    #[validate(length(min = 1, message = "productId is required"))]
    pub product_id: String,
    #[validate(length(min = 1, message = "productName is required"))]
    pub product_name: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub sku_id: Option<String>,
    #[validate(range(min = 1, max = 100000, message = "quantity must be at least 1"))]
    pub quantity: i64,
    #[validate(range(min = 0, message = "unitPrice must not be negative"))]
    pub unit_price: i64,
    #[validate(range(min = 0, message = "lineTotal must not be negative"))]
    pub line_total: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub method: Option<String>,
    pub amount: Option<i64>,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecipientRequest {
    #[validate(length(min = 1, message = "recipient name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "recipient contact number is required"))]
    pub contact_number: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddressRequest {
    #[validate(length(min = 1, message = "postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "address1 is required"))]
    pub address1: String,
    #[serde(default)]
    pub address2: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DiscountsRequest {
    pub coupon_code: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, message = "couponDiscount must not be negative"))]
    pub coupon_discount: i64,
    #[serde(default)]
    #[validate(range(min = 0, message = "usedPoints must not be negative"))]
    pub used_points: i64,
}

/// Checkout body. Nested parts are checked by [`CreateOrderRequest::into_submission`]
/// in the order that decides which error the client sees.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub order_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
    pub payment: Option<PaymentRequest>,
    pub recipient: Option<RecipientRequest>,
    pub address: Option<AddressRequest>,
    pub delivery_message: Option<String>,
    #[validate(length(max = 1000, message = "notes must be at most 1000 characters"))]
    pub notes: Option<String>,
    pub discounts: Option<DiscountsRequest>,
    #[validate(range(min = 0, message = "grandTotal must not be negative"))]
    pub grand_total: Option<i64>,
    #[validate(range(min = 0, message = "earnedPoints must not be negative"))]
    pub earned_points: Option<i64>,
    pub source: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub status: Option<String>,
    #[validate(length(max = 500, message = "memo must be at most 500 characters"))]
    pub memo: Option<String>,
    #[validate(length(max = 100, message = "provider must be at most 100 characters"))]
    pub provider: Option<String>,
    #[validate(length(max = 100, message = "trackingNumber must be at most 100 characters"))]
    pub tracking_number: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl CreateOrderRequest {
    fn into_submission(self, client: ClientInfo) -> Result<OrderSubmission> {
        let order_id = non_blank(self.order_id);
        let Some(order_id) = order_id.filter(|_| !self.items.is_empty()) else {
            return Err(ShopError::invalid("order id and order items are required"));
        };
        let user_id = match non_blank(self.user_id) {
            Some(raw) => Some(parse_id(&raw).ok_or_else(|| ShopError::invalid("a valid user id is required"))?),
            None => None,
        };
        let payment = self.payment.unwrap_or_default();
        let Some(transaction_id) = non_blank(payment.transaction_id) else {
            return Err(ShopError::invalid("payment transactionId is required for verification"));
        };

        let mut items = Vec::with_capacity(self.items.len());
        for item in self.items {
            item.validate()?;
            let quantity = u32::try_from(item.quantity).map_err(|_| ShopError::invalid("quantity is out of range"))?;
            items.push(OrderItem {
                line_total: item.line_total.unwrap_or(item.unit_price.saturating_mul(item.quantity)),
                product_id: item.product_id.trim().to_string(),
                product_name: item.product_name,
                variant: non_blank(item.variant),
                sku_id: non_blank(item.sku_id),
                quantity,
                unit_price: item.unit_price,
            });
        }

        let recipient = self.recipient.ok_or_else(|| ShopError::invalid("recipient is required"))?;
        recipient.validate()?;
        let address = self.address.ok_or_else(|| ShopError::invalid("shipping address is required"))?;
        address.validate()?;
        let discounts = self.discounts.unwrap_or_default();
        discounts.validate()?;

        Ok(OrderSubmission {
            order_id,
            user_id,
            items,
            transaction_id,
            payment_method: non_blank(payment.method),
            payment_amount: payment.amount,
            recipient: Recipient { name: recipient.name, contact_number: recipient.contact_number },
            address: ShippingAddress {
                postal_code: address.postal_code,
                address1: address.address1,
                address2: non_blank(address.address2),
            },
            delivery_message: non_blank(self.delivery_message),
            notes: non_blank(self.notes),
            discounts: Discounts {
                coupon_code: non_blank(discounts.coupon_code),
                coupon_discount: discounts.coupon_discount,
                used_points: discounts.used_points,
            },
            grand_total: self.grand_total,
            earned_points: self.earned_points.unwrap_or(0),
            source: non_blank(self.source),
            ip_address: non_blank(self.ip_address).or(client.ip),
            user_agent: non_blank(self.user_agent).or(client.user_agent),
        })
    }
}

async fn list_orders(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    Query(params): Query<ListParams>,
) -> Result<ApiResponse<Vec<OrderView>>> {
    let status = match non_blank(params.status) {
        Some(raw) => Some(raw.parse::<OrderStatus>().map_err(|e| ShopError::invalid(e.to_string()))?),
        None => None,
    };
    let user_id = match non_blank(params.user_id) {
        Some(raw) if viewer.is_admin() => {
            Some(parse_id(&raw).ok_or_else(|| ShopError::invalid("a valid user id is required"))?)
        }
        _ => None,
    };
    Ok(ApiResponse::new(state.orders.list(&viewer, user_id, status).await?))
}

async fn create_order(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    client: ClientInfo,
    ValidatedJson(body): ValidatedJson<CreateOrderRequest>,
) -> Result<(StatusCode, ApiResponse<Order>)> {
    let submission = body.into_submission(client)?;
    let created = state.orders.create(submission, actor.as_ref()).await?;
    Ok((StatusCode::CREATED, ApiResponse::new(created.order).message("order created")))
}

async fn get_order(State(state): State<AppState>, Path(id): Path<String>) -> Result<ApiResponse<Order>> {
    Ok(ApiResponse::new(state.orders.get(&id).await?))
}

async fn update_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<StatusRequest>,
) -> Result<ApiResponse<Order>> {
    let update = StatusUpdate {
        status: body.status,
        memo: body.memo,
        provider: body.provider,
        tracking_number: body.tracking_number,
    };
    let order = state.orders.update_status(&id, update, &admin).await?;
    Ok(ApiResponse::new(order).message("order status updated"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: serde_json::Value) -> CreateOrderRequest {
        serde_json::from_value(value).unwrap()
    }

    fn valid() -> serde_json::Value {
        json!({
            "orderId": "order_1",
            "items": [{ "productId": "p1", "productName": "Tee", "quantity": 2, "unitPrice": 10000 }],
            "payment": { "transactionId": "imp_1", "amount": 20000 },
            "recipient": { "name": "Kim", "contactNumber": "010-0000-0000" },
            "address": { "postalCode": "04524", "address1": "Seoul" }
        })
    }

    #[test]
    fn test_submission_defaults() {
        let client = ClientInfo { ip: Some("10.0.0.7".into()), user_agent: Some("ua".into()) };
        let submission = body(valid()).into_submission(client).unwrap();
        assert_eq!(submission.items[0].line_total, 20_000);
        assert_eq!(submission.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(submission.payment_amount, Some(20_000));
        assert!(submission.user_id.is_none());
    }

    #[test]
    fn test_submission_rejections() {
        let mut missing_tx = valid();
        missing_tx["payment"] = json!({});
        assert!(body(missing_tx).into_submission(ClientInfo::default()).is_err());

        let mut bad_user = valid();
        bad_user["userId"] = json!("not-an-id");
        let err = body(bad_user).into_submission(ClientInfo::default()).unwrap_err();
        assert_eq!(err.to_string(), "a valid user id is required");

        let mut no_items = valid();
        no_items["items"] = json!([]);
        assert!(body(no_items).into_submission(ClientInfo::default()).is_err());

        let mut zero_qty = valid();
        zero_qty["items"][0]["quantity"] = json!(0);
        assert!(body(zero_qty).into_submission(ClientInfo::default()).is_err());

        let mut no_recipient = valid();
        no_recipient.as_object_mut().unwrap().remove("recipient");
        assert!(body(no_recipient).into_submission(ClientInfo::default()).is_err());
    }
}
