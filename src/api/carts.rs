use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::extract::{AuthUser, ValidatedJson};
use super::ApiResponse;
use crate::domain::aggregates::CartItemPatch;
use crate::services::{parse_id, CartMeta, CartView};
use crate::{AppState, Result, ShopError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/:product_id", patch(update_item).delete(remove_item))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    #[serde(default)]
    pub product_id: Option<String>,
    #[validate(range(max = 999, message = "quantity must be at most 999"))]
    pub quantity: Option<i64>,
    #[validate(range(min = 0, max = 100000000, message = "priceSnapshot must be between 0 and 100000000"))]
    pub price_snapshot: Option<i64>,
    pub checked: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    #[validate(range(max = 999, message = "quantity must be at most 999"))]
    pub quantity: Option<i64>,
    pub checked: Option<bool>,
    #[validate(range(min = 0, max = 100000000, message = "priceSnapshot must be between 0 and 100000000"))]
    pub price_snapshot: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MetaField {
    meta: CartMeta,
}

type CartResponse = ApiResponse<CartView, MetaField>;

fn respond(view: CartView, message: Option<&str>) -> CartResponse {
    let meta = view.meta.clone();
    let response = ApiResponse::new(view);
    let response = match message {
        Some(message) => response.message(message),
        None => response,
    };
    response.extra(MetaField { meta })
}

fn product_id(raw: &str) -> Result<Uuid> {
    parse_id(raw).ok_or_else(|| ShopError::invalid("a valid product id is required"))
}

async fn get_cart(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<CartResponse> {
    Ok(respond(state.carts.get(user.id).await?, None))
}

async fn add_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidatedJson(body): ValidatedJson<AddItemRequest>,
) -> Result<(StatusCode, CartResponse)> {
    let product_id = product_id(body.product_id.as_deref().unwrap_or_default())?;
    let quantity = body.quantity.unwrap_or(1);
    let quantity = u32::try_from(quantity)
        .ok()
        .filter(|q| *q >= 1)
        .ok_or_else(|| ShopError::invalid("quantity must be at least 1"))?;
    let view = state
        .carts
        .add_item(user.id, product_id, quantity, body.price_snapshot, body.checked)
        .await?;
    Ok((StatusCode::CREATED, respond(view, Some("item added to cart"))))
}

async fn update_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateItemRequest>,
) -> Result<CartResponse> {
    let patch = CartItemPatch { quantity: body.quantity, checked: body.checked, price_snapshot: body.price_snapshot };
    let view = state.carts.update_item(user.id, product_id(&raw_id)?, patch).await?;
    Ok(respond(view, Some("cart item updated")))
}

async fn remove_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
) -> Result<CartResponse> {
    let view = state.carts.remove_item(user.id, product_id(&raw_id)?).await?;
    Ok(respond(view, Some("item removed from cart")))
}

async fn clear_cart(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<CartResponse> {
    Ok(respond(state.carts.clear(user.id).await?, Some("cart cleared")))
}
