use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::extract::{AdminUser, ValidatedJson};
use super::ApiResponse;
use crate::domain::aggregates::{Product, ProductPatch};
use crate::domain::value_objects::{ProductCategory, Sku};
use crate::services::{parse_id, Pagination};
use crate::{AppState, Result, ShopError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product).put(update_product).delete(delete_product))
}

/// Query values are parsed leniently; anything unreadable falls back to the default.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub keyword: Option<String>,
}

fn positive(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|v| v.trim().parse::<i64>().ok()).map(|v| v.max(1).unsigned_abs())
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 50, message = "sku must be 1 to 50 characters"))]
    pub sku: String,
    #[validate(length(min = 1, max = 200, message = "name must be 1 to 200 characters"))]
    pub name: String,
    #[validate(range(min = 0, max = 100000000, message = "price must be between 0 and 100000000"))]
    pub price: i64,
    pub category: String,
    #[validate(length(min = 1, message = "image is required"))]
    pub image: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductRequest {
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 200, message = "name must be 1 to 200 characters"))]
    pub name: Option<String>,
    #[validate(range(min = 0, max = 100000000, message = "price must be between 0 and 100000000"))]
    pub price: Option<i64>,
    pub category: Option<String>,
    #[validate(length(min = 1, message = "image must not be empty"))]
    pub image: Option<String>,
    /// An empty string clears the description.
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListExtra {
    pagination: Pagination,
    count: usize,
}

#[derive(Debug, Serialize)]
pub struct DeletedProduct {
    id: Uuid,
    sku: Sku,
    name: String,
}

fn parse_sku(raw: &str) -> Result<Sku> {
    Sku::new(raw).map_err(|e| ShopError::invalid(e.to_string()))
}

fn parse_category(raw: &str) -> Result<ProductCategory> {
    raw.parse::<ProductCategory>().map_err(|e| ShopError::invalid(e.to_string()))
}

fn product_id(raw: &str) -> Result<Uuid> {
    parse_id(raw).ok_or_else(|| ShopError::NotFound("product not found".into()))
}

fn description(raw: Option<String>) -> Option<String> {
    raw.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())
}

async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<ApiResponse<Vec<Product>, ListExtra>> {
    let page = state
        .catalog
        .list(positive(params.page.as_deref()), positive(params.limit.as_deref()), params.keyword)
        .await?;
    let count = page.products.len();
    Ok(ApiResponse::new(page.products).extra(ListExtra { pagination: page.pagination, count }))
}

async fn get_product(State(state): State<AppState>, Path(id): Path<String>) -> Result<ApiResponse<Product>> {
    Ok(ApiResponse::new(state.catalog.get(product_id(&id)?).await?))
}

async fn create_product(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ValidatedJson(body): ValidatedJson<CreateProductRequest>,
) -> Result<(StatusCode, ApiResponse<Product>)> {
    let product = Product::create(
        parse_sku(&body.sku)?,
        body.name.trim(),
        body.price,
        parse_category(&body.category)?,
        body.image.trim(),
        description(body.description),
    );
    let product = state.catalog.create(product).await?;
    Ok((StatusCode::CREATED, ApiResponse::new(product).message("product created")))
}

async fn update_product(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateProductRequest>,
) -> Result<ApiResponse<Product>> {
    let patch = ProductPatch {
        sku: body.sku.as_deref().map(parse_sku).transpose()?,
        name: body.name.map(|n| n.trim().to_string()),
        price: body.price,
        category: body.category.as_deref().map(parse_category).transpose()?,
        image: body.image.map(|i| i.trim().to_string()),
        description: body.description.map(|d| description(Some(d))),
    };
    let product = state.catalog.update(product_id(&id)?, patch).await?;
    Ok(ApiResponse::new(product).message("product updated"))
}

async fn delete_product(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<DeletedProduct>> {
    let product = state.catalog.delete(product_id(&id)?).await?;
    Ok(ApiResponse::new(DeletedProduct { id: product.id, sku: product.sku, name: product.name })
        .message("product deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_paging_params() {
        assert_eq!(positive(Some("3")), Some(3));
        assert_eq!(positive(Some("0")), Some(1));
        assert_eq!(positive(Some("-4")), Some(1));
        assert_eq!(positive(Some("abc")), None);
        assert_eq!(positive(None), None);
    }
}
