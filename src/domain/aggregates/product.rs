//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{ProductCategory, Sku};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub price: i64,
    pub category: ProductCategory,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields an admin may change. `description: Some(None)` clears it.
#[derive(Clone, Debug, Default)]
pub struct ProductPatch {
    pub sku: Option<Sku>,
    pub name: Option<String>,
    pub price: Option<i64>,
    pub category: Option<ProductCategory>,
    pub image: Option<String>,
    pub description: Option<Option<String>>,
}

impl Product {
    pub fn create(
        sku: Sku,
        name: impl Into<String>,
        price: i64,
        category: ProductCategory,
        image: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), sku, name: name.into(), price, category, image: image.into(),
            description, created_at: now, updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: ProductPatch) {
        if let Some(sku) = patch.sku { self.sku = sku; }
        if let Some(name) = patch.name { self.name = name; }
        if let Some(price) = patch.price { self.price = price; }
        if let Some(category) = patch.category { self.category = category; }
        if let Some(image) = patch.image { self.image = image; }
        if let Some(description) = patch.description { self.description = description; }
        self.updated_at = Utc::now();
    }

    /// Case-insensitive substring match over name, SKU and category.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        let keyword = keyword.to_lowercase();
        self.name.to_lowercase().contains(&keyword)
            || self.sku.as_str().to_lowercase().contains(&keyword)
            || self.category.as_str().contains(&keyword)
    }
}
