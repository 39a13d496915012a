//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Upper bound on a single line's quantity; larger merges are clamped.
pub const MAX_ITEM_QUANTITY: u32 = 999;
/// Upper bound on a unit price or price snapshot, in KRW.
pub const MAX_UNIT_PRICE: i64 = 100_000_000;

/// One cart per user, created lazily and never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub status: CartStatus,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: u32,
    /// Unit price captured when the item was added.
    pub price_snapshot: i64,
    /// Selected for checkout.
    pub checked: bool,
}

impl CartItem {
    pub fn line_total(&self) -> i64 { self.price_snapshot.saturating_mul(i64::from(self.quantity)) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus { #[default] Active, Converted }

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Active => "active", Self::Converted => "converted" }
    }
}

impl FromStr for CartStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "converted" => Ok(Self::Converted),
            other => Err(format!("unknown cart status {other:?}")),
        }
    }
}

/// Partial update of a single line. A quantity of zero or less removes the line.
#[derive(Clone, Debug, Default)]
pub struct CartItemPatch {
    pub quantity: Option<i64>,
    pub checked: Option<bool>,
    pub price_snapshot: Option<i64>,
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), user_id, items: vec![], status: CartStatus::Active,
            memo: None, created_at: now, updated_at: now,
        }
    }

    pub fn item(&self, product_id: Uuid) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    /// Adds a line or merges into the existing line for the same product.
    /// `catalog_price` fills the snapshot when none was given and none is held.
    pub fn add_or_merge(
        &mut self,
        product_id: Uuid,
        quantity: u32,
        price_snapshot: Option<i64>,
        checked: Option<bool>,
        catalog_price: i64,
    ) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == product_id) {
            existing.quantity = existing.quantity.saturating_add(quantity).min(MAX_ITEM_QUANTITY);
            if let Some(checked) = checked { existing.checked = checked; }
            match price_snapshot {
                Some(price) => existing.price_snapshot = price,
                None if existing.price_snapshot == 0 => existing.price_snapshot = catalog_price,
                None => {}
            }
        } else {
            self.items.push(CartItem {
                product_id,
                quantity: quantity.min(MAX_ITEM_QUANTITY),
                price_snapshot: price_snapshot.unwrap_or(catalog_price),
                checked: checked.unwrap_or(true),
            });
        }
        self.touch();
    }

    pub fn update_item(&mut self, product_id: Uuid, patch: &CartItemPatch) -> Result<(), CartError> {
        let idx = self.items.iter().position(|i| i.product_id == product_id).ok_or(CartError::ItemNotFound)?;
        match patch.quantity {
            Some(q) if q <= 0 => { self.items.remove(idx); }
            Some(q) => {
                let item = &mut self.items[idx];
                item.quantity = u32::try_from(q).unwrap_or(u32::MAX).min(MAX_ITEM_QUANTITY);
                if let Some(checked) = patch.checked { item.checked = checked; }
                if let Some(price) = patch.price_snapshot { item.price_snapshot = price; }
            }
            None => {
                let item = &mut self.items[idx];
                if let Some(checked) = patch.checked { item.checked = checked; }
                if let Some(price) = patch.price_snapshot { item.price_snapshot = price; }
            }
        }
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.reset_status();
    }

    /// Drops every line whose product was purchased and reactivates the cart.
    /// Returns how many lines were removed.
    pub fn remove_products(&mut self, product_ids: &[Uuid]) -> usize {
        let before = self.items.len();
        self.items.retain(|i| !product_ids.contains(&i.product_id));
        self.reset_status();
        before - self.items.len()
    }

    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Sum over every line, checked or not.
    pub fn total_amount(&self) -> i64 {
        self.items.iter().map(CartItem::line_total).fold(0, i64::saturating_add)
    }

    /// Sum over lines selected for checkout.
    pub fn checked_amount(&self) -> i64 {
        self.items.iter().filter(|i| i.checked).map(CartItem::line_total).fold(0, i64::saturating_add)
    }

    fn reset_status(&mut self) {
        self.status = CartStatus::Active;
        self.memo = None;
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound }
impl std::error::Error for CartError {}
impl fmt::Display for CartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Item not found in cart") }
}
