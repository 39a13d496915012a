//! Application services: the workflows behind each route group.

pub mod carts;
pub mod catalog;
pub mod orders;
pub mod users;

pub use carts::{CartLine, CartMeta, CartService, CartView};
pub use catalog::{CatalogService, Pagination, ProductPage};
pub use orders::{CreatedOrder, OrderService, OrderSubmission, OrderView, StatusUpdate};
pub use users::UserService;

use uuid::Uuid;

/// Path ids that are not UUIDs cannot name a stored record.
pub(crate) fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}
