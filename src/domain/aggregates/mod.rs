//! Aggregates module
pub mod cart;
pub mod order;
pub mod product;
pub mod user;

pub use cart::{Cart, CartError, CartItem, CartItemPatch, CartStatus, MAX_ITEM_QUANTITY, MAX_UNIT_PRICE};
pub use order::{
    Delivery, Discounts, HistoryEntry, Order, OrderDraft, OrderItem, OrderStatus, PaymentRecord, Recipient, ShippingAddress,
    StatusChange, UnknownStatus,
};
pub use product::{Product, ProductPatch};
pub use user::{Role, User, UserPatch};
