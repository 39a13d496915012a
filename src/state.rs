use crate::auth::JwtKeys;
use crate::messaging::EventPublisher;
use crate::payment::PaymentVerifier;
use crate::repository::Store;
use crate::services::{CartService, CatalogService, OrderService, UserService};

/// Shared handler state; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub users: UserService,
    pub catalog: CatalogService,
    pub carts: CartService,
    pub orders: OrderService,
}

impl AppState {
    pub fn new(store: Store, jwt: JwtKeys, verifier: PaymentVerifier, events: EventPublisher) -> Self {
        let carts = CartService::new(store.clone(), events.clone());
        Self {
            users: UserService::new(store.clone(), jwt),
            catalog: CatalogService::new(store.clone(), events.clone()),
            orders: OrderService::new(store.clone(), verifier, carts.clone(), events),
            carts,
            store,
        }
    }
}
