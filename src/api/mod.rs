//! HTTP surface: router, response envelope and handlers.

pub mod carts;
pub mod error;
pub mod extract;
pub mod orders;
pub mod products;
pub mod users;

use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Success envelope: `{ success: true, message?, data, ...extra }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T, E = NoExtra> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    data: T,
    #[serde(flatten)]
    extra: E,
}

#[derive(Debug, Default, Serialize)]
pub struct NoExtra {}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { success: true, message: None, data, extra: NoExtra {} }
    }
}

impl<T, E> ApiResponse<T, E> {
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds sibling fields next to `data` (pagination, cart totals, tokens).
    pub fn extra<X>(self, extra: X) -> ApiResponse<T, X> {
        ApiResponse { success: self.success, message: self.message, data: self.data, extra }
    }
}

impl<T: Serialize, E: Serialize> IntoResponse for ApiResponse<T, E> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    Router::new()
        .route("/", get(banner))
        .route("/api", get(banner))
        .route("/health", get(health))
        .nest("/api/users", users::routes())
        .nest("/api/products", products::routes())
        .nest("/api/cart", carts::routes())
        .nest("/api/orders", orders::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn banner() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "storefront API is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.store.backend_name();
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "healthy", "service": "storefront", "storage": backend, "database": "connected" })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unhealthy", "service": "storefront", "storage": backend, "database": "disconnected" })),
            )
        }
    }
}
