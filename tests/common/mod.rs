#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;
use tower::ServiceExt;

use storefront::auth::{hash_password, JwtKeys};
use storefront::config::JwtConfig;
use storefront::domain::aggregates::{Role, User};
use storefront::domain::value_objects::Email;
use storefront::messaging::EventPublisher;
use storefront::payment::{GatewayError, GatewayPayment, PaymentGateway, PaymentVerifier};
use storefront::repository::Store;
use storefront::{api, AppState};

/// Gateway double answering from a fixed table of payments.
#[derive(Default)]
pub struct StubGateway {
    payments: Mutex<HashMap<String, GatewayPayment>>,
    calls: AtomicUsize,
    /// When set, every lookup waits here so concurrent checkouts overlap.
    barrier: Option<Barrier>,
}

impl StubGateway {
    pub fn with_barrier(parties: usize) -> Self {
        Self { barrier: Some(Barrier::new(parties)), ..Self::default() }
    }

    pub fn add_paid(&self, imp_uid: &str, merchant_uid: &str, amount: i64) {
        self.add(GatewayPayment {
            imp_uid: imp_uid.to_string(),
            merchant_uid: merchant_uid.to_string(),
            amount,
            status: "paid".to_string(),
            pay_method: Some("card".to_string()),
            paid_at: Some(1_700_000_000),
        });
    }

    pub fn add(&self, payment: GatewayPayment) {
        self.payments.lock().insert(payment.imp_uid.clone(), payment);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn fetch_payment(&self, transaction_id: &str) -> Result<Option<GatewayPayment>, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        Ok(self.payments.lock().get(transaction_id).cloned())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub gateway: Arc<StubGateway>,
    pub jwt: JwtKeys,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_gateway(StubGateway::default())
    }

    pub fn with_gateway(gateway: StubGateway) -> Self {
        let gateway = Arc::new(gateway);
        let jwt = JwtKeys::new(&JwtConfig { secret: "test-secret".into(), ttl: chrono::Duration::days(7) });
        let state = AppState::new(
            Store::memory(),
            jwt.clone(),
            PaymentVerifier::new(gateway.clone()),
            EventPublisher::disabled(),
        );
        Self { router: api::router(state.clone()), state, gateway, jwt }
    }

    /// Stores an account directly and returns it with a bearer token.
    pub async fn user(&self, email: &str, role: Role) -> (User, String) {
        let hash = hash_password("password1").unwrap();
        let user = User::register(Email::parse(email).unwrap(), "Tester", hash, role, None);
        let user = self.state.store.users.insert(user).await.unwrap();
        let token = self.jwt.issue(&user).unwrap();
        (user, token)
    }

    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Creates a catalog product through the admin API and returns its id.
    pub async fn product(&self, admin_token: &str, sku: &str, price: i64) -> String {
        let (status, body) = self
            .post(
                "/api/products",
                Some(admin_token),
                serde_json::json!({
                    "sku": sku, "name": format!("Product {sku}"), "price": price,
                    "category": "tops", "image": format!("/img/{sku}.png")
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }
}
