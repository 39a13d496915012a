mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;
use storefront::domain::aggregates::Role;

async fn setup() -> (TestApp, String, String) {
    let app = TestApp::new();
    let (_, admin_token) = app.user("admin@shop.test", Role::Admin).await;
    let (_, token) = app.user("buyer@shop.test", Role::Customer).await;
    let tee = app.product(&admin_token, "TEE-1", 10_000).await;
    (app, token, tee)
}

#[tokio::test]
async fn test_cart_created_lazily() {
    let (app, token, _) = setup().await;
    let (status, body) = app.get("/api/cart", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
    assert_eq!(body["meta"], json!({ "totalQuantity": 0, "totalAmount": 0, "checkedAmount": 0 }));

    let (status, _) = app.get("/api/cart", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_add_merges_quantities() {
    let (app, token, tee) = setup().await;
    let (status, body) = app.post("/api/cart/items", Some(&token), json!({ "productId": tee, "quantity": 2 })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["items"][0]["priceSnapshot"], 10_000);
    assert_eq!(body["data"]["items"][0]["checked"], true);

    let (_, body) = app.post("/api/cart/items", Some(&token), json!({ "productId": tee, "quantity": 3 })).await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 5);
    assert_eq!(items[0]["product"]["name"], "Product TEE-1");
    assert_eq!(body["meta"]["totalQuantity"], 5);
    assert_eq!(body["meta"]["totalAmount"], 50_000);
}

#[tokio::test]
async fn test_add_rejections() {
    let (app, token, tee) = setup().await;
    let (status, _) = app.post("/api/cart/items", Some(&token), json!({ "productId": "nope" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.post("/api/cart/items", Some(&token), json!({ "productId": tee, "quantity": 0 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .post("/api/cart/items", Some(&token), json!({ "productId": uuid::Uuid::new_v4().to_string() }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_remove_and_clear() {
    let (app, token, tee) = setup().await;
    app.post("/api/cart/items", Some(&token), json!({ "productId": tee, "quantity": 2 })).await;

    let uri = format!("/api/cart/items/{tee}");
    let (status, body) = app.patch(&uri, Some(&token), json!({ "quantity": 4, "checked": false })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"][0]["quantity"], 4);
    assert_eq!(body["meta"]["totalAmount"], 40_000);
    assert_eq!(body["meta"]["checkedAmount"], 0);

    let (status, body) = app.patch(&uri, Some(&token), json!({ "quantity": 0 })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["items"].as_array().unwrap().is_empty());

    let (status, _) = app.patch(&uri, Some(&token), json!({ "quantity": 1 })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.delete(&uri, Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.delete("/api/cart/items/not-a-uuid", Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.post("/api/cart/items", Some(&token), json!({ "productId": tee })).await;
    let (status, body) = app.delete(&uri, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["items"].as_array().unwrap().is_empty());

    app.post("/api/cart/items", Some(&token), json!({ "productId": tee, "quantity": 3 })).await;
    let (status, body) = app.delete("/api/cart", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
    assert_eq!(body["meta"]["totalQuantity"], 0);
}

#[tokio::test]
async fn test_explicit_price_snapshot_wins() {
    let (app, token, tee) = setup().await;
    app.post("/api/cart/items", Some(&token), json!({ "productId": tee, "priceSnapshot": 9_000 })).await;
    let (_, body) = app.post("/api/cart/items", Some(&token), json!({ "productId": tee })).await;
    assert_eq!(body["data"]["items"][0]["priceSnapshot"], 9_000);
    let (_, body) = app.post("/api/cart/items", Some(&token), json!({ "productId": tee, "priceSnapshot": 8_000 })).await;
    assert_eq!(body["data"]["items"][0]["priceSnapshot"], 8_000);
    assert_eq!(body["data"]["items"][0]["quantity"], 3);
}

#[tokio::test]
async fn test_oversized_snapshot_rejected_and_cart_stays_readable() {
    let (app, token, tee) = setup().await;
    let (status, body) = app
        .post("/api/cart/items", Some(&token), json!({ "productId": tee, "quantity": 2, "priceSnapshot": i64::MAX }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    app.post("/api/cart/items", Some(&token), json!({ "productId": tee })).await;
    let uri = format!("/api/cart/items/{tee}");
    let (status, _) = app.patch(&uri, Some(&token), json!({ "priceSnapshot": i64::MAX })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.get("/api/cart", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"][0]["priceSnapshot"], 10_000);
    assert_eq!(body["meta"]["totalAmount"], 10_000);
}

#[tokio::test]
async fn test_quantity_merges_are_capped() {
    let (app, token, tee) = setup().await;
    let (status, _) = app.post("/api/cart/items", Some(&token), json!({ "productId": tee, "quantity": 5_000 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.post("/api/cart/items", Some(&token), json!({ "productId": tee, "quantity": 600 })).await;
    let (status, body) = app.post("/api/cart/items", Some(&token), json!({ "productId": tee, "quantity": 600 })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["items"][0]["quantity"], 999);
    assert_eq!(body["meta"]["totalAmount"], 9_990_000);

    let (status, _) = app.patch(&format!("/api/cart/items/{tee}"), Some(&token), json!({ "quantity": 1_000 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
