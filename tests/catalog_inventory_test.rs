mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{id_of, response_json, TestApp};

#[tokio::test]
async fn product_creation_normalizes_sku_and_seeds_stock() {
    let app = TestApp::new().await;
    let category = app.create_category("Beverages").await;
    let category_id = id_of(&category);

    let product = app
        .create_product_in("bev-001", "3.50", 12, Some(&category_id))
        .await;
    assert_eq!(product["sku"], "BEV-001");
    assert_eq!(product["category_id"], category_id.as_str());
    assert_eq!(app.stock_of(&id_of(&product)).await, 12);

    let response = app
        .post(
            "/api/v1/products",
            json!({ "name": "Clash", "sku": "BEV-001", "price": "1.00", "cost_price": "0.50" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let listed = app
        .get_ok(&format!("/api/v1/products?category_id={}", category_id))
        .await;
    assert_eq!(listed["total"], 1);
}

#[tokio::test]
async fn negative_price_is_rejected() {
    let app = TestApp::new().await;
    let response = app
        .post(
            "/api/v1/products",
            json!({ "name": "Broken", "sku": "BAD-1", "price": "-1.00", "cost_price": "0.50" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn extreme_adjustments_are_rejected_without_touching_stock() {
    let app = TestApp::new().await;
    let product = app.create_product("INV-X", "2.00", 5).await;
    let id = id_of(&product);

    let response = app
        .post(
            &format!("/api/v1/inventory/{}/adjust", id),
            json!({ "quantity_change": i32::MIN, "reason": "typo" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stock_of(&id).await, 5);

    let response = app
        .post(
            &format!("/api/v1/inventory/{}/restock", id),
            json!({ "quantity": i32::MAX }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stock_of(&id).await, 5);
}

#[tokio::test]
async fn stock_adjustments_and_low_stock_listing() {
    let app = TestApp::new().await;
    let product = app.create_product("INV-1", "9.99", 10).await;
    let id = id_of(&product);

    let adjusted = app
        .post_ok(
            &format!("/api/v1/inventory/{}/adjust", id),
            json!({ "quantity_change": -3, "reason": "damaged" }),
        )
        .await;
    assert_eq!(adjusted["quantity"], 7);

    let response = app
        .post(
            &format!("/api/v1/inventory/{}/adjust", id),
            json!({ "quantity_change": -50, "reason": "shrinkage" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(app.stock_of(&id).await, 7);

    let response = app
        .put(
            &format!("/api/v1/inventory/{}", id),
            json!({ "quantity": 1, "reason": "cycle count" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let low = app.get_ok("/api/v1/inventory/low-stock").await;
    let low = low.as_array().expect("low stock list");
    let entry = low
        .iter()
        .find(|item| item["product_id"] == id.as_str())
        .expect("product should be low on stock");
    assert_eq!(entry["sku"], "INV-1");
    assert_eq!(entry["quantity"], 1);
    assert_eq!(entry["shortfall"], 1);

    let restocked = app
        .post_ok(
            &format!("/api/v1/inventory/{}/restock", id),
            json!({ "quantity": 10 }),
        )
        .await;
    assert_eq!(restocked["quantity"], 11);
    assert!(restocked["last_restocked_at"].is_string());

    let low = app.get_ok("/api/v1/inventory/low-stock").await;
    assert!(low
        .as_array()
        .expect("low stock list")
        .iter()
        .all(|item| item["product_id"] != id.as_str()));
}

#[tokio::test]
async fn zero_adjustment_is_invalid() {
    let app = TestApp::new().await;
    let product = app.create_product("INV-2", "2.00", 4).await;
    let response = app
        .post(
            &format!("/api/v1/inventory/{}/adjust", id_of(&product)),
            json!({ "quantity_change": 0, "reason": "noop" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stock_levels_must_be_ordered() {
    let app = TestApp::new().await;
    let product = app.create_product("INV-3", "2.00", 4).await;
    let id = id_of(&product);

    let response = app
        .put(
            &format!("/api/v1/inventory/{}/levels", id),
            json!({ "min_stock_level": 10, "max_stock_level": 5 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .put(
            &format!("/api/v1/inventory/{}/levels", id),
            json!({ "min_stock_level": 1, "max_stock_level": 20, "location": "Aisle 4" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["location"], "Aisle 4");
    assert_eq!(body["data"]["max_stock_level"], 20);
}

#[tokio::test]
async fn unknown_product_inventory_is_not_found() {
    let app = TestApp::new().await;
    let response = app
        .get(&format!("/api/v1/inventory/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Not Found");
}

#[tokio::test]
async fn category_in_use_cannot_be_deleted() {
    let app = TestApp::new().await;
    let used = app.create_category("Snacks").await;
    let unused = app.create_category("Seasonal").await;
    app.create_product_in("SNK-1", "1.25", 3, Some(&id_of(&used)))
        .await;

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/categories/{}", id_of(&used)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/categories/{}", id_of(&unused)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn sold_products_are_deactivated_instead_of_deleted() {
    let app = TestApp::new().await;
    let fresh = app.create_product("DEL-1", "5.00", 5).await;
    let sold = app.create_product("DEL-2", "5.00", 5).await;

    app.post_ok(
        "/api/v1/sales",
        json!({ "items": [{ "product_id": id_of(&sold), "quantity": 1 }] }),
    )
    .await;

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/products/{}", id_of(&fresh)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"], "deleted");
    let response = app
        .get(&format!("/api/v1/products/{}", id_of(&fresh)))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/products/{}", id_of(&sold)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"], "deactivated");
    let detail = app
        .get_ok(&format!("/api/v1/products/{}", id_of(&sold)))
        .await;
    assert_eq!(detail["product"]["is_active"], false);
}
