mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::json;

use common::{dec, id_of, response_json, TestApp};

#[tokio::test]
async fn customer_crud_lifecycle() {
    let app = TestApp::new().await;

    let created = app.create_customer("Ada Lovelace", "Ada@Example.com").await;
    let id = id_of(&created);
    assert_eq!(created["email"], "ada@example.com");
    assert_eq!(created["customer_type"], "regular");
    assert_eq!(dec(&created["total_purchases"]), dec!(0));

    let fetched = app.get_ok(&format!("/api/v1/customers/{}", id)).await;
    assert_eq!(fetched["name"], "Ada Lovelace");

    let response = app
        .put(
            &format!("/api/v1/customers/{}", id),
            json!({ "phone": "+44 20 7946 0000", "customer_type": "vip" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = response_json(response).await;
    assert_eq!(updated["data"]["customer_type"], "vip");
    assert_eq!(updated["data"]["phone"], "+44 20 7946 0000");

    let response = app
        .request(Method::DELETE, &format!("/api/v1/customers/{}", id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"], "deleted");

    let response = app.get(&format!("/api/v1/customers/{}", id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let app = TestApp::new().await;
    app.create_customer("First", "dup@example.com").await;

    let response = app
        .post(
            "/api/v1/customers",
            json!({ "name": "Second", "email": "DUP@example.com" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Conflict");
}

#[tokio::test]
async fn invalid_email_is_rejected() {
    let app = TestApp::new().await;
    let response = app
        .post(
            "/api/v1/customers",
            json!({ "name": "Nobody", "email": "not-an-email" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_paginates_and_searches() {
    let app = TestApp::new().await;
    for i in 0..5 {
        app.create_customer(&format!("Customer {}", i), &format!("c{}@example.com", i))
            .await;
    }
    app.create_customer("Grace Hopper", "grace@navy.example").await;

    let page = app.get_ok("/api/v1/customers?page=2&per_page=2").await;
    assert_eq!(page["total"], 6);
    assert_eq!(page["page"], 2);
    assert_eq!(page["per_page"], 2);
    assert_eq!(page["total_pages"], 3);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);

    let found = app.get_ok("/api/v1/customers?search=grace").await;
    assert_eq!(found["total"], 1);
    assert_eq!(found["items"][0]["name"], "Grace Hopper");
}

#[tokio::test]
async fn referenced_customer_needs_force_and_is_deactivated() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Buyer", "buyer@example.com").await;
    let customer_id = id_of(&customer);
    let product = app.create_product("CUST-1", "10.00", 5).await;

    app.post_ok(
        "/api/v1/sales",
        json!({
            "customer_id": customer_id,
            "items": [{ "product_id": id_of(&product), "quantity": 1 }]
        }),
    )
    .await;

    let response = app
        .request(Method::DELETE, &format!("/api/v1/customers/{}", customer_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/customers/{}?force=true", customer_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"], "deactivated");

    let fetched = app.get_ok(&format!("/api/v1/customers/{}", customer_id)).await;
    assert_eq!(fetched["is_active"], false);

    let active = app.get_ok("/api/v1/customers").await;
    assert_eq!(active["total"], 0);
    let all = app.get_ok("/api/v1/customers?include_inactive=true").await;
    assert_eq!(all["total"], 1);
}

#[tokio::test]
async fn stats_follow_completed_sales() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Regular", "regular@example.com").await;
    let customer_id = id_of(&customer);
    let product = app.create_product("CUST-2", "25.00", 10).await;

    for quantity in [1, 3] {
        let sale = app
            .post_ok(
                "/api/v1/sales",
                json!({
                    "customer_id": customer_id,
                    "items": [{ "product_id": id_of(&product), "quantity": quantity }]
                }),
            )
            .await;
        let sale_id = sale["sale"]["id"].as_str().unwrap().to_string();
        app.post_ok(&format!("/api/v1/sales/{}/complete", sale_id), json!({}))
            .await;
    }

    let stats = app
        .get_ok(&format!("/api/v1/customers/{}/stats", customer_id))
        .await;
    assert_eq!(stats["completed_sales"], 2);
    assert_eq!(dec(&stats["total_spent"]), dec!(100.00));
    assert_eq!(dec(&stats["average_order_value"]), dec!(50.00));
    assert!(stats["last_purchase_at"].is_string());

    let customer = app.get_ok(&format!("/api/v1/customers/{}", customer_id)).await;
    assert_eq!(dec(&customer["total_purchases"]), dec!(100.00));

    let history = app
        .get_ok(&format!("/api/v1/customers/{}/history", customer_id))
        .await;
    assert_eq!(history["sales"].as_array().unwrap().len(), 2);
}
