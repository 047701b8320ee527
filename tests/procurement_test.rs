mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use common::{dec, id_of, response_json, TestApp};

async fn create_supplier(app: &TestApp, name: &str) -> Value {
    app.post_ok(
        "/api/v1/suppliers",
        json!({ "name": name, "contact_name": "Sam", "email": "orders@supplier.example" }),
    )
    .await
}

#[tokio::test]
async fn receiving_an_order_books_stock() {
    let app = TestApp::new().await;
    let supplier = create_supplier(&app, "Acme Wholesale").await;
    let beans = app.create_product("PO-1", "6.00", 2).await;
    let filters = app.create_product("PO-2", "3.00", 0).await;

    let response = app
        .post(
            "/api/v1/purchase-orders",
            json!({
                "supplier_id": id_of(&supplier),
                "notes": "weekly restock",
                "items": [
                    { "product_id": id_of(&beans), "quantity": 20, "unit_cost": "2.50" },
                    { "product_id": id_of(&filters), "quantity": 15, "unit_cost": "0.99" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let detail = response_json(response).await["data"].clone();
    let order_id = id_of(&detail["order"]);
    assert_eq!(detail["order"]["status"], "pending");
    assert!(detail["order"]["order_number"]
        .as_str()
        .expect("order number")
        .starts_with("PO-"));
    assert_eq!(dec(&detail["order"]["total_amount"]), dec!(64.85));

    // Goods cannot arrive before approval.
    let response = app
        .post(&format!("/api/v1/purchase-orders/{}/receive", order_id), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let approved = app
        .post_ok(&format!("/api/v1/purchase-orders/{}/approve", order_id), json!({}))
        .await;
    assert_eq!(approved["status"], "approved");

    let received = app
        .post_ok(&format!("/api/v1/purchase-orders/{}/receive", order_id), json!({}))
        .await;
    assert_eq!(received["order"]["status"], "received");
    assert!(received["order"]["received_at"].is_string());
    for item in received["items"].as_array().expect("items") {
        assert_eq!(item["received_quantity"], item["quantity"]);
    }

    assert_eq!(app.stock_of(&id_of(&beans)).await, 22);
    assert_eq!(app.stock_of(&id_of(&filters)).await, 15);

    let response = app
        .post(&format!("/api/v1/purchase-orders/{}/cancel", order_id), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn orders_need_an_active_supplier_and_known_products() {
    let app = TestApp::new().await;
    let supplier = create_supplier(&app, "Ghost Goods").await;
    let product = app.create_product("PO-3", "1.00", 0).await;

    let response = app
        .post(
            "/api/v1/purchase-orders",
            json!({
                "supplier_id": id_of(&supplier),
                "items": [{ "product_id": uuid::Uuid::new_v4(), "quantity": 1, "unit_cost": "1.00" }]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .post(
            "/api/v1/purchase-orders",
            json!({ "supplier_id": id_of(&supplier), "items": [] }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.put(
        &format!("/api/v1/suppliers/{}", id_of(&supplier)),
        json!({ "is_active": false }),
    )
    .await;
    let response = app
        .post(
            "/api/v1/purchase-orders",
            json!({
                "supplier_id": id_of(&supplier),
                "items": [{ "product_id": id_of(&product), "quantity": 1, "unit_cost": "1.00" }]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn supplier_removal_depends_on_order_history() {
    let app = TestApp::new().await;
    let idle = create_supplier(&app, "Idle Imports").await;
    let busy = create_supplier(&app, "Busy Brands").await;
    let product = app.create_product("PO-4", "4.00", 0).await;

    let order = app
        .post_ok(
            "/api/v1/purchase-orders",
            json!({
                "supplier_id": id_of(&busy),
                "items": [{ "product_id": id_of(&product), "quantity": 3, "unit_cost": "2.00" }]
            }),
        )
        .await;
    let order_id = id_of(&order["order"]);

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/suppliers/{}", id_of(&busy)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let cancelled = app
        .post_ok(&format!("/api/v1/purchase-orders/{}/cancel", order_id), json!({}))
        .await;
    assert_eq!(cancelled["status"], "cancelled");

    let orders = app
        .get_ok(&format!(
            "/api/v1/suppliers/{}/purchase-orders?status=cancelled",
            id_of(&busy)
        ))
        .await;
    assert_eq!(orders.as_array().expect("orders").len(), 1);

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/suppliers/{}", id_of(&busy)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"], "deactivated");

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/suppliers/{}", id_of(&idle)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"], "deleted");

    let listed = app
        .get_ok(&format!("/api/v1/purchase-orders?supplier_id={}", id_of(&busy)))
        .await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["items"][0]["status"], "cancelled");
}
