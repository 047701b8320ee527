mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use common::{dec, id_of, response_json, TestApp};

fn window() -> (String, String) {
    let now = Utc::now();
    (
        (now - Duration::days(1)).to_rfc3339(),
        (now + Duration::days(30)).to_rfc3339(),
    )
}

async fn create_promotion(app: &TestApp, body: Value) -> Value {
    let response = app.post("/api/v1/promotions", body).await;
    let status = response.status();
    let json = response_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "create promotion failed: {}", json);
    json["data"].clone()
}

#[tokio::test]
async fn code_applies_to_a_sale_and_counts_usage() {
    let app = TestApp::new().await;
    let (start, end) = window();
    let product = app.create_product("PRM-1", "20.00", 10).await;

    let promotion = create_promotion(
        &app,
        json!({
            "name": "Ten off",
            "code": "save10",
            "promotion_type": "percentage",
            "discount_value": "10",
            "start_date": start,
            "end_date": end,
            "usage_limit": 1
        }),
    )
    .await;
    assert_eq!(promotion["code"], "SAVE10");
    assert_eq!(promotion["usage_count"], 0);

    let preview = app
        .post_ok(
            "/api/v1/promotions/evaluate",
            json!({ "code": "Save10", "items": [{ "product_id": id_of(&product), "quantity": 2 }] }),
        )
        .await;
    assert_eq!(preview["eligible"], true);
    assert_eq!(dec(&preview["order_subtotal"]), dec!(40.00));
    assert_eq!(dec(&preview["discount_amount"]), dec!(4.00));

    let sale = app
        .post_ok(
            "/api/v1/sales",
            json!({
                "items": [{ "product_id": id_of(&product), "quantity": 2 }],
                "promotion_codes": ["save10"]
            }),
        )
        .await;
    assert_eq!(dec(&sale["sale"]["discount_amount"]), dec!(4.00));
    assert_eq!(dec(&sale["sale"]["total_amount"]), dec!(36.00));
    assert_eq!(sale["promotions"][0]["promotion_code"], "SAVE10");
    assert_eq!(dec(&sale["items"][0]["line_total"]), dec!(36.00));

    let fetched = app
        .get_ok(&format!("/api/v1/promotions/{}", id_of(&promotion)))
        .await;
    assert_eq!(fetched["usage_count"], 1);

    // The single use is spent, so the next sale fails and leaves stock alone.
    let response = app
        .post(
            "/api/v1/sales",
            json!({
                "items": [{ "product_id": id_of(&product), "quantity": 1 }],
                "promotion_codes": ["SAVE10"]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.stock_of(&id_of(&product)).await, 8);

    let sale_id = sale["sale"]["id"].as_str().expect("sale id").to_string();
    app.post_ok(&format!("/api/v1/sales/{}/cancel", sale_id), json!({}))
        .await;
    let fetched = app
        .get_ok(&format!("/api/v1/promotions/{}", id_of(&promotion)))
        .await;
    assert_eq!(fetched["usage_count"], 0);
}

#[tokio::test]
async fn fixed_discount_respects_minimum_and_targeting() {
    let app = TestApp::new().await;
    let (start, end) = window();
    let category = app.create_category("Garden").await;
    let rake = app
        .create_product_in("PRM-2", "15.00", 10, Some(&id_of(&category)))
        .await;
    let lamp = app.create_product("PRM-3", "30.00", 10).await;

    create_promotion(
        &app,
        json!({
            "name": "Garden fiver",
            "code": "GARDEN5",
            "promotion_type": "fixed_amount",
            "discount_value": "5.00",
            "min_order_amount": "25.00",
            "category_ids": [id_of(&category)],
            "start_date": start,
            "end_date": end
        }),
    )
    .await;

    let below = app
        .post_ok(
            "/api/v1/promotions/evaluate",
            json!({ "code": "GARDEN5", "items": [{ "product_id": id_of(&rake), "quantity": 1 }] }),
        )
        .await;
    assert_eq!(below["eligible"], false);
    assert_eq!(below["reason"], "below_minimum_order");
    assert_eq!(dec(&below["discount_amount"]), dec!(0));

    let untargeted = app
        .post_ok(
            "/api/v1/promotions/evaluate",
            json!({ "code": "GARDEN5", "items": [{ "product_id": id_of(&lamp), "quantity": 1 }] }),
        )
        .await;
    assert_eq!(untargeted["reason"], "no_eligible_items");

    let mixed = app
        .post_ok(
            "/api/v1/promotions/evaluate",
            json!({
                "code": "GARDEN5",
                "items": [
                    { "product_id": id_of(&rake), "quantity": 1 },
                    { "product_id": id_of(&lamp), "quantity": 1 }
                ]
            }),
        )
        .await;
    assert_eq!(mixed["eligible"], true);
    assert_eq!(dec(&mixed["discount_amount"]), dec!(5.00));
}

#[tokio::test]
async fn customer_type_restriction_is_enforced() {
    let app = TestApp::new().await;
    let (start, end) = window();
    let product = app.create_product("PRM-4", "50.00", 10).await;
    let regular = app.create_customer("Regular Joe", "joe@example.com").await;
    let vip = app
        .post_ok(
            "/api/v1/customers",
            json!({ "name": "Very Important", "email": "vip@example.com", "customer_type": "vip" }),
        )
        .await;

    create_promotion(
        &app,
        json!({
            "name": "VIP quarter",
            "code": "VIP25",
            "promotion_type": "percentage",
            "discount_value": "25",
            "max_discount_amount": "10.00",
            "customer_type": "vip",
            "start_date": start,
            "end_date": end
        }),
    )
    .await;

    let items = json!([{ "product_id": id_of(&product), "quantity": 1 }]);
    let denied = app
        .post_ok(
            "/api/v1/promotions/evaluate",
            json!({ "code": "VIP25", "customer_id": id_of(&regular), "items": items }),
        )
        .await;
    assert_eq!(denied["eligible"], false);
    assert_eq!(denied["reason"], "customer_type_mismatch");

    let capped = app
        .post_ok(
            "/api/v1/promotions/evaluate",
            json!({ "code": "VIP25", "customer_id": id_of(&vip), "items": items }),
        )
        .await;
    assert_eq!(capped["eligible"], true);
    assert_eq!(dec(&capped["discount_amount"]), dec!(10.00));
}

#[tokio::test]
async fn invalid_rules_and_duplicate_codes_are_rejected() {
    let app = TestApp::new().await;
    let (start, end) = window();

    let response = app
        .post(
            "/api/v1/promotions",
            json!({
                "name": "Too generous",
                "code": "ALLFREE",
                "promotion_type": "percentage",
                "discount_value": "150",
                "start_date": start,
                "end_date": end
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post(
            "/api/v1/promotions",
            json!({
                "name": "Backwards",
                "code": "BACKWARDS",
                "promotion_type": "fixed_amount",
                "discount_value": "1",
                "start_date": end,
                "end_date": start
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json!({
        "name": "Once",
        "code": "ONCE",
        "promotion_type": "fixed_amount",
        "discount_value": "2.00",
        "start_date": start,
        "end_date": end
    });
    create_promotion(&app, body.clone()).await;
    let response = app.post("/api/v1/promotions", body).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .post(
            "/api/v1/promotions/evaluate",
            json!({ "code": "NOPE", "items": [{ "product_id": uuid::Uuid::new_v4(), "quantity": 1 }] }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deactivated_promotion_no_longer_applies() {
    let app = TestApp::new().await;
    let (start, end) = window();
    let product = app.create_product("PRM-5", "10.00", 5).await;
    let promotion = create_promotion(
        &app,
        json!({
            "name": "Short lived",
            "code": "BRIEF",
            "promotion_type": "fixed_amount",
            "discount_value": "1.00",
            "start_date": start,
            "end_date": end
        }),
    )
    .await;

    let active = app.get_ok("/api/v1/promotions?active_only=true").await;
    assert_eq!(active.as_array().expect("promotions").len(), 1);

    let deactivated = app
        .post_ok(
            &format!("/api/v1/promotions/{}/deactivate", id_of(&promotion)),
            json!({}),
        )
        .await;
    assert_eq!(deactivated["is_active"], false);

    let active = app.get_ok("/api/v1/promotions?active_only=true").await;
    assert!(active.as_array().expect("promotions").is_empty());

    let evaluation = app
        .post_ok(
            "/api/v1/promotions/evaluate",
            json!({ "code": "BRIEF", "items": [{ "product_id": id_of(&product), "quantity": 1 }] }),
        )
        .await;
    assert_eq!(evaluation["eligible"], false);
    assert_eq!(evaluation["reason"], "inactive");
}

#[tokio::test]
async fn rules_and_targeting_can_be_changed_or_cleared() {
    let app = TestApp::new().await;
    let (start, end) = window();
    let category = app.create_category("Kitchen").await;
    let pan = app
        .create_product_in("PRM-6", "12.00", 10, Some(&id_of(&category)))
        .await;
    let mug = app.create_product("PRM-7", "8.00", 10).await;
    let regular = app.create_customer("Plain Pat", "pat@example.com").await;

    let promotion = create_promotion(
        &app,
        json!({
            "name": "Kitchen half",
            "code": "KITCHEN50",
            "promotion_type": "percentage",
            "discount_value": "50",
            "max_discount_amount": "3.00",
            "min_order_amount": "100.00",
            "category_ids": [id_of(&category)],
            "start_date": start,
            "end_date": end,
            "usage_limit": 5
        }),
    )
    .await;
    let uri = format!("/api/v1/promotions/{}", id_of(&promotion));
    let basket = json!({
        "code": "KITCHEN50",
        "customer_id": id_of(&regular),
        "items": [{ "product_id": id_of(&mug), "quantity": 1 }]
    });

    let evaluation = app.post_ok("/api/v1/promotions/evaluate", basket.clone()).await;
    assert_eq!(evaluation["reason"], "below_minimum_order");

    // Absent fields are kept; explicit nulls and new lists replace them.
    let response = app
        .put(
            &uri,
            json!({
                "min_order_amount": null,
                "max_discount_amount": null,
                "usage_limit": null,
                "category_ids": [],
                "product_ids": [id_of(&mug)]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = response_json(response).await["data"].clone();
    assert!(updated["min_order_amount"].is_null());
    assert!(updated["max_discount_amount"].is_null());
    assert!(updated["usage_limit"].is_null());
    assert_eq!(updated["name"], "Kitchen half");

    let evaluation = app.post_ok("/api/v1/promotions/evaluate", basket.clone()).await;
    assert_eq!(evaluation["eligible"], true);
    assert_eq!(dec(&evaluation["discount_amount"]), dec!(4.00));

    let pan_only = json!({
        "code": "KITCHEN50",
        "items": [{ "product_id": id_of(&pan), "quantity": 1 }]
    });
    let evaluation = app.post_ok("/api/v1/promotions/evaluate", pan_only).await;
    assert_eq!(evaluation["reason"], "no_eligible_items");

    let response = app.put(&uri, json!({ "customer_type": "vip" })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let evaluation = app.post_ok("/api/v1/promotions/evaluate", basket).await;
    assert_eq!(evaluation["reason"], "customer_type_mismatch");

    let response = app.put(&uri, json!({ "usage_limit": 0 })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
