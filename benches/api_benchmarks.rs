use chrono::{Duration as ChronoDuration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use uuid::Uuid;

use sales_api::models::{promotion, PromotionType};
use sales_api::rate_limiter::{evaluate, normalize_endpoint, LimitPolicy, WindowState};
use sales_api::services::promotions::{calculate_discount, DiscountContext, DiscountLine};
use sales_api::services::sales::apportion_discount;
use sales_api::services::updates::versioning::compare_versions;

fn sample_promotion() -> promotion::Model {
    let now = Utc::now();
    promotion::Model {
        id: Uuid::new_v4(),
        name: "Spring".to_string(),
        description: None,
        code: "SPRING10".to_string(),
        promotion_type: PromotionType::Percentage,
        discount_value: dec!(10),
        max_discount_amount: Some(dec!(50)),
        min_order_amount: None,
        customer_type: None,
        category_ids: serde_json::json!([]),
        product_ids: serde_json::json!([]),
        start_date: now - ChronoDuration::days(1),
        end_date: now + ChronoDuration::days(30),
        usage_limit: None,
        usage_count: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn discount_benchmark(c: &mut Criterion) {
    let promotion = sample_promotion();
    let mut group = c.benchmark_group("calculate_discount");

    for size in [1usize, 5, 20, 100] {
        let lines = (0..size)
            .map(|i| DiscountLine {
                product_id: Uuid::new_v4(),
                category_id: None,
                line_total: Decimal::from(i as u32 + 1) * dec!(9.99),
            })
            .collect::<Vec<_>>();
        let ctx = DiscountContext::new(None, lines);
        group.bench_with_input(BenchmarkId::from_parameter(size), &ctx, |b, ctx| {
            b.iter(|| calculate_discount(black_box(&promotion), black_box(ctx)))
        });
    }

    group.finish();
}

fn apportion_benchmark(c: &mut Criterion) {
    let totals: Vec<Decimal> = (1..=50u32).map(|i| Decimal::from(i) * dec!(3.33)).collect();
    c.bench_function("apportion_discount_50_lines", |b| {
        b.iter(|| apportion_discount(black_box(dec!(123.45)), black_box(&totals)))
    });
}

fn rate_limit_benchmark(c: &mut Criterion) {
    let policy = LimitPolicy {
        limit: 1_000,
        window: Duration::from_secs(60),
        base_block: Duration::from_secs(30),
        max_block: Duration::from_secs(3_600),
        violation_decay: Duration::from_secs(3_600),
    };
    let start = Utc::now();

    c.bench_function("rate_limit_evaluate", |b| {
        let mut state = WindowState::new(start);
        let mut tick = 0i64;
        b.iter(|| {
            tick += 1;
            let now = start + ChronoDuration::milliseconds(tick % 120_000);
            black_box(evaluate(&mut state, &policy, now))
        })
    });

    c.bench_function("normalize_endpoint", |b| {
        b.iter(|| {
            normalize_endpoint(black_box(
                "/api/v1/sales/6f1c2d2e-8a51-4c1e-9d7a-3f4b5c6d7e8f/items/42",
            ))
        })
    });
}

fn version_benchmark(c: &mut Criterion) {
    c.bench_function("compare_versions", |b| {
        b.iter(|| compare_versions(black_box("2.10.3"), black_box("2.9.17")))
    });
}

criterion_group!(
    benches,
    discount_benchmark,
    apportion_benchmark,
    rate_limit_benchmark,
    version_benchmark
);
criterion_main!(benches);
