//! Business services. Each service owns a shared pool handle and the event
//! sender; multi-row changes run inside one database transaction.

pub mod categories;
pub mod customers;
pub mod inventory;
pub mod products;
pub mod promotions;
pub mod purchase_orders;
pub mod reports;
pub mod returns;
pub mod sales;
pub mod suppliers;
pub mod updates;

use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

pub const DEFAULT_LIMIT: u64 = 20;
pub const MAX_LIMIT: u64 = 100;

/// Rounds a monetary amount to cents, midpoints away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Human-facing document number such as `SAL-20240615-3F9A1C2B`.
pub fn document_number(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        prefix,
        Utc::now().format("%Y%m%d"),
        suffix[..8].to_uppercase()
    )
}

/// Clamp a `(page, per_page)` pair into `(limit, offset)`.
pub fn page_window(page: u64, per_page: u64) -> (u64, u64) {
    let limit = if per_page == 0 {
        DEFAULT_LIMIT
    } else {
        per_page.min(MAX_LIMIT)
    };
    (limit, page.max(1).saturating_sub(1) * limit)
}

/// Trims and drops blank optional strings.
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn money_rounds_half_away_from_zero() {
        assert_eq!(round_money(dec!(2.345)), dec!(2.35));
        assert_eq!(round_money(dec!(2.344)), dec!(2.34));
        assert_eq!(round_money(dec!(-1.005)), dec!(-1.01));
    }

    #[test]
    fn document_numbers_carry_prefix_and_date() {
        let number = document_number("SAL");
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "SAL");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn page_window_clamps() {
        assert_eq!(page_window(1, 20), (20, 0));
        assert_eq!(page_window(3, 10), (10, 20));
        assert_eq!(page_window(0, 500), (MAX_LIMIT, 0));
        assert_eq!(page_window(2, 0), (DEFAULT_LIMIT, DEFAULT_LIMIT));
    }
}
