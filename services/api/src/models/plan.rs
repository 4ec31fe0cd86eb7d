//! Subscription plan catalog

use serde::Serialize;

/// A purchasable plan; prices are in kopecks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: &'static str,
    pub name: &'static str,
    pub duration_days: i64,
    pub price: i64,
    pub currency: &'static str,
}

pub const PLANS: [Plan; 3] = [
    Plan {
        id: "week",
        name: "Week",
        duration_days: 7,
        price: 99_000,
        currency: "RUB",
    },
    Plan {
        id: "month",
        name: "Month",
        duration_days: 30,
        price: 299_000,
        currency: "RUB",
    },
    Plan {
        id: "quarter",
        name: "Quarter",
        duration_days: 90,
        price: 749_000,
        currency: "RUB",
    },
];

pub fn find_plan(id: &str) -> Option<&'static Plan> {
    PLANS.iter().find(|plan| plan.id == id)
}

/// Major-unit decimal string, e.g. `2990.00`
pub fn format_amount(minor_units: i64) -> String {
    format!("{}.{:02}", minor_units / 100, minor_units % 100)
}

/// Parse a major-unit amount such as `2990`, `2990.5` or `2990.00`
pub fn parse_amount(value: &str) -> Option<i64> {
    let value = value.trim();
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if fraction.len() > 2 || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let fraction: i64 = if fraction.is_empty() {
        0
    } else {
        format!("{:0<2}", fraction).parse().ok()?
    };
    whole.checked_mul(100)?.checked_add(fraction)
}
