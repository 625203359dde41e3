//! Numbers derived from passed-through upstream items.

use std::collections::HashSet;

use serde_json::Value;

pub const PRICE_FIELD: &str = "recentAveragePrice";
pub const ASSET_ID_FIELD: &str = "assetId";

/// Coerces a JSON value into a price. Numbers are used as-is and numeric
/// strings are parsed. Everything else counts as zero.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    n.filter(|n| n.is_finite()).unwrap_or(0.0)
}

/// Sum of the recent average price over all items
pub fn total_value(items: &[Value]) -> f64 {
    items
        .iter()
        .map(|item| coerce_number(item.get(PRICE_FIELD)))
        .sum()
}

/// Whether any of the items carries an asset id from the allowlist
pub fn owns_any<'i>(items: impl IntoIterator<Item = &'i Value>, allowlist: &HashSet<u64>) -> bool {
    if allowlist.is_empty() {
        return false;
    }

    items
        .into_iter()
        .filter_map(|item| item.get(ASSET_ID_FIELD).and_then(Value::as_u64))
        .any(|id| allowlist.contains(&id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mixed_prices() {
        let items = vec![
            json!({ "recentAveragePrice": 100 }),
            json!({ "recentAveragePrice": null }),
            json!({ "recentAveragePrice": "50" }),
        ];

        assert_eq!(total_value(&items), 150.0);
    }

    #[test]
    fn missing_and_garbage_prices() {
        let items = vec![
            json!({ "name": "Dominus" }),
            json!({ "recentAveragePrice": "lots" }),
            json!({ "recentAveragePrice": [1, 2] }),
            json!({ "recentAveragePrice": 12.5 }),
        ];

        assert_eq!(total_value(&items), 12.5);
        assert_eq!(total_value(&[]), 0.0);
    }

    #[test]
    fn allowlist_membership() {
        let items = vec![json!({ "assetId": 10 }), json!({ "assetId": "11" }), json!({})];
        let allowlist: HashSet<u64> = [11, 12].into_iter().collect();
        assert!(!owns_any(&items, &allowlist));

        let allowlist: HashSet<u64> = [10].into_iter().collect();
        assert!(owns_any(&items, &allowlist));

        assert!(!owns_any(&items, &HashSet::new()));
    }
}
