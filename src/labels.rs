use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabelRule {
    pub label: String,
    #[serde(flatten)]
    pub threshold: Threshold,
}

/// A single greater-or-equal check against one of the profile metrics
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "metric")]
pub enum Threshold {
    AccountAgeDays { min: i64 },
    TotalValue { min: f64 },
    BadgeCount { min: usize },
    CollectibleCount { min: usize },
    CategoryCount { category: String, min: usize },
    OwnsAllowlisted,
}

#[derive(Debug, Default)]
pub struct LabelInput<'a> {
    pub account_age_days: Option<i64>,
    pub total_value: f64,
    pub collectible_count: usize,
    pub badge_count: usize,
    pub category_counts: Option<&'a BTreeMap<String, usize>>,
    pub owns_allowlisted: bool,
}

impl Threshold {
    pub fn is_met(&self, input: &LabelInput<'_>) -> bool {
        match self {
            Self::AccountAgeDays { min } => input.account_age_days.map_or(false, |age| age >= *min),
            Self::TotalValue { min } => input.total_value >= *min,
            Self::BadgeCount { min } => input.badge_count >= *min,
            Self::CollectibleCount { min } => input.collectible_count >= *min,
            Self::CategoryCount { category, min } => {
                let count = input
                    .category_counts
                    .and_then(|counts| counts.get(category))
                    .copied()
                    .unwrap_or(0);
                count >= *min
            }
            Self::OwnsAllowlisted => input.owns_allowlisted,
        }
    }
}

/// Labels of every rule whose threshold is met, in rule order
pub fn assign_labels(input: &LabelInput<'_>, rules: &[LabelRule]) -> Vec<String> {
    rules
        .iter()
        .filter(|rule| rule.threshold.is_met(input))
        .map(|rule| rule.label.clone())
        .collect()
}

/// Whole days between the RFC 3339 `created` timestamp and `now`
pub fn account_age_days(created: &str, now: chrono::DateTime<chrono::Utc>) -> Option<i64> {
    let created = match chrono::DateTime::parse_from_rfc3339(created) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Parsing creation date {:?}: {:?}", created, e);
            return None;
        }
    };

    Some((now - created.with_timezone(&chrono::Utc)).num_days().max(0))
}

pub fn default_rules() -> Vec<LabelRule> {
    let rule = |label: &str, threshold: Threshold| LabelRule {
        label: label.to_string(),
        threshold,
    };

    vec![
        rule("Seasoned", Threshold::AccountAgeDays { min: 100 }),
        rule("Veteran", Threshold::AccountAgeDays { min: 3 * 365 }),
        rule("OG", Threshold::AccountAgeDays { min: 10 * 365 }),
        rule("Rich", Threshold::TotalValue { min: 10_000.0 }),
        rule("Whale", Threshold::TotalValue { min: 100_000.0 }),
        rule("Collector", Threshold::CollectibleCount { min: 25 }),
        rule("Badge Hunter", Threshold::BadgeCount { min: 500 }),
        rule(
            "Hat Stack",
            Threshold::CategoryCount {
                category: "Hat".to_string(),
                min: 50,
            },
        ),
        rule("Funny", Threshold::OwnsAllowlisted),
    ]
}
