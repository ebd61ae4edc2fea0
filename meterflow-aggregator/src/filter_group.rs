//! Filter groups: how a usage price's `filter_values` routes events to it,
//! and how ties between competing usage prices on the same meter are broken.

use meterflow_core::ids::PriceId;
use meterflow_core::model::subscription::SubscriptionLineItem;
use meterflow_core::ports::FilterGroupQuery;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterGroup {
    pub price_id: PriceId,
    pub constraints: BTreeMap<String, Vec<String>>,
}

impl FilterGroup {
    /// `10 * (#keys) + Σ(#values)`. A price with more, and more specific,
    /// filter keys should win over a broader one when both could match the
    /// same event — e.g. `{region: [us]}` beats `{}` (the unrestricted
    /// default usage price on the same meter).
    pub fn priority(&self) -> u32 {
        let key_count = self.constraints.len() as u32;
        let value_count: u32 = self.constraints.values().map(|v| v.len() as u32).sum();
        10 * key_count + value_count
    }

    pub fn filter_group_id(&self) -> String {
        self.price_id.0.clone()
    }

    pub fn to_query(&self) -> FilterGroupQuery {
        FilterGroupQuery {
            filter_group_id: self.filter_group_id(),
            constraints: self.constraints.clone(),
        }
    }
}

/// Builds one filter group per usage line item, highest priority first, with
/// ties broken by ascending `price_id` for determinism.
pub fn build_filter_groups(line_items: &[SubscriptionLineItem]) -> Vec<FilterGroup> {
    let mut groups: Vec<FilterGroup> = line_items
        .iter()
        .filter(|li| li.price.is_usage())
        .map(|li| FilterGroup {
            price_id: li.price_id.clone(),
            constraints: li
                .price
                .filter_values
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
                .collect(),
        })
        .collect();
    groups.sort_by(|a, b| {
        b.priority()
            .cmp(&a.priority())
            .then_with(|| a.price_id.0.cmp(&b.price_id.0))
    });
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(constraints: &[(&str, &[&str])]) -> FilterGroup {
        FilterGroup {
            price_id: PriceId("p".into()),
            constraints: constraints
                .iter()
                .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
                .collect(),
        }
    }

    #[test]
    fn more_specific_group_outranks_broader_one() {
        let specific = group(&[("region", &["us", "eu"])]);
        let broad = group(&[]);
        assert!(specific.priority() > broad.priority());
    }

    #[test]
    fn priority_formula() {
        let g = group(&[("region", &["us", "eu"]), ("plan", &["pro"])]);
        // 10 * 2 keys + 3 values = 23
        assert_eq!(g.priority(), 23);
    }
}
