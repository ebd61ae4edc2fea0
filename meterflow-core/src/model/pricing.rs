//! Price definitions: the data the Pricing Engine is table-driven over.
//!
//! Fixed and usage prices are a single tagged type with one `tier model`
//! concept, so the engine that consumes them never branches on "is this a
//! fixed or usage price" beyond the initial match — tier ladders are data.

use crate::ids::MeterId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriodUnit {
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceCadence {
    /// Bill at the start of the period the charge covers.
    Advance,
    /// Bill at the end of the period the charge covers.
    Arrear,
}

/// One rung of a tiered price ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// Upper bound of this tier (exclusive), `None` for the final open tier.
    pub up_to: Option<Decimal>,
    pub unit_price: Decimal,
    /// Flat fee charged once per invoice for usage reaching this tier,
    /// applicable to "package"/"bucket" style tiers.
    pub flat_fee: Option<Decimal>,
}

/// How a usage price's tier ladder is applied to a quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TierModel {
    /// Every unit is priced at the rate of the tier it individually falls
    /// into ("graduated"): the first N units at tier 1's rate, the next M at
    /// tier 2's rate, etc.
    Graduated { tiers: Vec<Tier> },
    /// The *entire* quantity is priced at the rate of the single tier its
    /// total falls into ("volume").
    Volume { tiers: Vec<Tier> },
    /// Quantity is rounded up to a multiple of `package_size` and charged
    /// `package_size * unit_price` per package.
    Package {
        package_size: Decimal,
        unit_price: Decimal,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceKind {
    Fixed,
    Usage,
}

/// A tenant-owned, immutable-per-version price. Referenced by subscription
/// line items, never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub id: crate::ids::PriceId,
    pub currency: String,
    pub kind: PriceKind,
    pub billing_period: BillingPeriodUnit,
    pub billing_period_count: u32,
    /// Required when `kind == Usage`.
    pub meter_id: Option<MeterId>,
    /// Required when `kind == Usage`; unused (and must be `None`) for fixed
    /// prices, whose cost is `unit_price * quantity` with no ladder.
    pub tier_model: Option<TierModel>,
    /// Flat per-unit price for `kind == Fixed`.
    pub unit_price: Option<Decimal>,
    /// Restricts which events a usage price applies to: property key to the
    /// set of values that must match.
    pub filter_values: BTreeMap<String, BTreeSet<String>>,
    pub invoice_cadence: InvoiceCadence,
    pub trial_period_days: Option<u32>,
}

impl Price {
    pub fn is_usage(&self) -> bool {
        matches!(self.kind, PriceKind::Usage)
    }
}
