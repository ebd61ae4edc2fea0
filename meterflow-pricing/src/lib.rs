//! Pricing Engine: converts `(price, quantity)` into a monetary cost,
//! applying tier ladders, subscription- and line-item-level commitments, and
//! overage multipliers. Tier ladders are data the engine is table-driven
//! over, never a branch on "is this price fixed or usage" beyond the one
//! match in [`calculate_cost`].

pub mod commitment;
pub mod tiers;
pub mod validate;

use meterflow_core::error::{Error, Result};
use meterflow_core::model::pricing::{Price, PriceKind, TierModel};
use meterflow_core::model::subscription::{CommitmentType, SubscriptionLineItem};
use meterflow_core::Money;
use rust_decimal::Decimal;
use tracing::debug;

pub use commitment::{
    apply_amount_commitment, apply_quantity_commitment, apply_subscription_commitment,
    CommitmentResult,
};
pub use validate::{validate_line_item_commitment, validate_subscription_commitment};

/// Base cost for a quantity against a price's own rate card; no commitment
/// or overage is applied here. All arithmetic is `Decimal`; the returned
/// [`Money`] carries the price's currency but is not yet rounded to
/// presentation precision — callers round once, at invoice finalization.
pub fn calculate_cost(price: &Price, quantity: Decimal) -> Result<Money> {
    let amount = match price.kind {
        PriceKind::Fixed => {
            let unit = price.unit_price.ok_or_else(|| {
                Error::internal("fixed price missing unit_price")
                    .with_detail("price_id", price.id.0.clone())
            })?;
            unit * quantity
        }
        PriceKind::Usage => tiered_cost(price, quantity)?,
    };
    Ok(Money::new(amount, &price.currency))
}

fn tiered_cost(price: &Price, quantity: Decimal) -> Result<Decimal> {
    let tier_model = price.tier_model.as_ref().ok_or_else(|| {
        Error::internal("usage price missing tier_model").with_detail("price_id", price.id.0.clone())
    })?;
    Ok(match tier_model {
        TierModel::Graduated { tiers } => tiers::graduated_cost(tiers, quantity),
        TierModel::Volume { tiers } => tiers::volume_cost(tiers, quantity),
        TierModel::Package {
            package_size,
            unit_price,
        } => tiers::package_cost(*package_size, *unit_price, quantity),
    })
}

/// A line item's charge for one billing period (or one bucket, for window
/// commitments), split into base and overage amounts.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct LineItemCharge {
    pub base_amount: Decimal,
    pub overage_amount: Decimal,
    pub has_overage: bool,
}

impl LineItemCharge {
    pub fn total(&self) -> Decimal {
        self.base_amount + self.overage_amount
    }
}

/// Prices one line item's usage, applying its own commitment if it has one.
///
/// `bucket_quantities` carries one quantity per bucket for a window
/// commitment (`line_item.is_window_commitment`); the commitment is then
/// applied once per bucket rather than once against `quantity`. For any
/// other line item, pass `None` and the period total `quantity` is used.
pub fn price_line_item(
    line_item: &SubscriptionLineItem,
    quantity: Decimal,
    bucket_quantities: Option<&[Decimal]>,
) -> Result<LineItemCharge> {
    let price = &line_item.price;

    if !line_item.has_commitment() {
        let cost = calculate_cost(price, quantity)?;
        return Ok(LineItemCharge {
            base_amount: cost.amount,
            overage_amount: Decimal::ZERO,
            has_overage: false,
        });
    }

    let overage_factor = line_item.overage_factor.ok_or_else(|| {
        Error::internal("committed line item missing overage_factor")
            .with_detail("price_id", price.id.0.clone())
    })?;
    let commitment_type = line_item.commitment_type.ok_or_else(|| {
        Error::internal("committed line item missing commitment_type")
            .with_detail("price_id", price.id.0.clone())
    })?;
    let tier_model = price.tier_model.as_ref().ok_or_else(|| {
        Error::internal("committed line item's price is missing a tier_model")
            .with_detail("price_id", price.id.0.clone())
    })?;

    let cost_of = |q: Decimal| -> Decimal {
        match tier_model {
            TierModel::Graduated { tiers } => tiers::graduated_cost(tiers, q),
            TierModel::Volume { tiers } => tiers::volume_cost(tiers, q),
            TierModel::Package {
                package_size,
                unit_price,
            } => tiers::package_cost(*package_size, *unit_price, q),
        }
    };

    let windows: Vec<Decimal> = match (line_item.is_window_commitment, bucket_quantities) {
        (true, Some(buckets)) => buckets.to_vec(),
        _ => vec![quantity],
    };

    let mut base_amount = Decimal::ZERO;
    let mut overage_amount = Decimal::ZERO;
    for window_quantity in windows {
        let result = match commitment_type {
            CommitmentType::Amount => {
                let commitment_amount = line_item.commitment_amount.ok_or_else(|| {
                    Error::internal("amount commitment missing commitment_amount")
                })?;
                commitment::apply_amount_commitment(
                    cost_of(window_quantity),
                    commitment_amount,
                    overage_factor,
                )
            }
            CommitmentType::Quantity => {
                let commitment_quantity = line_item.commitment_quantity.ok_or_else(|| {
                    Error::internal("quantity commitment missing commitment_quantity")
                })?;
                commitment::apply_quantity_commitment(
                    window_quantity,
                    commitment_quantity,
                    overage_factor,
                    cost_of,
                )
            }
        };
        base_amount += result.base_amount;
        overage_amount += result.overage_amount;
    }

    let has_overage = !overage_amount.is_zero();
    if has_overage {
        debug!(
            price_id = %price.id,
            %base_amount,
            %overage_amount,
            "line item commitment exceeded, overage applied"
        );
    }

    Ok(LineItemCharge {
        base_amount,
        overage_amount,
        has_overage,
    })
}
