//! Commitment drawdown: the portion of a charge billed at the base rate
//! versus the overage rate once a minimum-spend or minimum-quantity floor is
//! exceeded.

use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommitmentResult {
    pub base_amount: Decimal,
    pub overage_amount: Decimal,
}

impl CommitmentResult {
    pub fn total(&self) -> Decimal {
        self.base_amount + self.overage_amount
    }

    pub fn has_overage(&self) -> bool {
        !self.overage_amount.is_zero()
    }
}

/// Subscription-level commitment: charges are drawn down against `commitment`
/// in order, a charge straddling the boundary is split so exactly
/// `commitment` is consumed at the base rate, and the remainder across every
/// charge bills at `overage_factor`.
///
/// Charges are processed smallest-first so that, for a fixed multiset of
/// charges, the split point is deterministic regardless of input order.
pub fn apply_subscription_commitment(
    charges: &[Decimal],
    commitment: Decimal,
    overage_factor: Decimal,
) -> CommitmentResult {
    let mut sorted = charges.to_vec();
    sorted.sort();

    let mut consumed = Decimal::ZERO;
    let mut result = CommitmentResult::default();
    for charge in sorted {
        let remaining_commitment = (commitment - consumed).max(Decimal::ZERO);
        if charge <= remaining_commitment {
            result.base_amount += charge;
            consumed += charge;
        } else {
            let within = remaining_commitment;
            let beyond = charge - within;
            result.base_amount += within;
            result.overage_amount += beyond * overage_factor;
            consumed += within;
        }
    }
    result
}

/// Line-item amount commitment: the line item's own charge, split the same
/// way as the subscription-level case but against a single charge rather
/// than a multiset.
pub fn apply_amount_commitment(
    charge: Decimal,
    commitment_amount: Decimal,
    overage_factor: Decimal,
) -> CommitmentResult {
    apply_subscription_commitment(&[charge], commitment_amount, overage_factor)
}

/// Line-item quantity commitment: the committed and overage quantity
/// tranches are each priced through the line item's own tier ladder (so a
/// graduated or volume price still applies its normal per-unit rates within
/// each tranche), and the overage tranche's resulting cost is then scaled by
/// `overage_factor`.
pub fn apply_quantity_commitment(
    quantity: Decimal,
    commitment_quantity: Decimal,
    overage_factor: Decimal,
    cost_fn: impl Fn(Decimal) -> Decimal,
) -> CommitmentResult {
    let base_quantity = quantity.min(commitment_quantity).max(Decimal::ZERO);
    let overage_quantity = (quantity - commitment_quantity).max(Decimal::ZERO);
    CommitmentResult {
        base_amount: cost_fn(base_quantity),
        overage_amount: cost_fn(overage_quantity) * overage_factor,
    }
}
