//! Tier-ladder cost functions. Each takes a quantity and returns the
//! unrounded cost; rounding to presentation precision happens once, at the
//! [`crate::calculate_cost`] boundary.

use meterflow_core::model::pricing::Tier;
use rust_decimal::Decimal;

/// Every unit is billed at the rate of the tier it individually falls into.
pub fn graduated_cost(tiers: &[Tier], quantity: Decimal) -> Decimal {
    let mut remaining = quantity;
    let mut prev_bound = Decimal::ZERO;
    let mut total = Decimal::ZERO;
    for tier in tiers {
        if remaining <= Decimal::ZERO {
            break;
        }
        let capacity = match tier.up_to {
            Some(up_to) => (up_to - prev_bound).max(Decimal::ZERO),
            None => remaining,
        };
        let slice = remaining.min(capacity);
        if slice > Decimal::ZERO {
            total += slice * tier.unit_price;
            if let Some(flat) = tier.flat_fee {
                total += flat;
            }
        }
        remaining -= slice;
        if let Some(up_to) = tier.up_to {
            prev_bound = up_to;
        }
    }
    total
}

/// The entire quantity is billed at the rate of the single tier its total
/// falls into.
pub fn volume_cost(tiers: &[Tier], quantity: Decimal) -> Decimal {
    for tier in tiers {
        let falls_here = match tier.up_to {
            Some(up_to) => quantity <= up_to,
            None => true,
        };
        if falls_here {
            return quantity * tier.unit_price + tier.flat_fee.unwrap_or(Decimal::ZERO);
        }
    }
    Decimal::ZERO
}

/// Quantity rounded up to a whole number of packages, each billed flat.
pub fn package_cost(package_size: Decimal, unit_price: Decimal, quantity: Decimal) -> Decimal {
    if package_size.is_zero() {
        return Decimal::ZERO;
    }
    let packages = (quantity / package_size).ceil();
    packages * package_size * unit_price
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterflow_core::model::pricing::Tier;
    use rust_decimal_macros::dec;

    fn tiers() -> Vec<Tier> {
        vec![
            Tier {
                up_to: Some(dec!(100)),
                unit_price: dec!(1.00),
                flat_fee: None,
            },
            Tier {
                up_to: Some(dec!(200)),
                unit_price: dec!(0.50),
                flat_fee: None,
            },
            Tier {
                up_to: None,
                unit_price: dec!(0.25),
                flat_fee: None,
            },
        ]
    }

    #[test]
    fn graduated_splits_across_tiers() {
        // 100 @ 1.00 + 50 @ 0.50 = 100 + 25 = 125
        assert_eq!(graduated_cost(&tiers(), dec!(150)), dec!(125));
    }

    #[test]
    fn graduated_within_first_tier_only() {
        assert_eq!(graduated_cost(&tiers(), dec!(40)), dec!(40));
    }

    #[test]
    fn graduated_spills_into_open_tier() {
        // 100@1.00 + 100@0.50 + 50@0.25 = 100 + 50 + 12.5 = 162.5
        assert_eq!(graduated_cost(&tiers(), dec!(250)), dec!(162.5));
    }

    #[test]
    fn volume_bills_entire_quantity_at_matched_tier() {
        // 150 falls in the second tier (up_to 200) entirely, at 0.50/unit
        assert_eq!(volume_cost(&tiers(), dec!(150)), dec!(75));
    }

    #[test]
    fn package_rounds_up_to_whole_packages() {
        // 25 units, package of 10 @ 2.00/unit -> 3 packages * 10 * 2.00 = 60
        assert_eq!(package_cost(dec!(10), dec!(2.00), dec!(25)), dec!(60));
    }

    #[test]
    fn package_exact_multiple_does_not_round_up_further() {
        assert_eq!(package_cost(dec!(10), dec!(2.00), dec!(20)), dec!(40));
    }
}
