//! Commitment validation rules enforced at subscription create/update time.

use meterflow_core::error::{Error, Result};
use meterflow_core::model::event::Meter;
use meterflow_core::model::subscription::{Subscription, SubscriptionLineItem};
use rust_decimal::Decimal;

fn overage_factor_valid(overage_factor: Option<Decimal>) -> bool {
    overage_factor.map(|f| f > Decimal::ONE).unwrap_or(false)
}

/// Validates a single line item's commitment configuration. `meter` is the
/// line item's meter, when it has one; required to check the window
/// commitment rule.
pub fn validate_line_item_commitment(
    line_item: &SubscriptionLineItem,
    meter: Option<&Meter>,
) -> Result<()> {
    if line_item.commitment_amount.is_some() && line_item.commitment_quantity.is_some() {
        return Err(Error::validation(
            "a line item may set at most one of commitment_amount or commitment_quantity",
        ));
    }

    if line_item.has_commitment() {
        if !line_item.price.is_usage() {
            return Err(Error::validation(
                "commitments are only allowed on usage prices",
            ));
        }
        if !overage_factor_valid(line_item.overage_factor) {
            return Err(Error::validation(
                "overage_factor must be greater than 1 when a commitment is set",
            ));
        }
    }

    if line_item.is_window_commitment {
        let bucketed = meter.map(Meter::requires_bucket).unwrap_or(false);
        if !bucketed {
            return Err(Error::validation(
                "window commitment requires a meter with a bucket_size",
            ));
        }
    }

    Ok(())
}

/// Validates the subscription-level commitment, and the mutual-exclusion
/// rule against any line-item-level commitment.
pub fn validate_subscription_commitment(subscription: &Subscription) -> Result<()> {
    let subscription_level = subscription.has_subscription_level_commitment();
    let line_level = subscription.has_line_item_commitment();

    if subscription_level && line_level {
        return Err(Error::validation(
            "subscription-level and line-item-level commitments are mutually exclusive",
        ));
    }

    if subscription_level && !overage_factor_valid(subscription.overage_factor) {
        return Err(Error::validation(
            "overage_factor must be greater than 1 when a subscription-level commitment is set",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterflow_core::ids::{MeterId, PriceId};
    use meterflow_core::model::event::{AggregationType, BucketSize, MeterAggregation};
    use meterflow_core::model::pricing::{BillingPeriodUnit, InvoiceCadence, Price, PriceKind};
    use meterflow_core::model::subscription::CommitmentType;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn usage_price() -> Price {
        Price {
            id: PriceId("p1".into()),
            currency: "usd".into(),
            kind: PriceKind::Usage,
            billing_period: BillingPeriodUnit::Month,
            billing_period_count: 1,
            meter_id: Some(MeterId("m1".into())),
            tier_model: None,
            unit_price: None,
            filter_values: Default::default(),
            invoice_cadence: InvoiceCadence::Arrear,
            trial_period_days: None,
        }
    }

    fn line_item(price: Price) -> SubscriptionLineItem {
        SubscriptionLineItem {
            price_id: price.id.clone(),
            meter_id: price.meter_id.clone(),
            price,
            quantity: dec!(1),
            currency: "usd".into(),
            billing_period: BillingPeriodUnit::Month,
            billing_period_count: 1,
            invoice_cadence: InvoiceCadence::Arrear,
            trial_period_days: None,
            commitment_amount: None,
            commitment_quantity: None,
            commitment_type: None,
            overage_factor: None,
            is_window_commitment: false,
        }
    }

    #[test]
    fn rejects_both_amount_and_quantity_commitment() {
        let mut li = line_item(usage_price());
        li.commitment_amount = Some(dec!(100));
        li.commitment_quantity = Some(dec!(10));
        li.commitment_type = Some(CommitmentType::Amount);
        li.overage_factor = Some(dec!(1.5));
        assert!(validate_line_item_commitment(&li, None).is_err());
    }

    #[test]
    fn rejects_commitment_without_overage_factor() {
        let mut li = line_item(usage_price());
        li.commitment_amount = Some(dec!(100));
        li.commitment_type = Some(CommitmentType::Amount);
        assert!(validate_line_item_commitment(&li, None).is_err());
    }

    #[test]
    fn rejects_commitment_on_fixed_price() {
        let mut price = usage_price();
        price.kind = PriceKind::Fixed;
        price.meter_id = None;
        price.unit_price = Some(dec!(10));
        let mut li = line_item(price);
        li.commitment_amount = Some(dec!(100));
        li.commitment_type = Some(CommitmentType::Amount);
        li.overage_factor = Some(dec!(1.5));
        assert!(validate_line_item_commitment(&li, None).is_err());
    }

    #[test]
    fn window_commitment_requires_bucketed_meter() {
        let mut li = line_item(usage_price());
        li.is_window_commitment = true;
        let unbucketed = Meter {
            id: MeterId("m1".into()),
            event_name: "e".into(),
            aggregation: MeterAggregation {
                aggregation_type: AggregationType::Sum,
                field: Some("f".into()),
                bucket_size: None,
            },
            filter_keys: BTreeSet::new(),
            display_name: "d".into(),
        };
        assert!(validate_line_item_commitment(&li, Some(&unbucketed)).is_err());

        let mut bucketed = unbucketed;
        bucketed.aggregation.bucket_size = Some(BucketSize::Day);
        assert!(validate_line_item_commitment(&li, Some(&bucketed)).is_ok());
    }
}
