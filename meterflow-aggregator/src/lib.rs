//! Usage Aggregator: turns a subscription's usage line items into per-price
//! usage totals (and, for bucketed meters, per-bucket totals) for a window,
//! by delegating the actual reduction to the analytical store.

pub mod filter_group;

use chrono::{DateTime, TimeZone, Utc};
use meterflow_core::error::Result;
use meterflow_core::ids::{CustomerId, MeterId, PriceId, TenantScope};
use meterflow_core::model::event::Meter;
use meterflow_core::model::subscription::Subscription;
use meterflow_core::ports::{AggregateUsageRequest, AnalyticalStore};
use std::collections::HashMap;
use std::sync::Arc;

pub use filter_group::{build_filter_groups, FilterGroup};

/// One bucket's worth of aggregated usage, present only for meters whose
/// `MeterAggregation::bucket_size` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageBucket {
    pub bucket_start: DateTime<Utc>,
    pub value: rust_decimal::Decimal,
}

/// Aggregated usage for a single usage price within the requested window.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUsage {
    pub meter_id: MeterId,
    pub total: rust_decimal::Decimal,
    /// Non-empty only for window-commitment meters; `total` is always the
    /// sum across these buckets in that case.
    pub buckets: Vec<UsageBucket>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionUsage {
    pub by_price: HashMap<PriceId, PriceUsage>,
}

/// `current_period_start..current_period_end`, the default window for any
/// usage line item that isn't flagged for lifetime usage.
pub fn default_window(subscription: &Subscription) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        subscription.current_period_start,
        subscription.current_period_end,
    )
}

/// `(epoch, now)`, used for line items billed on lifetime usage rather than
/// the current period alone.
pub fn lifetime_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (Utc.timestamp_opt(0, 0).single().unwrap_or(now), now)
}

pub struct UsageAggregatorService {
    store: Arc<dyn AnalyticalStore>,
}

impl UsageAggregatorService {
    pub fn new(store: Arc<dyn AnalyticalStore>) -> Self {
        UsageAggregatorService { store }
    }

    /// Groups the subscription's usage line items by meter, builds one
    /// filter-group-scored request per meter, and issues a single batched
    /// round-trip to the analytical store for all of them.
    pub async fn get_usage(
        &self,
        scope: &TenantScope,
        external_customer_id: &CustomerId,
        subscription: &Subscription,
        meters: &HashMap<MeterId, Meter>,
        window: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<SubscriptionUsage> {
        let (window_start, window_end) = window;

        let mut by_meter: HashMap<MeterId, Vec<&meterflow_core::model::subscription::SubscriptionLineItem>> =
            HashMap::new();
        for li in &subscription.line_items {
            if !li.price.is_usage() {
                continue;
            }
            if let Some(meter_id) = &li.meter_id {
                by_meter.entry(meter_id.clone()).or_default().push(li);
            }
        }

        if by_meter.is_empty() {
            return Ok(SubscriptionUsage::default());
        }

        let mut requests = Vec::with_capacity(by_meter.len());
        for (meter_id, line_items) in &by_meter {
            let owned: Vec<_> = line_items.iter().map(|li| (*li).clone()).collect();
            let groups = build_filter_groups(&owned);
            requests.push(AggregateUsageRequest {
                tenant_id: scope.tenant_id.clone(),
                environment_id: scope.environment_id.clone(),
                external_customer_id: external_customer_id.clone(),
                meter_id: meter_id.clone(),
                filter_groups: groups.iter().map(FilterGroup::to_query).collect(),
                window_start,
                window_end,
            });
        }

        let results = self.store.aggregate_usage(&requests).await?;

        let mut usage = SubscriptionUsage::default();
        for meter_result in results {
            let requires_bucket = meters
                .get(&meter_result.meter_id)
                .map(Meter::requires_bucket)
                .unwrap_or(false);
            for r in meter_result.results {
                let price_id = PriceId(r.filter_group_id.clone());
                let entry = usage.by_price.entry(price_id).or_insert_with(|| PriceUsage {
                    meter_id: meter_result.meter_id.clone(),
                    total: rust_decimal::Decimal::ZERO,
                    buckets: Vec::new(),
                });
                match (requires_bucket, r.bucket) {
                    (true, Some(bucket_start)) => {
                        entry.total += r.aggregated_value;
                        entry.buckets.push(UsageBucket {
                            bucket_start,
                            value: r.aggregated_value,
                        });
                    }
                    _ => {
                        entry.total = r.aggregated_value;
                    }
                }
            }
        }
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use meterflow_core::ids::{EnvironmentId, TenantId};
    use meterflow_core::model::event::{AggregationType, BucketSize, MeterAggregation};
    use meterflow_core::model::pricing::{BillingPeriodUnit, InvoiceCadence, Price, PriceKind};
    use meterflow_core::model::subscription::{
        BillingCycleAnchoring, CommitmentType, PauseStatus, SubscriptionLineItem, SubscriptionStatus,
    };
    use meterflow_core::ports::{AggregateUsageResult, MeterAggregateResult};
    use rust_decimal_macros::dec;
    use std::collections::{BTreeMap, BTreeSet};

    struct FakeStore {
        response: Vec<MeterAggregateResult>,
    }

    #[async_trait]
    impl AnalyticalStore for FakeStore {
        async fn bulk_insert_events(&self, _events: &[meterflow_core::model::event::Event]) -> Result<()> {
            Ok(())
        }
        async fn aggregate_usage(
            &self,
            _requests: &[AggregateUsageRequest],
        ) -> Result<Vec<MeterAggregateResult>> {
            Ok(self.response.clone())
        }
    }

    fn usage_price(id: &str, meter_id: &str, filter_values: BTreeMap<String, BTreeSet<String>>) -> Price {
        Price {
            id: meterflow_core::ids::PriceId(id.into()),
            currency: "usd".into(),
            kind: PriceKind::Usage,
            billing_period: BillingPeriodUnit::Month,
            billing_period_count: 1,
            meter_id: Some(MeterId(meter_id.into())),
            tier_model: None,
            unit_price: None,
            filter_values,
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
            commitment_type: None::<CommitmentType>,
            overage_factor: None,
            is_window_commitment: false,
        }
    }

    fn subscription(line_items: Vec<SubscriptionLineItem>) -> Subscription {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        Subscription {
            id: meterflow_core::ids::SubscriptionId("sub-1".into()),
            tenant_id: TenantId("t1".into()),
            environment_id: EnvironmentId("e1".into()),
            customer_id: CustomerId("cust-1".into()),
            plan_id: meterflow_core::ids::PlanId("plan-1".into()),
            currency: "usd".into(),
            status: SubscriptionStatus::Active,
            pause_status: PauseStatus::None,
            active_pause_id: None,
            start_date: now,
            billing_anchor: now,
            anchoring: BillingCycleAnchoring::Calendar,
            billing_period: BillingPeriodUnit::Month,
            billing_period_count: 1,
            current_period_start: now,
            current_period_end: now + chrono::Duration::days(31),
            cancel_at_period_end: false,
            cancel_at: None,
            cancelled_at: None,
            commitment_amount: None,
            overage_factor: None,
            line_items,
        }
    }

    #[tokio::test]
    async fn aggregates_single_meter_without_buckets() {
        let price = usage_price("price-api-calls", "meter-api", BTreeMap::new());
        let sub = subscription(vec![line_item(price)]);
        let meters = HashMap::new();
        let store = Arc::new(FakeStore {
            response: vec![MeterAggregateResult {
                meter_id: MeterId("meter-api".into()),
                results: vec![AggregateUsageResult {
                    filter_group_id: "price-api-calls".into(),
                    aggregated_value: dec!(42),
                    bucket: None,
                }],
            }],
        });
        let svc = UsageAggregatorService::new(store);
        let scope = TenantScope::new("t1", "e1");
        let usage = svc
            .get_usage(
                &scope,
                &CustomerId("cust-1".into()),
                &sub,
                &meters,
                default_window(&sub),
            )
            .await
            .unwrap();
        assert_eq!(
            usage.by_price[&PriceId("price-api-calls".into())].total,
            dec!(42)
        );
    }

    #[tokio::test]
    async fn sums_buckets_for_window_commitment_meter() {
        let price = usage_price("price-storage", "meter-storage", BTreeMap::new());
        let sub = subscription(vec![line_item(price)]);
        let mut meters = HashMap::new();
        meters.insert(
            MeterId("meter-storage".into()),
            Meter {
                id: MeterId("meter-storage".into()),
                event_name: "storage_snapshot".into(),
                aggregation: MeterAggregation {
                    aggregation_type: AggregationType::Max,
                    field: Some("bytes".into()),
                    bucket_size: Some(BucketSize::Day),
                },
                filter_keys: BTreeSet::new(),
                display_name: "Storage".into(),
            },
        );
        let store = Arc::new(FakeStore {
            response: vec![MeterAggregateResult {
                meter_id: MeterId("meter-storage".into()),
                results: vec![
                    AggregateUsageResult {
                        filter_group_id: "price-storage".into(),
                        aggregated_value: dec!(10),
                        bucket: Some(sub.current_period_start),
                    },
                    AggregateUsageResult {
                        filter_group_id: "price-storage".into(),
                        aggregated_value: dec!(15),
                        bucket: Some(sub.current_period_start + chrono::Duration::days(1)),
                    },
                ],
            }],
        });
        let svc = UsageAggregatorService::new(store);
        let scope = TenantScope::new("t1", "e1");
        let usage = svc
            .get_usage(
                &scope,
                &CustomerId("cust-1".into()),
                &sub,
                &meters,
                default_window(&sub),
            )
            .await
            .unwrap();
        let price_usage = &usage.by_price[&PriceId("price-storage".into())];
        assert_eq!(price_usage.total, dec!(25));
        assert_eq!(price_usage.buckets.len(), 2);
    }

    #[tokio::test]
    async fn no_usage_line_items_short_circuits_without_calling_store() {
        let sub = subscription(vec![]);
        let meters = HashMap::new();
        let store = Arc::new(FakeStore { response: vec![] });
        let svc = UsageAggregatorService::new(store);
        let scope = TenantScope::new("t1", "e1");
        let usage = svc
            .get_usage(
                &scope,
                &CustomerId("cust-1".into()),
                &sub,
                &meters,
                default_window(&sub),
            )
            .await
            .unwrap();
        assert!(usage.by_price.is_empty());
    }
}
