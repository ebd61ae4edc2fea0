//! Period Engine: advances subscriptions whose `current_period_end` has
//! fallen behind the invocation time, generating invoices per elapsed
//! period, applying pause/resume time dilation, and detecting
//! cancel-at-period-end transitions.

pub mod engine;
pub mod repository;

pub use engine::{
    cancel_at_period_end, cancel_immediately, BatchItem, BatchOutcome, BatchSummary, PeriodEngine,
};
pub use repository::{InvoiceRepository, MeterRepository, PauseRepository, SubscriptionRepository};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use meterflow_core::error::{Error, Result};
    use meterflow_core::ids::{
        CustomerId, EnvironmentId, MeterId, PlanId, PriceId, SubscriptionId, SubscriptionPauseId,
        TenantId,
    };
    use meterflow_core::model::event::Meter;
    use meterflow_core::model::invoice::Invoice;
    use meterflow_core::model::pricing::{BillingPeriodUnit, InvoiceCadence, Price, PriceKind};
    use meterflow_core::model::subscription::{
        BillingCycleAnchoring, PauseMode, PauseStatus, ResumeMode, Subscription,
        SubscriptionLineItem, SubscriptionPause, SubscriptionStatus,
    };
    use meterflow_core::ports::{AnalyticalStore, RelationalStore, SubscriptionLock};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct NoopLock;
    impl SubscriptionLock for NoopLock {}

    struct FakeRelationalStore;
    #[async_trait]
    impl RelationalStore for FakeRelationalStore {
        async fn lock_subscription(&self, _subscription_id: &str) -> Result<Box<dyn SubscriptionLock>> {
            Ok(Box::new(NoopLock))
        }
    }

    #[derive(Default)]
    struct FakeSubscriptionRepo {
        subs: Mutex<HashMap<String, Subscription>>,
    }
    #[async_trait]
    impl SubscriptionRepository for FakeSubscriptionRepo {
        async fn list_active_page(
            &self,
            after_id: Option<&SubscriptionId>,
            page_size: usize,
        ) -> Result<Vec<Subscription>> {
            let subs = self.subs.lock().unwrap();
            let mut all: Vec<_> = subs.values().cloned().collect();
            all.sort_by(|a, b| a.id.0.cmp(&b.id.0));
            let start = match after_id {
                Some(id) => all.iter().position(|s| &s.id == id).map(|i| i + 1).unwrap_or(0),
                None => 0,
            };
            Ok(all.into_iter().skip(start).take(page_size).collect())
        }

        async fn get(&self, id: &SubscriptionId) -> Result<Subscription> {
            self.subs
                .lock()
                .unwrap()
                .get(&id.0)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("subscription {id} not found")))
        }

        async fn save(&self, subscription: &Subscription) -> Result<()> {
            self.subs
                .lock()
                .unwrap()
                .insert(subscription.id.0.clone(), subscription.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakePauseRepo {
        pauses: Mutex<HashMap<String, SubscriptionPause>>,
    }
    #[async_trait]
    impl PauseRepository for FakePauseRepo {
        async fn get(&self, id: &SubscriptionPauseId) -> Result<SubscriptionPause> {
            self.pauses
                .lock()
                .unwrap()
                .get(&id.0)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("pause {id} not found")))
        }
        async fn save(&self, pause: &SubscriptionPause) -> Result<()> {
            self.pauses.lock().unwrap().insert(pause.id.0.clone(), pause.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeInvoiceRepo {
        invoices: Mutex<Vec<Invoice>>,
    }
    #[async_trait]
    impl InvoiceRepository for FakeInvoiceRepo {
        async fn insert(&self, invoice: Invoice) -> Result<Invoice> {
            self.invoices.lock().unwrap().push(invoice.clone());
            Ok(invoice)
        }
    }

    #[derive(Default)]
    struct FakeMeterRepo;
    #[async_trait]
    impl MeterRepository for FakeMeterRepo {
        async fn get_many(&self, _ids: &[MeterId]) -> Result<HashMap<MeterId, Meter>> {
            Ok(HashMap::new())
        }
    }

    struct EmptyAnalyticalStore;
    #[async_trait]
    impl AnalyticalStore for EmptyAnalyticalStore {
        async fn bulk_insert_events(&self, _events: &[meterflow_core::model::event::Event]) -> Result<()> {
            Ok(())
        }
        async fn aggregate_usage(
            &self,
            _requests: &[meterflow_core::ports::AggregateUsageRequest],
        ) -> Result<Vec<meterflow_core::ports::MeterAggregateResult>> {
            Ok(Vec::new())
        }
    }

    fn fixed_price(id: &str) -> Price {
        Price {
            id: PriceId(id.into()),
            currency: "usd".into(),
            kind: PriceKind::Fixed,
            billing_period: BillingPeriodUnit::Month,
            billing_period_count: 1,
            meter_id: None,
            tier_model: None,
            unit_price: Some(dec!(10.00)),
            filter_values: Default::default(),
            invoice_cadence: InvoiceCadence::Advance,
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
            invoice_cadence: InvoiceCadence::Advance,
            trial_period_days: None,
            commitment_amount: None,
            commitment_quantity: None,
            commitment_type: None,
            overage_factor: None,
            is_window_commitment: false,
        }
    }

    fn base_subscription(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Subscription {
        Subscription {
            id: SubscriptionId(id.into()),
            tenant_id: TenantId("t1".into()),
            environment_id: EnvironmentId("e1".into()),
            customer_id: CustomerId("cust-1".into()),
            plan_id: PlanId("plan-1".into()),
            currency: "usd".into(),
            status: SubscriptionStatus::Active,
            pause_status: PauseStatus::None,
            active_pause_id: None,
            start_date: start,
            billing_anchor: start,
            anchoring: BillingCycleAnchoring::Anniversary,
            billing_period: BillingPeriodUnit::Month,
            billing_period_count: 1,
            current_period_start: start,
            current_period_end: end,
            cancel_at_period_end: false,
            cancel_at: None,
            cancelled_at: None,
            commitment_amount: None,
            overage_factor: None,
            line_items: vec![line_item(fixed_price("price-fixed"))],
        }
    }

    fn engine(
        sub_repo: Arc<FakeSubscriptionRepo>,
        pause_repo: Arc<FakePauseRepo>,
        invoice_repo: Arc<FakeInvoiceRepo>,
    ) -> PeriodEngine {
        let aggregator = Arc::new(meterflow_aggregator::UsageAggregatorService::new(Arc::new(
            EmptyAnalyticalStore,
        )));
        PeriodEngine::new(
            sub_repo,
            pause_repo,
            invoice_repo,
            Arc::new(FakeMeterRepo),
            Arc::new(FakeRelationalStore),
            aggregator,
        )
    }

    #[tokio::test]
    async fn basic_month_rollover_creates_one_invoice() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 15, 0, 0, 0).unwrap();
        let sub = base_subscription("sub-1", start, end);

        let sub_repo = Arc::new(FakeSubscriptionRepo::default());
        sub_repo.save(&sub).await.unwrap();
        let pause_repo = Arc::new(FakePauseRepo::default());
        let invoice_repo = Arc::new(FakeInvoiceRepo::default());
        let eng = engine(sub_repo.clone(), pause_repo, invoice_repo.clone());

        let now = Utc.with_ymd_and_hms(2024, 2, 16, 0, 0, 0).unwrap();
        let summary = eng.update_billing_periods(now, 10).await.unwrap();

        assert_eq!(summary.total_success, 1);
        assert_eq!(summary.total_failed, 0);
        assert_eq!(invoice_repo.invoices.lock().unwrap().len(), 1);

        let updated = sub_repo.get(&SubscriptionId("sub-1".into())).await.unwrap();
        assert_eq!(updated.current_period_end, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn catch_up_creates_three_invoices() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 15, 0, 0, 0).unwrap();
        let sub = base_subscription("sub-2", start, end);

        let sub_repo = Arc::new(FakeSubscriptionRepo::default());
        sub_repo.save(&sub).await.unwrap();
        let pause_repo = Arc::new(FakePauseRepo::default());
        let invoice_repo = Arc::new(FakeInvoiceRepo::default());
        let eng = engine(sub_repo.clone(), pause_repo, invoice_repo.clone());

        let now = Utc.with_ymd_and_hms(2024, 4, 16, 0, 0, 0).unwrap();
        let summary = eng.update_billing_periods(now, 10).await.unwrap();

        assert_eq!(summary.total_success, 1);
        assert_eq!(invoice_repo.invoices.lock().unwrap().len(), 3);

        let updated = sub_repo.get(&SubscriptionId("sub-2".into())).await.unwrap();
        assert_eq!(updated.current_period_end, Utc.with_ymd_and_hms(2024, 5, 15, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn pause_resume_dilates_period_end() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let period_end = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut sub = base_subscription("sub-3", start, period_end);

        let pause_start = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
        let resume_at = Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap();

        sub.status = SubscriptionStatus::Paused;
        sub.pause_status = PauseStatus::Active;
        sub.active_pause_id = Some(SubscriptionPauseId("pause-1".into()));

        let pause = SubscriptionPause {
            id: SubscriptionPauseId("pause-1".into()),
            subscription_id: sub.id.clone(),
            pause_status: PauseStatus::Active,
            pause_mode: PauseMode::Immediate,
            resume_mode: ResumeMode::Scheduled,
            pause_start,
            pause_end: Some(resume_at),
            original_period_start: start,
            original_period_end: period_end,
            resumed_at: None,
        };

        let sub_repo = Arc::new(FakeSubscriptionRepo::default());
        sub_repo.save(&sub).await.unwrap();
        let pause_repo = Arc::new(FakePauseRepo::default());
        pause_repo.save(&pause).await.unwrap();
        let invoice_repo = Arc::new(FakeInvoiceRepo::default());
        let eng = engine(sub_repo.clone(), pause_repo, invoice_repo);

        let summary = eng.update_billing_periods(resume_at, 10).await.unwrap();
        assert_eq!(summary.total_success, 1);
        assert_eq!(summary.items[0].outcome, Ok(BatchOutcome::Resumed));

        let updated = sub_repo.get(&SubscriptionId("sub-3".into())).await.unwrap();
        assert_eq!(updated.status, SubscriptionStatus::Active);
        assert_eq!(updated.current_period_end, Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn update_billing_periods_called_twice_is_a_noop_second_time() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 15, 0, 0, 0).unwrap();
        let sub = base_subscription("sub-4", start, end);

        let sub_repo = Arc::new(FakeSubscriptionRepo::default());
        sub_repo.save(&sub).await.unwrap();
        let pause_repo = Arc::new(FakePauseRepo::default());
        let invoice_repo = Arc::new(FakeInvoiceRepo::default());
        let eng = engine(sub_repo.clone(), pause_repo, invoice_repo.clone());

        let now = Utc.with_ymd_and_hms(2024, 2, 16, 0, 0, 0).unwrap();
        eng.update_billing_periods(now, 10).await.unwrap();
        let first_count = invoice_repo.invoices.lock().unwrap().len();

        eng.update_billing_periods(now, 10).await.unwrap();
        let second_count = invoice_repo.invoices.lock().unwrap().len();

        assert_eq!(first_count, second_count);
    }
}
