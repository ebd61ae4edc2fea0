//! Wallet Alert Pipeline: throttles recompute-balance signals so a burst of
//! events for the same customer collapses into at most one recompute per
//! throttle window, unless the event demands an immediate recalculation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use meterflow_core::error::Result;
use meterflow_core::ids::{CustomerId, EnvironmentId, TenantId};
use meterflow_core::model::wallet::WalletBalanceAlertEvent;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_THROTTLE_WINDOW_SECONDS: i64 = 60;

#[async_trait]
pub trait WalletBalanceRecomputeService: Send + Sync {
    async fn recompute(&self, event: &WalletBalanceAlertEvent) -> Result<()>;
}

type ThrottleKey = (TenantId, EnvironmentId, CustomerId);

/// Per-`(tenant, environment, customer)` last-processed timestamps. Lives for
/// the process's lifetime; holding it behind `Arc` lets one pipeline instance
/// be shared across broker consumer tasks.
struct AlertThrottleCache {
    last_processed: DashMap<ThrottleKey, DateTime<Utc>>,
    window: Duration,
}

impl AlertThrottleCache {
    fn new(window: Duration) -> Self {
        AlertThrottleCache {
            last_processed: DashMap::new(),
            window,
        }
    }

    fn key(event: &WalletBalanceAlertEvent) -> ThrottleKey {
        (
            event.tenant_id.clone(),
            event.environment_id.clone(),
            event.customer_id.clone(),
        )
    }

    fn should_process(&self, event: &WalletBalanceAlertEvent, now: DateTime<Utc>) -> bool {
        if event.force_calculate_balance {
            return true;
        }
        match self.last_processed.get(&Self::key(event)) {
            Some(last) => now - *last >= self.window,
            None => true,
        }
    }

    fn mark_processed(&self, event: &WalletBalanceAlertEvent, now: DateTime<Utc>) {
        self.last_processed.insert(Self::key(event), now);
    }
}

pub struct WalletAlertPipeline {
    recompute: Arc<dyn WalletBalanceRecomputeService>,
    throttle: AlertThrottleCache,
}

impl WalletAlertPipeline {
    pub fn new(recompute: Arc<dyn WalletBalanceRecomputeService>, throttle_window: Duration) -> Self {
        WalletAlertPipeline {
            recompute,
            throttle: AlertThrottleCache::new(throttle_window),
        }
    }

    pub fn with_default_window(recompute: Arc<dyn WalletBalanceRecomputeService>) -> Self {
        Self::new(
            recompute,
            Duration::seconds(DEFAULT_THROTTLE_WINDOW_SECONDS),
        )
    }

    /// Returns `true` if the recompute actually ran, `false` if the event was
    /// suppressed by the throttle window.
    pub async fn handle(&self, event: &WalletBalanceAlertEvent, now: DateTime<Utc>) -> Result<bool> {
        if !self.throttle.should_process(event, now) {
            debug!(customer_id = %event.customer_id, "wallet balance alert suppressed by throttle");
            return Ok(false);
        }
        self.recompute.recompute(event).await?;
        self.throttle.mark_processed(event, now);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterflow_core::ids::WalletId;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingRecompute {
        calls: AtomicU64,
    }

    #[async_trait]
    impl WalletBalanceRecomputeService for CountingRecompute {
        async fn recompute(&self, _event: &WalletBalanceAlertEvent) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event(force: bool, at_seconds: i64) -> WalletBalanceAlertEvent {
        let base = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        WalletBalanceAlertEvent {
            id: format!("evt-{at_seconds}"),
            tenant_id: TenantId("tenant-1".into()),
            environment_id: EnvironmentId("prod".into()),
            customer_id: CustomerId("cust-1".into()),
            wallet_id: WalletId("wallet-1".into()),
            source: "usage_event".into(),
            force_calculate_balance: force,
            timestamp: base + Duration::seconds(at_seconds),
        }
    }

    #[tokio::test]
    async fn five_events_in_sixty_five_seconds_recompute_twice() {
        let recompute = Arc::new(CountingRecompute {
            calls: AtomicU64::new(0),
        });
        let pipeline = WalletAlertPipeline::with_default_window(recompute.clone());
        let base = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        for offset in [0_i64, 5, 10, 40, 65] {
            let evt = event(false, offset);
            pipeline.handle(&evt, base + Duration::seconds(offset)).await.unwrap();
        }

        assert_eq!(recompute.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn force_calculate_balance_bypasses_throttle() {
        let recompute = Arc::new(CountingRecompute {
            calls: AtomicU64::new(0),
        });
        let pipeline = WalletAlertPipeline::with_default_window(recompute.clone());
        let base = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        for offset in [0_i64, 5, 10] {
            let evt = event(true, offset);
            pipeline.handle(&evt, base + Duration::seconds(offset)).await.unwrap();
        }

        assert_eq!(recompute.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn different_customers_do_not_share_a_throttle_bucket() {
        let recompute = Arc::new(CountingRecompute {
            calls: AtomicU64::new(0),
        });
        let pipeline = WalletAlertPipeline::with_default_window(recompute.clone());
        let now = Utc::now();

        let mut a = event(false, 0);
        a.customer_id = CustomerId("cust-a".into());
        let mut b = event(false, 0);
        b.customer_id = CustomerId("cust-b".into());

        pipeline.handle(&a, now).await.unwrap();
        pipeline.handle(&b, now).await.unwrap();

        assert_eq!(recompute.calls.load(Ordering::SeqCst), 2);
    }
}
