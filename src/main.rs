//! Meterflow — multi-tenant usage-metering and subscription-billing backend.
//!
//! This binary wires the six core components (Event Ingestor, Usage
//! Aggregator, Pricing Engine, Period Engine, Wallet Payment Allocator,
//! Wallet Alert Pipeline) together using in-memory reference adapters for
//! the broker, analytical store, and relational store. Production
//! deployments swap [`adapters`] for real clients without touching any of
//! the `meterflow-*` crates.

mod adapters;

use adapters::{
    build_usage_aggregator, now, InMemoryInvoiceRepository, InMemoryMeterRepository,
    InMemoryPauseRepository, InMemoryRelationalStore, InMemorySubscriptionRepository,
    InMemoryWalletRepository, LoggingAnalyticalStore, LoggingBrokerPublisher,
    LoggingDeadLetterSink, LoggingWalletBalanceRecompute, NeverEnrolled, NoopWorkflowOrchestrator,
};
use anyhow::Result;
use meterflow_core::config::MeterflowConfig;
use meterflow_core::ids::TenantId;
use meterflow_ingest::{EventIngestor, PlatformBillingConfig, ThrottleConfig};
use meterflow_period::PeriodEngine;
use meterflow_tenant::{InMemoryScheduledJobRepository, ScheduledJobService};
use meterflow_wallet::{CreditGrantMaterializer, WalletAlertPipeline, WalletPaymentAllocator};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// How often `UpdateBillingPeriods` sweeps active subscriptions.
const PERIOD_ENGINE_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("meterflow=info".parse()?),
        )
        .json()
        .init();

    info!("starting meterflow billing backend");

    let config = load_config();

    let subscriptions = Arc::new(InMemorySubscriptionRepository::default());
    let pauses = Arc::new(InMemoryPauseRepository::default());
    let invoices = Arc::new(InMemoryInvoiceRepository::default());
    let meters = Arc::new(InMemoryMeterRepository::default());
    let relational_store = Arc::new(InMemoryRelationalStore);
    let aggregator = Arc::new(build_usage_aggregator());

    let period_engine = Arc::new(PeriodEngine::new(
        subscriptions,
        pauses,
        invoices,
        meters,
        relational_store,
        aggregator,
    ));

    // Wired up so the binary demonstrates the full component graph; in
    // production these are driven by the invoice-created and wallet-change
    // signals the relational/broker adapters emit, not by this loop.
    let wallet_repository = Arc::new(InMemoryWalletRepository::default());
    let _wallet_allocator = WalletPaymentAllocator::new(wallet_repository.clone());
    let _credit_grants = CreditGrantMaterializer::new(wallet_repository);
    let _wallet_alerts = WalletAlertPipeline::with_default_window(Arc::new(
        LoggingWalletBalanceRecompute,
    ));
    let _scheduled_jobs = ScheduledJobService::new(
        Arc::new(InMemoryScheduledJobRepository::default()),
        Arc::new(NoopWorkflowOrchestrator),
    );

    let _ingestor = Arc::new(EventIngestor::new(
        Arc::new(LoggingAnalyticalStore),
        Arc::new(LoggingBrokerPublisher),
        Arc::new(LoggingDeadLetterSink),
        Arc::new(NeverEnrolled),
        config.billing.as_ref().map(|b| PlatformBillingConfig {
            platform_tenant_id: TenantId(b.tenant_id.clone()),
        }),
        ThrottleConfig {
            live_per_second: config.event_processing.live.rate_limit,
            lazy_per_second: config.event_processing.lazy.rate_limit,
        },
    ));

    let shutdown = CancellationToken::new();
    let sweep_token = shutdown.clone();
    let sweep_engine = period_engine.clone();
    let sweep_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PERIOD_ENGINE_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = sweep_token.cancelled() => break,
                _ = ticker.tick() => {
                    match sweep_engine.update_billing_periods(now(), 500).await {
                        Ok(summary) => info!(
                            success = summary.total_success,
                            failed = summary.total_failed,
                            "billing period sweep complete"
                        ),
                        Err(e) => error!(error = %e, "billing period sweep failed"),
                    }
                }
            }
        }
    });

    info!("meterflow started successfully");

    match signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, stopping meterflow..."),
        Err(err) => error!("unable to listen for shutdown signal: {}", err),
    }

    shutdown.cancel();
    if let Err(e) = sweep_task.await {
        error!(error = %e, "period engine sweep task panicked during shutdown");
    }

    info!("meterflow stopped successfully");
    Ok(())
}

/// Config loading is an external concern; this only overlays an optional
/// file and environment variables onto defaults, the way the teacher's own
/// `config` usage works, without this crate depending on any file format.
fn load_config() -> MeterflowConfig {
    let built = config::Config::builder()
        .add_source(config::File::with_name("config/meterflow").required(false))
        .add_source(config::Environment::with_prefix("METERFLOW").separator("__"))
        .build();

    match built.and_then(|c| c.try_deserialize::<MeterflowConfig>()) {
        Ok(cfg) => cfg,
        Err(_) => MeterflowConfig::default(),
    }
}
