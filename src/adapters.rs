//! In-memory reference adapters for every port this binary wires together.
//!
//! The broker, analytical store, and relational store are external
//! collaborators; production deployments replace these with real clients
//! (a partitioned log, a columnar store, Postgres). These stand-ins exist so
//! the binary runs standalone, the same role
//! `meterflow_tenant::InMemoryScheduledJobRepository` plays for scheduled
//! jobs.

use async_trait::async_trait;
use chrono::Utc;
use meterflow_aggregator::UsageAggregatorService;
use meterflow_core::error::{Error, Result};
use meterflow_core::ids::{
    CustomerId, EnvironmentId, MeterId, SubscriptionId, SubscriptionPauseId, TenantId, WalletId,
};
use meterflow_core::model::event::{Event, Meter};
use meterflow_core::model::invoice::Invoice;
use meterflow_core::model::subscription::{Subscription, SubscriptionPause};
use meterflow_core::model::wallet::{Wallet, WalletPayment};
use meterflow_core::ports::{
    AggregateUsageRequest, AnalyticalStore, BrokerMessage, BrokerPublisher, MeterAggregateResult,
    RelationalStore, SubscriptionLock, WorkflowOrchestrator,
};
use meterflow_ingest::{DeadLetterSink, PostProcessingEnrollment};
use meterflow_core::model::wallet::WalletKind;
use meterflow_period::{InvoiceRepository, MeterRepository, PauseRepository, SubscriptionRepository};
use meterflow_wallet::{WalletRepository, WalletTopUpRepository};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

struct NoopLock;
impl SubscriptionLock for NoopLock {}

#[derive(Default)]
pub struct InMemoryRelationalStore;

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn lock_subscription(&self, _subscription_id: &str) -> Result<Box<dyn SubscriptionLock>> {
        Ok(Box::new(NoopLock))
    }
}

/// Logs every insert instead of writing to a columnar store, and returns no
/// usage so the Pricing Engine always sees zero quantity until a real store
/// is wired in.
#[derive(Default)]
pub struct LoggingAnalyticalStore;

#[async_trait]
impl AnalyticalStore for LoggingAnalyticalStore {
    async fn bulk_insert_events(&self, events: &[Event]) -> Result<()> {
        info!(count = events.len(), "bulk-inserted events (in-memory stand-in)");
        Ok(())
    }

    async fn aggregate_usage(
        &self,
        requests: &[AggregateUsageRequest],
    ) -> Result<Vec<MeterAggregateResult>> {
        Ok(requests
            .iter()
            .map(|r| MeterAggregateResult {
                meter_id: r.meter_id.clone(),
                results: vec![],
            })
            .collect())
    }
}

#[derive(Default)]
pub struct LoggingBrokerPublisher;

#[async_trait]
impl BrokerPublisher for LoggingBrokerPublisher {
    async fn publish(&self, topic: &str, message: BrokerMessage) -> Result<()> {
        info!(topic, message_id = %message.id, "published message (in-memory stand-in)");
        Ok(())
    }
}

#[derive(Default)]
pub struct LoggingDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LoggingDeadLetterSink {
    async fn send(&self, message: BrokerMessage, reason: &str) -> Result<()> {
        tracing::warn!(message_id = %message.id, reason, "message routed to dead-letter sink");
        Ok(())
    }
}

pub struct NeverEnrolled;

#[async_trait]
impl PostProcessingEnrollment for NeverEnrolled {
    async fn is_enrolled(&self, _tenant_id: &TenantId, _environment_id: &EnvironmentId) -> Result<bool> {
        Ok(false)
    }
}

#[derive(Default)]
pub struct LoggingWalletBalanceRecompute;

#[async_trait]
impl meterflow_wallet::WalletBalanceRecomputeService for LoggingWalletBalanceRecompute {
    async fn recompute(
        &self,
        event: &meterflow_core::model::wallet::WalletBalanceAlertEvent,
    ) -> Result<()> {
        info!(customer_id = %event.customer_id, wallet_id = %event.wallet_id, "recomputed wallet balance (in-memory stand-in)");
        Ok(())
    }
}

#[derive(Default)]
pub struct NoopWorkflowOrchestrator;

#[async_trait]
impl WorkflowOrchestrator for NoopWorkflowOrchestrator {
    async fn start_scheduled_job(&self, _job_id: &str) -> Result<()> {
        Ok(())
    }
    async fn stop_scheduled_job(&self, _job_id: &str) -> Result<()> {
        Ok(())
    }
    async fn trigger_manual_sync(&self, job_id: &str) -> Result<String> {
        Ok(format!("workflow-for-{job_id}"))
    }
}

#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    rows: Mutex<HashMap<String, Subscription>>,
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn list_active_page(
        &self,
        after_id: Option<&SubscriptionId>,
        page_size: usize,
    ) -> Result<Vec<Subscription>> {
        let rows = self.rows.lock().unwrap();
        let mut all: Vec<Subscription> = rows.values().cloned().collect();
        all.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        let start = match after_id {
            Some(id) => all.iter().position(|s| &s.id == id).map(|i| i + 1).unwrap_or(0),
            None => 0,
        };
        Ok(all.into_iter().skip(start).take(page_size).collect())
    }

    async fn get(&self, id: &SubscriptionId) -> Result<Subscription> {
        self.rows
            .lock()
            .unwrap()
            .get(&id.0)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("subscription {id} not found")))
    }

    async fn save(&self, subscription: &Subscription) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(subscription.id.0.clone(), subscription.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPauseRepository {
    rows: Mutex<HashMap<String, SubscriptionPause>>,
}

#[async_trait]
impl PauseRepository for InMemoryPauseRepository {
    async fn get(&self, id: &SubscriptionPauseId) -> Result<SubscriptionPause> {
        self.rows
            .lock()
            .unwrap()
            .get(&id.0)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("pause {id} not found")))
    }

    async fn save(&self, pause: &SubscriptionPause) -> Result<()> {
        self.rows.lock().unwrap().insert(pause.id.0.clone(), pause.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryInvoiceRepository {
    rows: Mutex<Vec<Invoice>>,
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn insert(&self, invoice: Invoice) -> Result<Invoice> {
        self.rows.lock().unwrap().push(invoice.clone());
        Ok(invoice)
    }
}

#[derive(Default)]
pub struct InMemoryMeterRepository {
    rows: Mutex<HashMap<String, Meter>>,
}

#[async_trait]
impl MeterRepository for InMemoryMeterRepository {
    async fn get_many(&self, ids: &[MeterId]) -> Result<HashMap<MeterId, Meter>> {
        let rows = self.rows.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(&id.0).map(|m| (id.clone(), m.clone())))
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryWalletRepository {
    wallets: Mutex<HashMap<String, Wallet>>,
}

#[async_trait]
impl WalletRepository for InMemoryWalletRepository {
    async fn list_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<Wallet>> {
        Ok(self
            .wallets
            .lock()
            .unwrap()
            .values()
            .filter(|w| &w.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn debit(&self, wallet_id: &WalletId, amount: Decimal) -> Result<WalletPayment> {
        let mut wallets = self.wallets.lock().unwrap();
        let wallet = wallets
            .get_mut(&wallet_id.0)
            .ok_or_else(|| Error::not_found(format!("wallet {wallet_id} not found")))?;
        if wallet.balance < amount {
            return Err(Error::invalid_operation(format!("wallet {wallet_id} has insufficient balance")));
        }
        wallet.balance -= amount;
        Ok(WalletPayment {
            wallet_id: wallet_id.clone(),
            amount,
        })
    }
}

#[async_trait]
impl WalletTopUpRepository for InMemoryWalletRepository {
    async fn find_wallet(
        &self,
        customer_id: &CustomerId,
        currency: &str,
        kind: WalletKind,
    ) -> Result<Option<Wallet>> {
        Ok(self
            .wallets
            .lock()
            .unwrap()
            .values()
            .find(|w| {
                &w.customer_id == customer_id
                    && w.currency.eq_ignore_ascii_case(currency)
                    && w.kind == kind
            })
            .cloned())
    }

    async fn create_wallet(&self, customer_id: &CustomerId, currency: &str, kind: WalletKind) -> Result<Wallet> {
        let wallet = Wallet {
            id: WalletId(uuid::Uuid::new_v4().to_string()),
            customer_id: customer_id.clone(),
            currency: currency.to_string(),
            balance: Decimal::ZERO,
            kind,
            status: meterflow_core::model::wallet::WalletStatus::Active,
            config: meterflow_core::model::wallet::WalletConfig::default(),
            created_at: Utc::now(),
        };
        self.wallets
            .lock()
            .unwrap()
            .insert(wallet.id.0.clone(), wallet.clone());
        Ok(wallet)
    }

    async fn credit(&self, wallet_id: &WalletId, amount: Decimal) -> Result<Decimal> {
        let mut wallets = self.wallets.lock().unwrap();
        let wallet = wallets
            .get_mut(&wallet_id.0)
            .ok_or_else(|| Error::not_found(format!("wallet {wallet_id} not found")))?;
        wallet.balance += amount;
        Ok(wallet.balance)
    }
}

pub fn build_usage_aggregator() -> UsageAggregatorService {
    UsageAggregatorService::new(std::sync::Arc::new(LoggingAnalyticalStore))
}

/// Timestamp helper kept here (rather than inline at call sites) so the
/// places that need "now" for period math read identically to the ones
/// that need it for alert throttling.
pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}
