//! Trait boundaries toward the external collaborators named in the system
//! overview: the broker, the analytical store, the relational store, and the
//! workflow orchestrator. Each is a black box; these traits are the entire
//! contract this crate has with them; concrete adapters (Kafka, ClickHouse,
//! Postgres, Temporal, ...) live outside this workspace.

use crate::error::Result;
use crate::ids::{CustomerId, EnvironmentId, MeterId, TenantId};
use crate::model::event::Event;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A message as delivered off a broker topic: an opaque payload plus the
/// partition metadata the Ingestor needs to scope it.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub id: String,
    pub partition_key: String,
    pub tenant_id: TenantId,
    pub environment_id: EnvironmentId,
    pub payload: Vec<u8>,
}

/// Publish side of the broker. `Subscribe` is modeled as a handler callback
/// driven by the adapter, not as a trait method here, since its shape (task
/// per partition, at-least-once redelivery) is the adapter's responsibility;
/// this crate only needs to publish and to classify delivery outcomes.
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    async fn publish(&self, topic: &str, message: BrokerMessage) -> Result<()>;
}

/// One bulk-insertable event batch, deduplicated downstream by `event_id`.
#[async_trait]
pub trait AnalyticalStore: Send + Sync {
    async fn bulk_insert_events(&self, events: &[Event]) -> Result<()>;

    /// Aggregates usage for every `(meter, filter_group)` pair named across
    /// `requests` in a single round-trip, rather than one call per meter.
    async fn aggregate_usage(
        &self,
        requests: &[AggregateUsageRequest],
    ) -> Result<Vec<MeterAggregateResult>>;
}

#[derive(Debug, Clone)]
pub struct MeterAggregateResult {
    pub meter_id: MeterId,
    pub results: Vec<AggregateUsageResult>,
}

#[derive(Debug, Clone)]
pub struct AggregateUsageRequest {
    pub tenant_id: TenantId,
    pub environment_id: EnvironmentId,
    pub external_customer_id: CustomerId,
    pub meter_id: MeterId,
    pub filter_groups: Vec<FilterGroupQuery>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FilterGroupQuery {
    pub filter_group_id: String,
    pub constraints: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateUsageResult {
    pub filter_group_id: String,
    pub aggregated_value: Decimal,
    /// Present when the meter declares a `bucket_size`: one result per
    /// bucket instead of a single total.
    pub bucket: Option<DateTime<Utc>>,
}

/// Row-level lock handle held for the duration of a subscription's period
/// advance, so at most one worker touches a subscription at a time. Dropping
/// it releases the advisory lock; the relational store adapter is
/// responsible for making `Drop` release the underlying lock even on panic.
pub trait SubscriptionLock: Send {}

/// The relational store's contract for the Period Engine. Every method here
/// that names a subscription runs inside a single relational transaction
/// covering the subscription row, its line items, invoices, and pause
/// records together — that transactional scope *is* the "WithTx" pattern
/// the source system names; we expose it as one atomic repository call
/// per unit of work instead of a generic callback, since the set of tables
/// touched together never varies within this core.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Acquires the per-subscription advisory lock used to serialize period
    /// advances for one subscription across workers.
    async fn lock_subscription(&self, subscription_id: &str) -> Result<Box<dyn SubscriptionLock>>;
}

/// The workflow orchestrator that owns scheduled-job cadence and manual
/// triggers. Start/stop register or deregister the job's recurring run;
/// `trigger_manual_sync` kicks off a one-off run and returns its workflow id.
#[async_trait]
pub trait WorkflowOrchestrator: Send + Sync {
    async fn start_scheduled_job(&self, job_id: &str) -> Result<()>;
    async fn stop_scheduled_job(&self, job_id: &str) -> Result<()>;
    async fn trigger_manual_sync(&self, job_id: &str) -> Result<String>;
}
