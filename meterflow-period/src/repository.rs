//! Repository boundaries the Period Engine needs from the relational store,
//! expressed as an explicit dependency set rather than a shared registry —
//! each is passed to [`crate::PeriodEngine::new`] directly.

use async_trait::async_trait;
use meterflow_core::error::Result;
use meterflow_core::ids::{MeterId, SubscriptionId, SubscriptionPauseId};
use meterflow_core::model::event::Meter;
use meterflow_core::model::invoice::Invoice;
use meterflow_core::model::subscription::{Subscription, SubscriptionPause};
use std::collections::HashMap;

/// A page of active subscriptions, keyed off the last-seen id for the next
/// page's `after_id`. Only subscriptions with `status ∈ {active, paused}`
/// are returned — cancelled subscriptions are never revisited.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn list_active_page(
        &self,
        after_id: Option<&SubscriptionId>,
        page_size: usize,
    ) -> Result<Vec<Subscription>>;

    async fn get(&self, id: &SubscriptionId) -> Result<Subscription>;

    async fn save(&self, subscription: &Subscription) -> Result<()>;
}

#[async_trait]
pub trait PauseRepository: Send + Sync {
    async fn get(&self, id: &SubscriptionPauseId) -> Result<SubscriptionPause>;
    async fn save(&self, pause: &SubscriptionPause) -> Result<()>;
}

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn insert(&self, invoice: Invoice) -> Result<Invoice>;
}

#[async_trait]
pub trait MeterRepository: Send + Sync {
    async fn get_many(&self, ids: &[MeterId]) -> Result<HashMap<MeterId, Meter>>;
}
