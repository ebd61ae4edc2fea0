//! Plans, subscriptions, line items, pauses, and phase schedules.

use super::pricing::{BillingPeriodUnit, InvoiceCadence, Price};
use crate::ids::{
    CustomerId, EnvironmentId, MeterId, PlanId, PriceId, SubscriptionId, SubscriptionPauseId,
    SubscriptionScheduleId, TenantId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Active,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub status: PlanStatus,
    pub prices: Vec<Price>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseStatus {
    None,
    Scheduled,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentType {
    Amount,
    Quantity,
}

/// One priced item on a subscription. Currency and billing cadence must
/// match the parent subscription (enforced at create/update time, not here,
/// so this type can stay a plain data holder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionLineItem {
    pub price_id: PriceId,
    pub meter_id: Option<MeterId>,
    pub price: Price,
    pub quantity: Decimal,
    pub currency: String,
    pub billing_period: BillingPeriodUnit,
    pub billing_period_count: u32,
    pub invoice_cadence: InvoiceCadence,
    pub trial_period_days: Option<u32>,
    pub commitment_amount: Option<Decimal>,
    pub commitment_quantity: Option<Decimal>,
    pub commitment_type: Option<CommitmentType>,
    pub overage_factor: Option<Decimal>,
    /// Whether the commitment above applies per-bucket of a bucketed meter
    /// rather than once per billing period.
    pub is_window_commitment: bool,
}

impl SubscriptionLineItem {
    pub fn has_commitment(&self) -> bool {
        self.commitment_amount.is_some() || self.commitment_quantity.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycleAnchoring {
    /// Aligns period boundaries to the calendar unit (e.g. first of month).
    Calendar,
    /// Keeps the subscription start date's day-of-period.
    Anniversary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub tenant_id: TenantId,
    pub environment_id: EnvironmentId,
    pub customer_id: CustomerId,
    pub plan_id: PlanId,
    pub currency: String,
    pub status: SubscriptionStatus,
    pub pause_status: PauseStatus,
    pub active_pause_id: Option<SubscriptionPauseId>,
    pub start_date: DateTime<Utc>,
    pub billing_anchor: DateTime<Utc>,
    pub anchoring: BillingCycleAnchoring,
    pub billing_period: BillingPeriodUnit,
    pub billing_period_count: u32,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub cancel_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Subscription-level commitment: set only if no line item carries its
    /// own commitment (the two are mutually exclusive).
    pub commitment_amount: Option<Decimal>,
    pub overage_factor: Option<Decimal>,
    pub line_items: Vec<SubscriptionLineItem>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        matches!(self.status, SubscriptionStatus::Active)
    }

    pub fn has_subscription_level_commitment(&self) -> bool {
        self.commitment_amount.is_some()
    }

    pub fn has_line_item_commitment(&self) -> bool {
        self.line_items.iter().any(|li| li.has_commitment())
    }

    pub fn scope(&self) -> crate::ids::TenantScope {
        crate::ids::TenantScope::new(self.tenant_id.clone(), self.environment_id.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseMode {
    Immediate,
    Scheduled,
    PeriodEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    Immediate,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPause {
    pub id: SubscriptionPauseId,
    pub subscription_id: SubscriptionId,
    pub pause_status: PauseStatus,
    pub pause_mode: PauseMode,
    pub resume_mode: ResumeMode,
    pub pause_start: DateTime<Utc>,
    pub pause_end: Option<DateTime<Utc>>,
    pub original_period_start: DateTime<Utc>,
    pub original_period_end: DateTime<Utc>,
    pub resumed_at: Option<DateTime<Utc>>,
}

impl SubscriptionPause {
    pub fn is_terminal(&self) -> bool {
        matches!(self.pause_status, PauseStatus::None) && self.resumed_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleEndBehavior {
    Cancel,
    Renew,
    KeepAsIs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulePhase {
    pub index: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub line_items: Vec<SubscriptionLineItem>,
    pub credit_grants: Vec<crate::ids::CreditGrantId>,
    pub commitment_amount: Option<Decimal>,
    pub overage_factor: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSchedule {
    pub id: SubscriptionScheduleId,
    pub subscription_id: SubscriptionId,
    pub status: ScheduleStatus,
    pub current_phase_index: u32,
    pub end_behavior: ScheduleEndBehavior,
    pub phases: Vec<SchedulePhase>,
}

impl SubscriptionSchedule {
    pub fn current_phase(&self) -> Option<&SchedulePhase> {
        self.phases
            .iter()
            .find(|p| p.index == self.current_phase_index)
    }
}
