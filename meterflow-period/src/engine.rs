//! The subscription period state machine: pause pre-checks, period
//! catch-up, invoice generation, and cancel-at-period-end detection.

use crate::repository::{InvoiceRepository, MeterRepository, PauseRepository, SubscriptionRepository};
use chrono::{DateTime, Utc};
use meterflow_aggregator::UsageAggregatorService;
use meterflow_core::error::{Error, Result};
use meterflow_core::ids::{MeterId, SubscriptionId};
use meterflow_core::model::invoice::{Invoice, InvoiceLineItem, InvoiceStatus, ReferencePoint};
use meterflow_core::model::pricing::PriceKind;
use meterflow_core::model::subscription::{
    PauseMode, PauseStatus, Subscription, SubscriptionLineItem, SubscriptionStatus,
};
use meterflow_core::ports::RelationalStore;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of processing one subscription in a batch run.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// One or more periods were rolled forward; `invoices_created` counts
    /// the invoices produced (zero if the subscription was cancelled before
    /// its first elapsed period finished).
    Advanced { invoices_created: usize },
    /// A scheduled pause transitioned to active; no periods were rolled.
    PauseActivated,
    /// A pause ended and the subscription resumed with its period end
    /// dilated, but no further periods had elapsed yet.
    Resumed,
    /// Nothing to do this invocation (still paused, or already current).
    NoOp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub subscription_id: SubscriptionId,
    pub outcome: std::result::Result<BatchOutcome, String>,
}

/// `UpdateBillingPeriods()`'s return value: never aborts the whole scan on a
/// single subscription's failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub total_success: usize,
    pub total_failed: usize,
    pub items: Vec<BatchItem>,
}

pub struct PeriodEngine {
    subscriptions: Arc<dyn SubscriptionRepository>,
    pauses: Arc<dyn PauseRepository>,
    invoices: Arc<dyn InvoiceRepository>,
    meters: Arc<dyn MeterRepository>,
    relational_store: Arc<dyn RelationalStore>,
    aggregator: Arc<UsageAggregatorService>,
}

impl PeriodEngine {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        pauses: Arc<dyn PauseRepository>,
        invoices: Arc<dyn InvoiceRepository>,
        meters: Arc<dyn MeterRepository>,
        relational_store: Arc<dyn RelationalStore>,
        aggregator: Arc<UsageAggregatorService>,
    ) -> Self {
        PeriodEngine {
            subscriptions,
            pauses,
            invoices,
            meters,
            relational_store,
            aggregator,
        }
    }

    /// Pages through every active/paused subscription and advances each one
    /// whose period has fallen behind `now`. Failures are isolated per
    /// subscription; the scan always completes and reports a summary.
    pub async fn update_billing_periods(&self, now: DateTime<Utc>, page_size: usize) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        let mut after_id: Option<SubscriptionId> = None;

        loop {
            let page = self
                .subscriptions
                .list_active_page(after_id.as_ref(), page_size)
                .await?;
            if page.is_empty() {
                break;
            }
            after_id = page.last().map(|s| s.id.clone());

            for subscription in &page {
                let subscription_id = subscription.id.clone();
                match self.process_one(subscription_id.clone(), now).await {
                    Ok(outcome) => {
                        summary.total_success += 1;
                        summary.items.push(BatchItem {
                            subscription_id,
                            outcome: Ok(outcome),
                        });
                    }
                    Err(e) => {
                        warn!(subscription_id = %subscription_id, error = %e, "period advance failed for subscription");
                        summary.total_failed += 1;
                        summary.items.push(BatchItem {
                            subscription_id,
                            outcome: Err(e.to_string()),
                        });
                    }
                }
            }

            if page.len() < page_size {
                break;
            }
        }

        Ok(summary)
    }

    /// Runs the full per-subscription state machine under the subscription's
    /// advisory lock: pause pre-checks, then period catch-up.
    async fn process_one(&self, subscription_id: SubscriptionId, now: DateTime<Utc>) -> Result<BatchOutcome> {
        let _lock = self.relational_store.lock_subscription(&subscription_id.0).await?;

        // Re-fetch inside the lock so we act on the latest row, not a
        // possibly-stale copy from the page listing.
        let mut subscription = self.subscriptions.get(&subscription_id).await?;

        if let Some(outcome) = self.run_pause_precheck(&mut subscription, now).await? {
            return Ok(outcome);
        }

        self.catch_up_periods(&mut subscription, now).await
    }

    /// Returns `Some(outcome)` when the pre-check fully handled this
    /// invocation (pause activated, still paused with nothing to do, or just
    /// resumed); `None` means the subscription was never paused and is clear
    /// to run period catch-up directly.
    async fn run_pause_precheck(
        &self,
        subscription: &mut Subscription,
        now: DateTime<Utc>,
    ) -> Result<Option<BatchOutcome>> {
        if subscription.status == SubscriptionStatus::Paused {
            let pause_id = subscription.active_pause_id.clone().ok_or_else(|| {
                Error::internal("paused subscription has no active_pause_id")
                    .with_detail("subscription_id", subscription.id.0.clone())
            })?;
            let mut pause = self.pauses.get(&pause_id).await?;

            let ready_to_resume = pause.pause_end.map(|end| end <= now).unwrap_or(false);
            if !ready_to_resume {
                return Ok(Some(BatchOutcome::NoOp));
            }

            let pause_duration = now - pause.pause_start;
            pause.pause_status = PauseStatus::None;
            pause.resumed_at = Some(now);
            self.pauses.save(&pause).await?;

            subscription.status = SubscriptionStatus::Active;
            subscription.pause_status = PauseStatus::None;
            subscription.active_pause_id = None;
            subscription.current_period_end = subscription.current_period_end + pause_duration;
            self.subscriptions.save(subscription).await?;

            info!(subscription_id = %subscription.id, pause_duration_secs = pause_duration.num_seconds(), "subscription resumed, period end dilated");
            return Ok(Some(BatchOutcome::Resumed));
        }

        if subscription.pause_status == PauseStatus::Scheduled {
            let pause_id = subscription.active_pause_id.clone().ok_or_else(|| {
                Error::internal("scheduled pause has no active_pause_id")
                    .with_detail("subscription_id", subscription.id.0.clone())
            })?;
            let mut pause = self.pauses.get(&pause_id).await?;

            let should_activate = match pause.pause_mode {
                PauseMode::PeriodEnd => now >= subscription.current_period_end,
                PauseMode::Scheduled => now >= pause.pause_start,
                PauseMode::Immediate => true,
            };

            if should_activate {
                pause.pause_status = PauseStatus::Active;
                self.pauses.save(&pause).await?;

                subscription.status = SubscriptionStatus::Paused;
                subscription.pause_status = PauseStatus::Active;
                self.subscriptions.save(subscription).await?;

                info!(subscription_id = %subscription.id, "scheduled pause activated");
                return Ok(Some(BatchOutcome::PauseActivated));
            }
        }

        Ok(None)
    }

    async fn catch_up_periods(&self, subscription: &mut Subscription, now: DateTime<Utc>) -> Result<BatchOutcome> {
        let mut cursor_start = subscription.current_period_start;
        let mut cursor_end = subscription.current_period_end;
        let mut elapsed_periods = Vec::new();

        while cursor_end < now {
            elapsed_periods.push((cursor_start, cursor_end));
            let next_end = meterflow_core::period_math::next_period_boundary(
                cursor_end,
                subscription.billing_anchor,
                subscription.billing_period,
                subscription.billing_period_count,
                subscription.anchoring,
            );
            cursor_start = cursor_end;
            cursor_end = next_end;
        }

        if elapsed_periods.is_empty() {
            return Ok(BatchOutcome::NoOp);
        }

        let meter_ids = usage_meter_ids(subscription);
        let meters: std::collections::HashMap<MeterId, meterflow_core::model::event::Meter> =
            if meter_ids.is_empty() {
                std::collections::HashMap::new()
            } else {
                self.meters.get_many(&meter_ids).await?
            };

        let is_active = matches!(subscription.status, SubscriptionStatus::Active);
        if !is_active {
            // Paused or already-cancelled subscriptions shouldn't be walked
            // forward at all.
            return Ok(BatchOutcome::NoOp);
        }

        let mut invoices_created = 0usize;
        let mut cancelled = false;

        for (period_start, period_end) in &elapsed_periods {
            let invoice = self
                .build_invoice_for_period(subscription, &meters, *period_start, *period_end)
                .await?;
            self.invoices.insert(invoice).await?;
            invoices_created += 1;

            if subscription.cancel_at_period_end {
                if let Some(cancel_at) = subscription.cancel_at {
                    if cancel_at <= *period_end {
                        subscription.status = SubscriptionStatus::Cancelled;
                        subscription.cancelled_at = Some(now);
                        subscription.current_period_start = *period_start;
                        subscription.current_period_end = *period_end;
                        cancelled = true;
                        break;
                    }
                }
            }
        }

        if !cancelled {
            subscription.current_period_start = cursor_start;
            subscription.current_period_end = cursor_end;
        }

        self.subscriptions.save(subscription).await?;

        info!(
            subscription_id = %subscription.id,
            invoices_created,
            cancelled,
            new_period_end = %subscription.current_period_end,
            "subscription period advanced"
        );

        Ok(BatchOutcome::Advanced { invoices_created })
    }

    async fn build_invoice_for_period(
        &self,
        subscription: &Subscription,
        meters: &std::collections::HashMap<MeterId, meterflow_core::model::event::Meter>,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Invoice> {
        let mut line_items = Vec::new();

        for li in &subscription.line_items {
            if li.price.kind != PriceKind::Fixed {
                continue;
            }
            let charge = meterflow_pricing::price_line_item(li, li.quantity, None)?;
            line_items.push(InvoiceLineItem {
                price_id: Some(li.price_id.clone()),
                price_type: Some(PriceKind::Fixed),
                meter_id: None,
                quantity: li.quantity,
                amount: charge.total(),
                has_overage: charge.has_overage,
            });
        }

        let usage_line_items: Vec<&SubscriptionLineItem> =
            subscription.line_items.iter().filter(|li| li.price.is_usage()).collect();

        if !usage_line_items.is_empty() {
            let usage = self
                .aggregator
                .get_usage(
                    &subscription.scope(),
                    &subscription.customer_id,
                    subscription,
                    meters,
                    (period_start, period_end),
                )
                .await?;

            if subscription.has_subscription_level_commitment() {
                let mut charges = Vec::with_capacity(usage_line_items.len());
                for li in &usage_line_items {
                    let quantity = usage
                        .by_price
                        .get(&li.price_id)
                        .map(|u| u.total)
                        .unwrap_or(Decimal::ZERO);
                    charges.push(meterflow_pricing::calculate_cost(&li.price, quantity)?.amount);
                }
                let commitment_amount = subscription.commitment_amount.unwrap_or(Decimal::ZERO);
                let overage_factor = subscription.overage_factor.unwrap_or(Decimal::ONE);
                let result = meterflow_pricing::apply_subscription_commitment(
                    &charges,
                    commitment_amount,
                    overage_factor,
                );
                line_items.push(InvoiceLineItem {
                    price_id: None,
                    price_type: Some(PriceKind::Usage),
                    meter_id: None,
                    quantity: Decimal::from(charges.len() as u64),
                    amount: result.total(),
                    has_overage: result.has_overage(),
                });
            } else {
                for li in &usage_line_items {
                    let price_usage = usage.by_price.get(&li.price_id);
                    let quantity = price_usage.map(|u| u.total).unwrap_or(Decimal::ZERO);
                    let bucket_quantities: Option<Vec<Decimal>> = if li.is_window_commitment {
                        price_usage.map(|u| {
                            let mut buckets = u.buckets.clone();
                            buckets.sort_by_key(|b| b.bucket_start);
                            buckets.into_iter().map(|b| b.value).collect()
                        })
                    } else {
                        None
                    };
                    let charge = meterflow_pricing::price_line_item(
                        li,
                        quantity,
                        bucket_quantities.as_deref(),
                    )?;
                    line_items.push(InvoiceLineItem {
                        price_id: Some(li.price_id.clone()),
                        price_type: Some(PriceKind::Usage),
                        meter_id: li.meter_id.clone(),
                        quantity,
                        amount: charge.total(),
                        has_overage: charge.has_overage,
                    });
                }
            }
        }

        let mut invoice = Invoice {
            id: meterflow_core::ids::InvoiceId(Uuid::new_v4().to_string()),
            customer_id: subscription.customer_id.clone(),
            subscription_id: Some(subscription.id.clone()),
            currency: subscription.currency.clone(),
            amount_due: Decimal::ZERO,
            amount_paid: Decimal::ZERO,
            amount_remaining: Decimal::ZERO,
            status: InvoiceStatus::Issued,
            period_start,
            period_end,
            reference_point: ReferencePoint::PeriodEnd,
            line_items,
        };
        invoice.recompute_totals();
        Ok(invoice)
    }
}

fn usage_meter_ids(subscription: &Subscription) -> Vec<MeterId> {
    let mut seen = HashSet::new();
    subscription
        .line_items
        .iter()
        .filter_map(|li| li.meter_id.clone())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// `cancel_at_period_end=false`: the subscription stops immediately.
pub fn cancel_immediately(subscription: &mut Subscription, now: DateTime<Utc>) {
    subscription.status = SubscriptionStatus::Cancelled;
    subscription.cancelled_at = Some(now);
    subscription.cancel_at = None;
    subscription.cancel_at_period_end = false;
}

/// The subscription keeps running until its current period ends, at which
/// point the next `UpdateBillingPeriods` run flips it to cancelled.
pub fn cancel_at_period_end(subscription: &mut Subscription, now: DateTime<Utc>) {
    subscription.cancel_at = Some(subscription.current_period_end);
    subscription.cancelled_at = Some(now);
    subscription.cancel_at_period_end = true;
}
