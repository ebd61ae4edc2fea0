//! Invoices: written once by the Period Engine, mutated thereafter only by
//! the payment path.

use crate::ids::{CustomerId, InvoiceId, MeterId, PriceId, SubscriptionId};
use crate::model::pricing::PriceKind;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    PartiallyPaid,
    Paid,
    Void,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub price_id: Option<PriceId>,
    pub price_type: Option<PriceKind>,
    pub meter_id: Option<MeterId>,
    pub quantity: Decimal,
    pub amount: Decimal,
    /// Set when this line carries overage charges, i.e. a commitment on the
    /// owning subscription or line item was exceeded.
    pub has_overage: bool,
}

/// Where in the period lifecycle an invoice was cut. Matches the Period
/// Engine's `reference_point = period_end` rule: every invoice the engine
/// produces is anchored to the period boundary it closes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePoint {
    PeriodStart,
    PeriodEnd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub customer_id: CustomerId,
    pub subscription_id: Option<SubscriptionId>,
    pub currency: String,
    pub amount_due: Decimal,
    pub amount_paid: Decimal,
    pub amount_remaining: Decimal,
    pub status: InvoiceStatus,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub reference_point: ReferencePoint,
    pub line_items: Vec<InvoiceLineItem>,
}

impl Invoice {
    pub fn recompute_totals(&mut self) {
        self.amount_due = self.line_items.iter().map(|li| li.amount).sum();
        self.amount_remaining = self.amount_due - self.amount_paid;
    }

    pub fn is_paid(&self) -> bool {
        matches!(self.status, InvoiceStatus::Paid)
    }

    /// Sum of amounts on line items whose price type matches `kind`, folding
    /// line items with no price type (e.g. manual adjustments) into `Fixed`.
    pub fn amount_by_price_type(&self, kind: PriceKind) -> Decimal {
        self.line_items
            .iter()
            .filter(|li| li.price_type.unwrap_or(PriceKind::Fixed) == kind)
            .map(|li| li.amount)
            .sum()
    }
}
