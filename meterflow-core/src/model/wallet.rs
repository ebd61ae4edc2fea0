//! Wallets, credit grants, and the alert signals that ride along with them.

use crate::ids::{
    CreditGrantId, CustomerId, EnvironmentId, PlanId, SubscriptionId, TenantId, WalletId,
};
use crate::model::pricing::PriceKind;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    Prepaid,
    Promotional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    Active,
    Frozen,
    Closed,
}

/// A price type a wallet is allowed to pay toward. `All` means no
/// restriction: the wallet may be drawn against any invoice line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowedPriceType {
    All,
    Usage,
    Fixed,
}

impl AllowedPriceType {
    pub fn matches(self, kind: PriceKind) -> bool {
        match self {
            AllowedPriceType::All => true,
            AllowedPriceType::Usage => kind == PriceKind::Usage,
            AllowedPriceType::Fixed => kind == PriceKind::Fixed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WalletConfig {
    /// Empty set means unrestricted, equivalent to containing `All`.
    pub allowed_price_types: BTreeSet<AllowedPriceType>,
}

impl WalletConfig {
    pub fn allows(&self, kind: PriceKind) -> bool {
        self.allowed_price_types.is_empty()
            || self
                .allowed_price_types
                .iter()
                .any(|t| t.matches(kind))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub customer_id: CustomerId,
    pub currency: String,
    pub balance: Decimal,
    pub kind: WalletKind,
    pub status: WalletStatus,
    pub config: WalletConfig,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn is_usable(&self) -> bool {
        matches!(self.status, WalletStatus::Active) && self.balance > Decimal::ZERO
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditGrantCadence {
    OneTime,
    Recurring,
}

/// Materialized as a wallet top-up when a subscription is created, or when a
/// phase with this grant activates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditGrant {
    pub id: CreditGrantId,
    pub subscription_id: SubscriptionId,
    pub plan_id: PlanId,
    pub amount: Decimal,
    pub currency: String,
    pub cadence: CreditGrantCadence,
    pub expire_in_days: Option<u32>,
    /// Lower priority values are consumed first during payment allocation
    /// when multiple grants land in the same wallet.
    pub priority: i32,
}

/// Ephemeral signal that a customer's wallet balance may need recomputing.
/// Never persisted by the core; consumed directly off the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBalanceAlertEvent {
    pub id: String,
    pub tenant_id: TenantId,
    pub environment_id: EnvironmentId,
    pub customer_id: CustomerId,
    pub wallet_id: WalletId,
    pub source: String,
    pub force_calculate_balance: bool,
    pub timestamp: DateTime<Utc>,
}

/// A debit made against a wallet to pay down an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletPayment {
    pub wallet_id: WalletId,
    pub amount: Decimal,
}
