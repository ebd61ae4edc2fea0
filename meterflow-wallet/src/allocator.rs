//! Wallet Payment Allocator: pays an invoice down using one or more of a
//! customer's wallets, respecting wallet-type priority, currency match, and
//! per-wallet allowed-price-type restrictions.

use async_trait::async_trait;
use meterflow_core::error::Result;
use meterflow_core::ids::{CustomerId, WalletId};
use meterflow_core::model::invoice::{Invoice, InvoiceStatus};
use meterflow_core::model::pricing::PriceKind;
use meterflow_core::model::wallet::{AllowedPriceType, Wallet, WalletKind, WalletPayment, WalletStatus};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn list_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<Wallet>>;

    /// Attempts to debit `amount` from the wallet. A conflicting concurrent
    /// write or an insufficient balance at commit time returns `Err`; the
    /// allocator treats that as a soft, per-wallet failure and moves on.
    async fn debit(&self, wallet_id: &WalletId, amount: Decimal) -> Result<WalletPayment>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationStrategy {
    PromotionalFirst,
    PrepaidFirst,
    BalanceOptimized,
}

#[derive(Debug, Clone, Copy)]
pub struct PayOptions {
    pub strategy: AllocationStrategy,
    pub max_wallets_to_use: Option<usize>,
}

impl Default for PayOptions {
    fn default() -> Self {
        PayOptions {
            strategy: AllocationStrategy::PrepaidFirst,
            max_wallets_to_use: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentOutcome {
    pub amount_paid: Decimal,
    pub payments: Vec<WalletPayment>,
}

pub struct WalletPaymentAllocator {
    wallets: Arc<dyn WalletRepository>,
}

impl WalletPaymentAllocator {
    pub fn new(wallets: Arc<dyn WalletRepository>) -> Self {
        WalletPaymentAllocator { wallets }
    }

    pub async fn pay(&self, invoice: &mut Invoice, options: &PayOptions) -> Result<PaymentOutcome> {
        let mut candidates = self.wallets.list_for_customer(&invoice.customer_id).await?;
        candidates.retain(|w| {
            w.status == WalletStatus::Active
                && w.currency.eq_ignore_ascii_case(&invoice.currency)
                && w.balance > Decimal::ZERO
        });
        sort_wallets(&mut candidates, options.strategy);

        let mut remaining_by_type: HashMap<PriceKind, Decimal> = HashMap::new();
        remaining_by_type.insert(PriceKind::Usage, invoice.amount_by_price_type(PriceKind::Usage));
        remaining_by_type.insert(PriceKind::Fixed, invoice.amount_by_price_type(PriceKind::Fixed));
        let mut remaining_total = invoice.amount_remaining;

        let max_wallets = options.max_wallets_to_use.unwrap_or(usize::MAX);
        let mut payments = Vec::new();

        for wallet in &candidates {
            if remaining_total <= Decimal::ZERO || payments.len() >= max_wallets {
                break;
            }

            let allowed = allowed_amount(wallet, &remaining_by_type, remaining_total);
            let pay_amount = allowed.min(wallet.balance).min(remaining_total);
            if pay_amount <= Decimal::ZERO {
                continue;
            }

            match self.wallets.debit(&wallet.id, pay_amount).await {
                Ok(payment) => {
                    deduct(&mut remaining_by_type, wallet, pay_amount);
                    remaining_total -= pay_amount;
                    payments.push(payment);
                }
                Err(e) => {
                    warn!(wallet_id = %wallet.id, error = %e, "wallet debit failed, skipping to next wallet");
                    continue;
                }
            }
        }

        let amount_paid: Decimal = payments.iter().map(|p| p.amount).sum();
        invoice.amount_paid += amount_paid;
        invoice.amount_remaining = invoice.amount_due - invoice.amount_paid;
        invoice.status = if invoice.amount_remaining <= Decimal::ZERO {
            InvoiceStatus::Paid
        } else if invoice.amount_paid > Decimal::ZERO {
            InvoiceStatus::PartiallyPaid
        } else {
            invoice.status
        };

        Ok(PaymentOutcome {
            amount_paid,
            payments,
        })
    }
}

fn sort_wallets(wallets: &mut [Wallet], strategy: AllocationStrategy) {
    match strategy {
        AllocationStrategy::PromotionalFirst => {
            wallets.sort_by_key(|w| if w.kind == WalletKind::Promotional { 0 } else { 1 })
        }
        AllocationStrategy::PrepaidFirst => {
            wallets.sort_by_key(|w| if w.kind == WalletKind::Prepaid { 0 } else { 1 })
        }
        AllocationStrategy::BalanceOptimized => {
            wallets.sort_by(|a, b| a.balance.cmp(&b.balance))
        }
    }
}

fn wallet_allows_all(wallet: &Wallet) -> bool {
    wallet.config.allowed_price_types.is_empty()
        || wallet.config.allowed_price_types.contains(&AllowedPriceType::All)
}

fn allowed_amount(
    wallet: &Wallet,
    remaining_by_type: &HashMap<PriceKind, Decimal>,
    remaining_total: Decimal,
) -> Decimal {
    if wallet_allows_all(wallet) {
        return remaining_total;
    }
    [PriceKind::Usage, PriceKind::Fixed]
        .into_iter()
        .filter(|kind| wallet.config.allows(*kind))
        .map(|kind| remaining_by_type.get(&kind).copied().unwrap_or(Decimal::ZERO))
        .sum()
}

/// Deducts `amount` from the owed-by-price-type buckets: proportionally
/// across both buckets for an unrestricted wallet, or straight out of the
/// specific bucket(s) the wallet is restricted to.
fn deduct(remaining_by_type: &mut HashMap<PriceKind, Decimal>, wallet: &Wallet, amount: Decimal) {
    if wallet_allows_all(wallet) {
        let total_before: Decimal = remaining_by_type.values().copied().sum();
        if total_before <= Decimal::ZERO {
            return;
        }
        let kinds: Vec<PriceKind> = remaining_by_type.keys().copied().collect();
        let mut applied = Decimal::ZERO;
        for (i, kind) in kinds.iter().enumerate() {
            let is_last = i == kinds.len() - 1;
            let current = remaining_by_type[kind];
            // The last bucket absorbs the rounding remainder so the buckets
            // always sum back to `remaining_total - amount` exactly.
            let share = if is_last {
                amount - applied
            } else {
                (current / total_before) * amount
            };
            if let Some(v) = remaining_by_type.get_mut(kind) {
                *v = (*v - share).max(Decimal::ZERO);
            }
            applied += share;
        }
        return;
    }

    let mut remaining_amount = amount;
    for kind in [PriceKind::Usage, PriceKind::Fixed] {
        if remaining_amount <= Decimal::ZERO {
            break;
        }
        if !wallet.config.allows(kind) {
            continue;
        }
        if let Some(v) = remaining_by_type.get_mut(&kind) {
            let take = (*v).min(remaining_amount);
            *v -= take;
            remaining_amount -= take;
        }
    }
}
