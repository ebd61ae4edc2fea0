//! Credit-grant materialization: turns a [`CreditGrant`] into a wallet
//! top-up, triggered when a subscription is created or a schedule phase that
//! carries the grant activates. The allocator consumes the resulting
//! balance the same way it consumes any other promotional wallet.

use async_trait::async_trait;
use meterflow_core::error::Result;
use meterflow_core::ids::{CustomerId, SubscriptionId, WalletId};
use meterflow_core::model::wallet::{CreditGrant, Wallet, WalletKind};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

#[async_trait]
pub trait WalletTopUpRepository: Send + Sync {
    /// The customer's existing wallet of `kind` in `currency`, if any. Grants
    /// land in a shared wallet per (customer, currency) rather than minting
    /// one wallet per grant.
    async fn find_wallet(
        &self,
        customer_id: &CustomerId,
        currency: &str,
        kind: WalletKind,
    ) -> Result<Option<Wallet>>;

    async fn create_wallet(&self, customer_id: &CustomerId, currency: &str, kind: WalletKind) -> Result<Wallet>;

    /// Credits `amount` onto an existing wallet; returns the balance after
    /// the credit.
    async fn credit(&self, wallet_id: &WalletId, amount: Decimal) -> Result<Decimal>;
}

/// One grant's materialization outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantMaterialization {
    pub wallet_id: WalletId,
    pub amount_credited: Decimal,
}

pub struct CreditGrantMaterializer {
    repository: Arc<dyn WalletTopUpRepository>,
}

impl CreditGrantMaterializer {
    pub fn new(repository: Arc<dyn WalletTopUpRepository>) -> Self {
        CreditGrantMaterializer { repository }
    }

    /// Materializes every grant for a subscription (at creation, or at phase
    /// activation) as a promotional-wallet top-up. Grants are applied lowest
    /// `priority` first so that, when several land in the same invocation,
    /// the ordering a caller observes in the resulting list is deterministic
    /// — the same ordering the allocator later consumes them in.
    pub async fn materialize(
        &self,
        customer_id: &CustomerId,
        subscription_id: &SubscriptionId,
        grants: &[CreditGrant],
    ) -> Result<Vec<GrantMaterialization>> {
        let mut ordered: Vec<&CreditGrant> = grants
            .iter()
            .filter(|g| &g.subscription_id == subscription_id)
            .collect();
        ordered.sort_by_key(|g| g.priority);

        let mut out = Vec::with_capacity(ordered.len());
        for grant in ordered {
            let wallet = match self
                .repository
                .find_wallet(customer_id, &grant.currency, WalletKind::Promotional)
                .await?
            {
                Some(w) => w,
                None => {
                    self.repository
                        .create_wallet(customer_id, &grant.currency, WalletKind::Promotional)
                        .await?
                }
            };
            let new_balance = self.repository.credit(&wallet.id, grant.amount).await?;
            info!(
                customer_id = %customer_id,
                subscription_id = %subscription_id,
                wallet_id = %wallet.id,
                amount = %grant.amount,
                new_balance = %new_balance,
                "credit grant materialized as wallet top-up"
            );
            out.push(GrantMaterialization {
                wallet_id: wallet.id,
                amount_credited: grant.amount,
            });
        }
        Ok(out)
    }
}
