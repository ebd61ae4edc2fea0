//! Newtype identifiers.
//!
//! Tenant, environment, and customer identity flow through every component
//! (broker metadata, analytical-store filters, relational rows). Wrapping
//! them in distinct types instead of passing bare `String`s stops a tenant id
//! and a customer id from being swapped at a call site by accident.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }
    };
}

string_id!(TenantId);
string_id!(EnvironmentId);
string_id!(CustomerId);
string_id!(EventId);
string_id!(MeterId);
string_id!(PriceId);
string_id!(PlanId);
string_id!(SubscriptionId);
string_id!(InvoiceId);
string_id!(WalletId);
string_id!(CreditGrantId);
string_id!(SubscriptionPauseId);
string_id!(SubscriptionScheduleId);
string_id!(ScheduledJobId);

/// A `(tenant, environment)` pair. The broker partitions, the analytical
/// store filters, and the relational store scopes almost every query by this
/// pair, so it is threaded as a single unit rather than two loose strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    pub tenant_id: TenantId,
    pub environment_id: EnvironmentId,
}

impl TenantScope {
    pub fn new(tenant_id: impl Into<TenantId>, environment_id: impl Into<EnvironmentId>) -> Self {
        TenantScope {
            tenant_id: tenant_id.into(),
            environment_id: environment_id.into(),
        }
    }

    /// The deterministic broker partition key for this scope plus a
    /// customer, so all events for one customer land on one partition.
    pub fn partition_key(&self, customer_id: &CustomerId) -> String {
        format!("{}:{}:{}", self.tenant_id, self.environment_id, customer_id)
    }
}
