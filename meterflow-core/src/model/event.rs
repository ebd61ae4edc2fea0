//! Metered events and the meters that aggregate them.

use crate::ids::{CustomerId, EnvironmentId, EventId, MeterId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A scalar property value carried on an event. Mirrors the wire-exact
/// `{<string>: <scalar|string|number|bool>}` payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            PropertyValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// A raw metered event, as produced by a tenant's application and ingested
/// from the broker. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub tenant_id: TenantId,
    pub environment_id: EnvironmentId,
    pub external_customer_id: CustomerId,
    pub event_name: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub properties: BTreeMap<String, PropertyValue>,
}

/// How a meter reduces the stream of matching events into a single number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    Sum,
    Count,
    Max,
    Latest,
    Unique,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterAggregation {
    pub aggregation_type: AggregationType,
    /// The event property the aggregation reduces over. Unused for `Count`.
    pub field: Option<String>,
    /// Required for window-commitment meters: splits usage into fixed-size
    /// buckets (e.g. daily) rather than one total for the period.
    pub bucket_size: Option<BucketSize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketSize {
    Hour,
    Day,
    Week,
    Month,
}

/// A tenant-owned definition of how to turn a stream of events with a given
/// `event_name` into billable usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meter {
    pub id: MeterId,
    pub event_name: String,
    pub aggregation: MeterAggregation,
    /// Property keys that usage price filter groups are allowed to constrain.
    pub filter_keys: BTreeSet<String>,
    pub display_name: String,
}

impl Meter {
    pub fn requires_bucket(&self) -> bool {
        self.aggregation.bucket_size.is_some()
    }
}
