//! Enumerated runtime configuration.
//!
//! Loading this from files/env is an external concern (out of scope per the
//! system boundary); this module only defines the shape, the way the
//! teacher's `SaaSConfig` centralizes every subsystem's settings behind one
//! typed root without itself doing any file I/O.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    pub topic: String,
    pub consumer_group: String,
    /// Messages per second the handler is throttled to, per topic.
    pub rate_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventProcessingConfig {
    pub live: TopicConfig,
    pub lazy: TopicConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletBalanceAlertConfig {
    pub topic: TopicConfig,
    #[serde(with = "humantime_serde_duration")]
    pub throttle_window: Duration,
}

impl Default for WalletBalanceAlertConfig {
    fn default() -> Self {
        WalletBalanceAlertConfig {
            topic: TopicConfig {
                topic: "wallet_balance_alerts".to_string(),
                consumer_group: "wallet-alert-pipeline".to_string(),
                rate_limit: 200,
            },
            throttle_window: Duration::from_secs(60),
        }
    }
}

/// Optional platform-billing passthrough: when set, every ingested event
/// also synthesizes a derived `tenant_event` billed against this tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformBillingConfig {
    pub tenant_id: String,
    pub environment_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureFlagConfig {
    pub force_v1_for_tenant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterflowConfig {
    pub event_processing: EventProcessingConfig,
    pub wallet_balance_alert: WalletBalanceAlertConfig,
    pub billing: Option<PlatformBillingConfig>,
    pub feature_flag: FeatureFlagConfig,
}

impl Default for MeterflowConfig {
    fn default() -> Self {
        MeterflowConfig {
            event_processing: EventProcessingConfig {
                live: TopicConfig {
                    topic: "events".to_string(),
                    consumer_group: "event-ingestor".to_string(),
                    rate_limit: 1000,
                },
                lazy: TopicConfig {
                    topic: "events.lazy".to_string(),
                    consumer_group: "event-ingestor-lazy".to_string(),
                    rate_limit: 200,
                },
            },
            wallet_balance_alert: WalletBalanceAlertConfig::default(),
            billing: None,
            feature_flag: FeatureFlagConfig::default(),
        }
    }
}

/// `serde` has no built-in `Duration` (de)serializer that reads plain
/// seconds; the teacher's configs serialize `Duration` fields directly
/// because their config loader (the `config` crate) handles the conversion
/// for them. We do the same thing explicitly here so this module has no
/// dependency on a config-loading crate at all.
mod humantime_serde_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
