//! Scheduled jobs: state owned by the core, execution owned by the external
//! workflow orchestrator.

use crate::ids::ScheduledJobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleInterval {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl ScheduleInterval {
    /// Computes the next run instant strictly after `now`, per the fixed
    /// enum cadences the orchestrator surface exposes.
    pub fn next_run_after(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ScheduleInterval::Hourly => now + chrono::Duration::hours(1),
            ScheduleInterval::Daily => now + chrono::Duration::days(1),
            ScheduleInterval::Weekly => now + chrono::Duration::weeks(1),
            ScheduleInterval::Monthly => crate::period_math::add_months_clamped(now, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Event,
    Invoice,
    Subscription,
    Wallet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledJobStatus {
    Enabled,
    Disabled,
    Running,
    Failed,
}

/// A typed connector config for scheduled export jobs. The connector's own
/// workflow body is out of scope; only its declared shape is validated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "connector", rename_all = "snake_case")]
pub enum JobConfig {
    ObjectStorageExport {
        bucket: String,
        prefix: String,
        format: ExportFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    NdJson,
    Parquet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: ScheduledJobId,
    pub connection_id: String,
    pub entity_type: EntityType,
    pub interval: ScheduleInterval,
    pub enabled: bool,
    pub job_config: JobConfig,
    pub next_run_at: DateTime<Utc>,
    pub status: ScheduledJobStatus,
}

impl ScheduledJob {
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.next_run_at = self.interval.next_run_after(now);
    }
}
