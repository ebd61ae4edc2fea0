//! Scheduled-job orchestration contract.
//!
//! The workflow orchestrator itself is an external collaborator; this
//! service owns only the `ScheduledJob` entity's state and its interactions
//! with [`WorkflowOrchestrator`] — start/stop/trigger and `next_run_at`
//! computation. The REST surface described in the system boundary is
//! summarized by the request/response types below; actual HTTP routing is
//! out of scope.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use meterflow_core::error::{Error, Result};
use meterflow_core::ids::ScheduledJobId;
use meterflow_core::model::scheduled_job::{
    EntityType, JobConfig, ScheduleInterval, ScheduledJob, ScheduledJobStatus,
};
use meterflow_core::ports::WorkflowOrchestrator;
use std::sync::Arc;
use tracing::{info, warn};

/// Repository boundary for scheduled-job persistence. Kept separate from
/// [`meterflow_core::ports::RelationalStore`] because scheduled jobs are not
/// touched by the per-subscription transactional scope that trait exists
/// to describe.
#[async_trait]
pub trait ScheduledJobRepository: Send + Sync {
    async fn insert(&self, job: ScheduledJob) -> Result<ScheduledJob>;
    async fn get(&self, id: &ScheduledJobId) -> Result<ScheduledJob>;
    async fn list(&self, connection_id: &str) -> Result<Vec<ScheduledJob>>;
    async fn update(&self, job: ScheduledJob) -> Result<ScheduledJob>;
    async fn delete(&self, id: &ScheduledJobId) -> Result<()>;
}

/// In-memory repository used in tests and as a reference adapter. Backed by
/// `DashMap` (same concurrent-map idiom as `meterflow-wallet`'s alert
/// throttle cache) rather than a `Mutex`/`RwLock`-guarded `HashMap`, since
/// jobs across different connections are touched by independent callers
/// concurrently.
#[derive(Default)]
pub struct InMemoryScheduledJobRepository {
    jobs: DashMap<String, ScheduledJob>,
}

#[async_trait]
impl ScheduledJobRepository for InMemoryScheduledJobRepository {
    async fn insert(&self, job: ScheduledJob) -> Result<ScheduledJob> {
        if self.jobs.contains_key(&job.id.0) {
            return Err(Error::already_exists(format!(
                "scheduled job {} already exists",
                job.id
            )));
        }
        self.jobs.insert(job.id.0.clone(), job.clone());
        Ok(job)
    }

    async fn get(&self, id: &ScheduledJobId) -> Result<ScheduledJob> {
        self.jobs
            .get(&id.0)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found(format!("scheduled job {id} not found")))
    }

    async fn list(&self, connection_id: &str) -> Result<Vec<ScheduledJob>> {
        Ok(self
            .jobs
            .iter()
            .filter(|entry| entry.value().connection_id == connection_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn update(&self, job: ScheduledJob) -> Result<ScheduledJob> {
        if !self.jobs.contains_key(&job.id.0) {
            return Err(Error::not_found(format!("scheduled job {} not found", job.id)));
        }
        self.jobs.insert(job.id.0.clone(), job.clone());
        Ok(job)
    }

    async fn delete(&self, id: &ScheduledJobId) -> Result<()> {
        self.jobs
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("scheduled job {id} not found")))
    }
}

#[derive(Debug, Clone)]
pub struct CreateScheduledJobRequest {
    pub connection_id: String,
    pub entity_type: EntityType,
    pub interval: ScheduleInterval,
    pub job_config: JobConfig,
}

/// Validates the closed enumerations and connector-config shape, creates the
/// job row, and starts it on the orchestrator.
pub struct ScheduledJobService {
    repository: Arc<dyn ScheduledJobRepository>,
    orchestrator: Arc<dyn WorkflowOrchestrator>,
}

impl ScheduledJobService {
    pub fn new(
        repository: Arc<dyn ScheduledJobRepository>,
        orchestrator: Arc<dyn WorkflowOrchestrator>,
    ) -> Self {
        ScheduledJobService {
            repository,
            orchestrator,
        }
    }

    fn validate_job_config(entity_type: EntityType, config: &JobConfig) -> Result<()> {
        match config {
            JobConfig::ObjectStorageExport { bucket, .. } => {
                if bucket.trim().is_empty() {
                    return Err(Error::validation("object storage export requires a bucket"));
                }
                if matches!(entity_type, EntityType::Wallet) {
                    // Wallet balances are derived state, not export-worthy
                    // snapshots on their own.
                    return Err(Error::validation(
                        "wallet entity_type is not supported for object_storage_export",
                    ));
                }
                Ok(())
            }
        }
    }

    pub async fn create(&self, req: CreateScheduledJobRequest) -> Result<ScheduledJob> {
        Self::validate_job_config(req.entity_type, &req.job_config)?;
        let now = Utc::now();
        let job = ScheduledJob {
            id: ScheduledJobId(uuid::Uuid::new_v4().to_string()),
            connection_id: req.connection_id,
            entity_type: req.entity_type,
            interval: req.interval,
            enabled: true,
            job_config: req.job_config,
            next_run_at: req.interval.next_run_after(now),
            status: ScheduledJobStatus::Enabled,
        };
        let job = self.repository.insert(job).await?;
        self.orchestrator.start_scheduled_job(&job.id.0).await?;
        info!(job_id = %job.id, "started scheduled job");
        Ok(job)
    }

    pub async fn get(&self, id: &ScheduledJobId) -> Result<ScheduledJob> {
        self.repository.get(id).await
    }

    pub async fn list(&self, connection_id: &str) -> Result<Vec<ScheduledJob>> {
        self.repository.list(connection_id).await
    }

    pub async fn disable(&self, id: &ScheduledJobId) -> Result<ScheduledJob> {
        let mut job = self.repository.get(id).await?;
        if !job.enabled {
            return Err(Error::invalid_operation(format!("job {id} already disabled")));
        }
        job.enabled = false;
        job.status = ScheduledJobStatus::Disabled;
        let job = self.repository.update(job).await?;
        self.orchestrator.stop_scheduled_job(&job.id.0).await?;
        Ok(job)
    }

    pub async fn delete(&self, id: &ScheduledJobId) -> Result<()> {
        self.orchestrator.stop_scheduled_job(&id.0).await.ok();
        self.repository.delete(id).await
    }

    /// Advances `next_run_at` after a successful run. Called by the
    /// orchestrator's completion callback, not on a timer inside this crate.
    pub async fn record_run_completed(&self, id: &ScheduledJobId) -> Result<ScheduledJob> {
        let mut job = self.repository.get(id).await?;
        job.advance(Utc::now());
        job.status = ScheduledJobStatus::Enabled;
        self.repository.update(job).await
    }

    pub async fn trigger_manual_sync(&self, id: &ScheduledJobId) -> Result<String> {
        let job = self.repository.get(id).await?;
        if !job.enabled {
            warn!(job_id = %job.id, "manual sync triggered on a disabled job");
        }
        self.orchestrator.trigger_manual_sync(&job.id.0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterflow_core::model::scheduled_job::ExportFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeOrchestrator {
        manual_syncs: AtomicUsize,
    }

    #[async_trait]
    impl WorkflowOrchestrator for FakeOrchestrator {
        async fn start_scheduled_job(&self, _job_id: &str) -> Result<()> {
            Ok(())
        }
        async fn stop_scheduled_job(&self, _job_id: &str) -> Result<()> {
            Ok(())
        }
        async fn trigger_manual_sync(&self, job_id: &str) -> Result<String> {
            self.manual_syncs.fetch_add(1, Ordering::SeqCst);
            Ok(format!("workflow-for-{job_id}"))
        }
    }

    fn service() -> ScheduledJobService {
        ScheduledJobService::new(
            Arc::new(InMemoryScheduledJobRepository::default()),
            Arc::new(FakeOrchestrator {
                manual_syncs: AtomicUsize::new(0),
            }),
        )
    }

    #[tokio::test]
    async fn rejects_wallet_object_storage_export() {
        let svc = service();
        let result = svc
            .create(CreateScheduledJobRequest {
                connection_id: "conn-1".into(),
                entity_type: EntityType::Wallet,
                interval: ScheduleInterval::Daily,
                job_config: JobConfig::ObjectStorageExport {
                    bucket: "exports".into(),
                    prefix: "wallets/".into(),
                    format: ExportFormat::NdJson,
                },
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn create_then_trigger_manual_sync() {
        let svc = service();
        let job = svc
            .create(CreateScheduledJobRequest {
                connection_id: "conn-1".into(),
                entity_type: EntityType::Invoice,
                interval: ScheduleInterval::Hourly,
                job_config: JobConfig::ObjectStorageExport {
                    bucket: "exports".into(),
                    prefix: "invoices/".into(),
                    format: ExportFormat::Csv,
                },
            })
            .await
            .unwrap();
        let workflow_id = svc.trigger_manual_sync(&job.id).await.unwrap();
        assert_eq!(workflow_id, format!("workflow-for-{}", job.id));
    }

    #[tokio::test]
    async fn record_run_completed_advances_next_run_at() {
        let svc = service();
        let job = svc
            .create(CreateScheduledJobRequest {
                connection_id: "conn-1".into(),
                entity_type: EntityType::Event,
                interval: ScheduleInterval::Daily,
                job_config: JobConfig::ObjectStorageExport {
                    bucket: "exports".into(),
                    prefix: "events/".into(),
                    format: ExportFormat::Parquet,
                },
            })
            .await
            .unwrap();
        let first_next_run = job.next_run_at;
        let updated = svc.record_run_completed(&job.id).await.unwrap();
        assert!(updated.next_run_at > first_next_run);
    }
}
