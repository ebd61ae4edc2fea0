//! Scheduled-job orchestration contract: the state Meterflow owns for jobs
//! driven by the external workflow orchestrator.

pub mod scheduled_job;

pub use scheduled_job::{
    CreateScheduledJobRequest, InMemoryScheduledJobRepository, ScheduledJobRepository,
    ScheduledJobService,
};
