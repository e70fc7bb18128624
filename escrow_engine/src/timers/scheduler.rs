use thiserror::Error;

use crate::timers::{ExpiryJob, JobKey};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("The scheduler has shut down. Job {0} was not scheduled")]
    ShutDown(JobKey),
}

/// What happened to a job when it was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelResult {
    /// The job was pending and has been removed.
    Removed,
    /// No pending job exists for the key. It either never existed, or has already fired and may still be running.
    NotPending,
}

/// Delayed-job capability required by the order flow.
///
/// Delivery is at-least-once and may be late, never meaningfully early. Consumers re-check the order's stored
/// deadline when a job fires, so a stale or duplicate delivery is harmless.
#[allow(async_fn_in_trait)]
pub trait ExpiryScheduler: Clone {
    /// Registers `job` to fire at or after `job.run_at`, replacing any pending job with the same key.
    async fn schedule(&self, job: ExpiryJob) -> Result<(), SchedulerError>;

    /// Best-effort cancellation. A job that has already started running is left to complete.
    async fn cancel(&self, key: &JobKey) -> Result<CancelResult, SchedulerError>;
}
