//! In-process timer service built on tokio tasks.
//!
//! Each scheduled job is a task that sleeps until the job's `run_at` time and then hands the job to the expiry worker
//! through an mpsc channel. A task removes its own entry from the pending table (under the lock) the moment it
//! fires. From then on the job counts as running, and cancelling its key no longer touches it.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::Utc;
use log::*;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};

use crate::timers::{CancelResult, ExpiryJob, ExpiryScheduler, JobKey, SchedulerError};

struct PendingTask {
    generation: u64,
    handle: JoinHandle<()>,
}

type PendingTable = Arc<Mutex<HashMap<JobKey, PendingTask>>>;

#[derive(Clone)]
pub struct TokioScheduler {
    sender: mpsc::Sender<ExpiryJob>,
    pending: PendingTable,
    generation: Arc<AtomicU64>,
}

impl TokioScheduler {
    pub fn new(sender: mpsc::Sender<ExpiryJob>) -> Self {
        Self { sender, pending: Arc::new(Mutex::new(HashMap::new())), generation: Arc::new(AtomicU64::new(0)) }
    }

    /// Creates a scheduler along with the receiving end of its job channel.
    pub fn channel(buffer_size: usize) -> (Self, mpsc::Receiver<ExpiryJob>) {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        (Self::new(sender), receiver)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_pending(&self, key: &JobKey) -> bool {
        self.pending.lock().await.contains_key(key)
    }

    /// Aborts every pending job. Jobs that have already fired are unaffected.
    pub async fn shutdown(&self) {
        let mut pending = self.pending.lock().await;
        let n = pending.len();
        for (_, task) in pending.drain() {
            task.handle.abort();
        }
        info!("🕰️ Timer service stopped. {n} pending job(s) dropped");
    }
}

impl ExpiryScheduler for TokioScheduler {
    async fn schedule(&self, job: ExpiryJob) -> Result<(), SchedulerError> {
        let key = job.key();
        if self.sender.is_closed() {
            return Err(SchedulerError::ShutDown(key));
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        // The lock is held until the new entry is in place, so that a job that is due immediately cannot fire before
        // it has been registered.
        let mut pending = self.pending.lock().await;
        if let Some(old) = pending.remove(&key) {
            old.handle.abort();
            trace!("🕰️ Pending job {key} replaced");
        }
        debug!("🕰️ Scheduling {job}");
        let handle = tokio::spawn(fire_when_due(job, generation, Arc::clone(&self.pending), self.sender.clone()));
        pending.insert(key, PendingTask { generation, handle });
        Ok(())
    }

    async fn cancel(&self, key: &JobKey) -> Result<CancelResult, SchedulerError> {
        let mut pending = self.pending.lock().await;
        match pending.remove(key) {
            Some(task) => {
                task.handle.abort();
                debug!("🕰️ Cancelled pending job {key}");
                Ok(CancelResult::Removed)
            },
            None => {
                trace!("🕰️ No pending job for {key}. Nothing to cancel");
                Ok(CancelResult::NotPending)
            },
        }
    }
}

async fn fire_when_due(job: ExpiryJob, generation: u64, pending: PendingTable, sender: mpsc::Sender<ExpiryJob>) {
    let delay = (job.run_at - Utc::now()).to_std().unwrap_or(std::time::Duration::ZERO);
    tokio::time::sleep(delay).await;
    let key = job.key();
    {
        let mut pending = pending.lock().await;
        match pending.get(&key) {
            Some(task) if task.generation == generation => {
                pending.remove(&key);
            },
            _ => {
                trace!("🕰️ Job {key} (generation {generation}) was superseded");
                return;
            },
        }
    }
    trace!("🕰️ Job {job} is due");
    if let Err(e) = sender.send(job).await {
        warn!("🕰️ Expiry worker is gone. Job {key} dropped: {e}");
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use tokio::time::timeout;

    use super::*;
    use crate::{db_types::OrderId, timers::ExpiryKind};

    fn job_in(ms: i64, kind: ExpiryKind) -> ExpiryJob {
        ExpiryJob::new(OrderId::from("order-1"), kind, Utc::now() + Duration::milliseconds(ms))
    }

    #[tokio::test]
    async fn job_fires_once_due() {
        let _ = env_logger::try_init();
        let (scheduler, mut rx) = TokioScheduler::channel(4);
        let job = job_in(50, ExpiryKind::Hold);
        scheduler.schedule(job.clone()).await.unwrap();
        assert!(scheduler.is_pending(&job.key()).await);
        let fired = timeout(StdDuration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(fired, job);
        assert!(Utc::now() >= job.run_at);
        assert_eq!(scheduler.pending_count().await, 0);
    }

    #[tokio::test]
    async fn overdue_job_fires_immediately() {
        let (scheduler, mut rx) = TokioScheduler::channel(4);
        let job = job_in(-60_000, ExpiryKind::Trade);
        scheduler.schedule(job.clone()).await.unwrap();
        let fired = timeout(StdDuration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(fired, job);
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_pending_job() {
        let (scheduler, mut rx) = TokioScheduler::channel(4);
        let first = job_in(60_000, ExpiryKind::Trade);
        let second = job_in(30, ExpiryKind::Trade);
        scheduler.schedule(first).await.unwrap();
        scheduler.schedule(second.clone()).await.unwrap();
        assert_eq!(scheduler.pending_count().await, 1);
        let fired = timeout(StdDuration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(fired.run_at, second.run_at);
        assert_eq!(scheduler.pending_count().await, 0);
    }

    #[tokio::test]
    async fn cancelled_job_never_fires() {
        let (scheduler, mut rx) = TokioScheduler::channel(4);
        let job = job_in(100, ExpiryKind::Hold);
        scheduler.schedule(job.clone()).await.unwrap();
        assert_eq!(scheduler.cancel(&job.key()).await.unwrap(), CancelResult::Removed);
        assert_eq!(scheduler.cancel(&job.key()).await.unwrap(), CancelResult::NotPending);
        assert!(timeout(StdDuration::from_millis(400), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn cancelling_a_fired_job_is_a_no_op() {
        let (scheduler, mut rx) = TokioScheduler::channel(4);
        let job = job_in(0, ExpiryKind::Hold);
        scheduler.schedule(job.clone()).await.unwrap();
        let fired = timeout(StdDuration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(scheduler.cancel(&fired.key()).await.unwrap(), CancelResult::NotPending);
    }

    #[tokio::test]
    async fn scheduling_after_the_worker_stops_fails() {
        let (scheduler, rx) = TokioScheduler::channel(4);
        drop(rx);
        let err = scheduler.schedule(job_in(10, ExpiryKind::Hold)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::ShutDown(_)));
    }
}
