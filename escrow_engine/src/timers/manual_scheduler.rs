use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};

use crate::timers::{CancelResult, ExpiryJob, ExpiryScheduler, JobKey, SchedulerError};

/// A call that was made against a [`ManualScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCall {
    Schedule(ExpiryJob),
    Cancel(JobKey),
}

#[derive(Default)]
struct ManualState {
    pending: HashMap<JobKey, ExpiryJob>,
    history: Vec<SchedulerCall>,
}

/// A scheduler that never fires on its own. It records every call and lets the caller decide when jobs run, which
/// makes timer-driven flows deterministic in tests and tooling.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All pending jobs, earliest first.
    pub fn pending_jobs(&self) -> Vec<ExpiryJob> {
        let mut jobs = self.state().pending.values().cloned().collect::<Vec<_>>();
        jobs.sort_by(|a, b| a.run_at.cmp(&b.run_at).then_with(|| a.key().cmp(&b.key())));
        jobs
    }

    pub fn pending_job(&self, key: &JobKey) -> Option<ExpiryJob> {
        self.state().pending.get(key).cloned()
    }

    pub fn is_pending(&self, key: &JobKey) -> bool {
        self.state().pending.contains_key(key)
    }

    /// Removes and returns every pending job that is due at `now`, earliest first.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<ExpiryJob> {
        let mut state = self.state();
        let due_keys = state.pending.iter().filter(|(_, j)| j.is_due(now)).map(|(k, _)| k.clone()).collect::<Vec<_>>();
        let mut due = due_keys.iter().filter_map(|k| state.pending.remove(k)).collect::<Vec<_>>();
        due.sort_by(|a, b| a.run_at.cmp(&b.run_at));
        due
    }

    pub fn history(&self) -> Vec<SchedulerCall> {
        self.state().history.clone()
    }

    pub fn clear_history(&self) {
        self.state().history.clear();
    }
}

impl ExpiryScheduler for ManualScheduler {
    async fn schedule(&self, job: ExpiryJob) -> Result<(), SchedulerError> {
        let mut state = self.state();
        state.history.push(SchedulerCall::Schedule(job.clone()));
        state.pending.insert(job.key(), job);
        Ok(())
    }

    async fn cancel(&self, key: &JobKey) -> Result<CancelResult, SchedulerError> {
        let mut state = self.state();
        state.history.push(SchedulerCall::Cancel(key.clone()));
        match state.pending.remove(key) {
            Some(_) => Ok(CancelResult::Removed),
            None => Ok(CancelResult::NotPending),
        }
    }
}
