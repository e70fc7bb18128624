//! # Timer / expiry service
//!
//! Orders carry two kinds of deadline: the hold deadline (the seller must accept before it) and the trade deadline
//! (set on acceptance and pushed back when a dispute is raised). The order flow asks an [`ExpiryScheduler`] to fire an
//! [`ExpiryJob`] when a deadline arrives and to cancel it when the deadline no longer matters.
//!
//! Two schedulers are provided:
//! * [`TokioScheduler`] runs each job as a sleeping tokio task and delivers it to the expiry worker over a channel.
//! * [`ManualScheduler`] never fires by itself, and is driven explicitly by tests and tooling.
mod job;
mod manual_scheduler;
mod scheduler;
mod tokio_scheduler;

pub use job::{ExpiryJob, ExpiryKind, JobKey};
pub use manual_scheduler::{ManualScheduler, SchedulerCall};
pub use scheduler::{CancelResult, ExpiryScheduler, SchedulerError};
pub use tokio_scheduler::TokioScheduler;
