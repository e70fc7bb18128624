use std::time::Duration;

use chrono::Utc;
use escrow_engine::{db_types::OrderId, timers::ExpiryJob, ExpiryOutcome};
use log::*;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::server::EscrowFlowApi;

/// Starts the expiry worker, which applies every job the timer service fires, one at a time. The worker holds a clone
/// of the scheduler, so the job channel stays open and the worker runs indefinitely. Do not await the returned
/// JoinHandle; abort it on shutdown.
pub fn start_expiry_worker(api: EscrowFlowApi, mut jobs: mpsc::Receiver<ExpiryJob>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("🕰️ Expiry worker started");
        while let Some(job) = jobs.recv().await {
            debug!("🕰️ Timer fired: {job}");
            match api.handle_expiry_job(job.clone(), Utc::now()).await {
                ExpiryOutcome::NotDue { due_at } => debug!("🕰️ {job} is not due until {due_at}. Rescheduled."),
                ExpiryOutcome::Unchanged => debug!("🕰️ {job} changed nothing"),
                ExpiryOutcome::Deferred { retry_at, .. } => warn!("🕰️ {job} failed and will run again at {retry_at}"),
                ExpiryOutcome::Retired { reason } => warn!("🕰️ {job} was retired. {reason}"),
                outcome => {
                    if let Some(order) = outcome.order() {
                        info!("🕰️ {job} moved order {} to {}", order.order_id, order.status);
                    }
                },
            }
        }
        info!("🕰️ Expiry worker stopped");
    })
}

/// Starts the reconciliation sweep. The first sweep runs immediately, so that orders whose deadlines passed while
/// the daemon was down are settled on startup. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_sweep_worker(api: EscrowFlowApi, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("🕰️ Overdue order sweep started. Running every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running overdue order sweep");
            match api.reconcile_overdue(Utc::now()).await {
                Ok(result) if result.total_changed() > 0 => {
                    info!("🕰️ Overdue order sweep: {result}");
                    debug!("🕰️ Expired orders: {}", order_list(&result.expired));
                    debug!("🕰️ Completed orders: {}", order_list(&result.completed));
                    debug!("🕰️ Auto-resolved orders: {}", order_list(&result.auto_resolved));
                },
                Ok(result) => trace!("🕰️ Overdue order sweep: {result}"),
                Err(e) => {
                    error!("🕰️ Error running overdue order sweep: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[OrderId]) -> String {
    orders.iter().map(|o| o.to_string()).collect::<Vec<String>>().join(", ")
}
