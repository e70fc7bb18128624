use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    config::EngineConfig,
    db_types::{ItemId, NewOrder, Order, OrderId, Role, UserId},
    dispute::SellerShare,
    events::EventProducers,
    order_machine::Party,
    timers::{ExpiryJob, ExpiryKind, ExpiryScheduler},
    traits::{
        AuthApiError,
        AuthManagement,
        EscrowDatabase,
        EscrowError,
        ExpiryOutcome,
        OutboxAction,
        SweepResult,
        TransitionOutcome,
    },
};

/// The reason code recorded when a dispute is raised without one.
pub const UNSPECIFIED_REASON: &str = "UNSPECIFIED";

/// `OrderFlowApi` is the primary API for driving orders through their lifecycle.
///
/// Every method runs one atomic transition against the backend, and then executes the transition's outbox: timers
/// are (re)scheduled or cancelled, and the order-updated hook is notified. Outbox failures are logged and never undo
/// the committed transition; the reconciliation sweep picks up any timer that was lost.
pub struct OrderFlowApi<B, S> {
    db: B,
    scheduler: S,
    producers: EventProducers,
    config: EngineConfig,
}

impl<B, S> Debug for OrderFlowApi<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: Clone, S: Clone> Clone for OrderFlowApi<B, S> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            scheduler: self.scheduler.clone(),
            producers: self.producers.clone(),
            config: self.config.clone(),
        }
    }
}

impl<B, S> OrderFlowApi<B, S> {
    pub fn new(db: B, scheduler: S, producers: EventProducers, config: EngineConfig) -> Self {
        Self { db, scheduler, producers, config }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<B, S> OrderFlowApi<B, S>
where
    B: EscrowDatabase,
    S: ExpiryScheduler,
{
    /// Buys an item. The item price is moved from the buyer's balance into escrow, and the seller has the configured
    /// hold window to accept.
    pub async fn buy(&self, buyer_id: &UserId, item_id: &ItemId) -> Result<Order, EscrowError> {
        let now = Utc::now();
        let order = NewOrder::new(buyer_id.clone(), item_id.clone(), now, now + self.config.hold_window);
        trace!("🔄️🛒️ {buyer_id} is buying item {item_id}. Order id {}", order.order_id);
        let outcome = self.db.create_order(order).await?;
        Ok(self.run_outbox(outcome).await)
    }

    pub async fn seller_accept(&self, order_id: &OrderId, seller_id: &UserId) -> Result<Order, EscrowError> {
        trace!("🔄️🤝️ {seller_id} is accepting order {order_id}");
        let outcome = self.db.seller_accept(order_id, seller_id, Utc::now(), self.config.trade_window).await?;
        Ok(self.run_outbox(outcome).await)
    }

    pub async fn seller_confirm(&self, order_id: &OrderId, seller_id: &UserId) -> Result<Order, EscrowError> {
        self.confirm(order_id, seller_id, Party::Seller).await
    }

    pub async fn buyer_confirm(&self, order_id: &OrderId, buyer_id: &UserId) -> Result<Order, EscrowError> {
        self.confirm(order_id, buyer_id, Party::Buyer).await
    }

    async fn confirm(&self, order_id: &OrderId, actor: &UserId, party: Party) -> Result<Order, EscrowError> {
        trace!("🔄️✅️ {actor} is confirming order {order_id} as the {}", party.side());
        let outcome = self.db.confirm(order_id, actor, party, Utc::now()).await?;
        Ok(self.run_outbox(outcome).await)
    }

    /// Cancels an order that the seller has not yet accepted. Either party may cancel, and the buyer is refunded.
    pub async fn cancel(&self, order_id: &OrderId, actor: &UserId) -> Result<Order, EscrowError> {
        trace!("🔄️❌️ {actor} is cancelling order {order_id}");
        let outcome = self.db.cancel_order(order_id, actor, Utc::now()).await?;
        Ok(self.run_outbox(outcome).await)
    }

    /// Opens a dispute on an order in active trade, and pushes the trade deadline out by the dispute extension.
    pub async fn raise_dispute(&self, order_id: &OrderId, actor: &UserId, reason_code: &str) -> Result<Order, EscrowError> {
        let reason_code = match reason_code.trim() {
            "" => UNSPECIFIED_REASON,
            code => code,
        };
        trace!("🔄️⚖️ {actor} is disputing order {order_id}: {reason_code}");
        let outcome =
            self.db.raise_dispute(order_id, actor, reason_code, Utc::now(), self.config.dispute_extension).await?;
        Ok(self.run_outbox(outcome).await)
    }

    /// Runs the expiry path for the order, as of `now`.
    ///
    /// If the stored deadline has moved past `now` (the job was stale or early), the timer is re-armed for the real
    /// deadline and nothing else happens.
    pub async fn expire_if_due(
        &self,
        order_id: &OrderId,
        kind: ExpiryKind,
        now: DateTime<Utc>,
    ) -> Result<ExpiryOutcome, EscrowError> {
        let outcome = self.db.expire_order(order_id, kind, now).await?;
        match &outcome {
            ExpiryOutcome::NotDue { due_at } => {
                debug!("🔄️🕰️ Order {order_id} is not due until {due_at}. Re-arming the {kind} timer");
                self.schedule(ExpiryJob::new(order_id.clone(), kind, *due_at)).await;
            },
            ExpiryOutcome::Unchanged => {
                debug!("🔄️🕰️ The {kind} timer for order {order_id} no longer applies. Nothing to do");
            },
            ExpiryOutcome::Expired(t) | ExpiryOutcome::Completed(t) | ExpiryOutcome::AutoResolved(t) => {
                info!("🔄️🕰️ Order {order_id} is now {} after its {kind} timer fired", t.order.status);
                self.execute_actions(&t.actions).await;
            },
            ExpiryOutcome::Deferred { retry_at, reason } => {
                warn!("🔄️🕰️ The {kind} job for order {order_id} was deferred to {retry_at}: {reason}");
            },
            ExpiryOutcome::Retired { reason } => {
                warn!("🔄️🕰️ The {kind} job for order {order_id} was retired: {reason}");
            },
        }
        Ok(outcome)
    }

    /// The entry point for fired timer jobs. This never fails. A database error re-arms the job after the configured
    /// retry delay. Any other error is logged and the job is retired, since retrying a job for an order that does not
    /// exist can never succeed.
    pub async fn handle_expiry_job(&self, job: ExpiryJob, now: DateTime<Utc>) -> ExpiryOutcome {
        match self.expire_if_due(&job.order_id, job.kind, now).await {
            Ok(outcome) => outcome,
            Err(EscrowError::AlreadySettled(reason)) | Err(EscrowError::AlreadyResolved(reason)) => {
                debug!("🔄️🕰️ Job {job} found a settled order. {reason}");
                ExpiryOutcome::Unchanged
            },
            Err(EscrowError::DatabaseError(reason)) => {
                let retry_at = now + self.config.expiry_retry_delay;
                warn!("🔄️🕰️ Job {job} hit a database error and will run again at {retry_at}. {reason}");
                self.schedule(ExpiryJob::new(job.order_id.clone(), job.kind, retry_at)).await;
                ExpiryOutcome::Deferred { retry_at, reason }
            },
            Err(e) => {
                error!("🔄️🕰️ Job {job} could not be applied and is being retired. {e}");
                ExpiryOutcome::Retired { reason: e.to_string() }
            },
        }
    }

    /// Re-runs the expiry path for every non-terminal order whose deadline has passed. This recovers timers that were
    /// lost between a commit and its outbox, for example across a restart.
    pub async fn reconcile_overdue(&self, now: DateTime<Utc>) -> Result<SweepResult, EscrowError> {
        let overdue = self.db.fetch_overdue_orders(now, self.config.sweep_batch_size).await?;
        let mut result = SweepResult::default();
        if overdue.is_empty() {
            trace!("🔄️🧹️ No overdue orders");
            return Ok(result);
        }
        debug!("🔄️🧹️ {} overdue order(s) found", overdue.len());
        for order in overdue {
            let outcome = match ExpiryKind::for_status(order.status) {
                Some(kind) => self.handle_expiry_job(ExpiryJob::new(order.order_id.clone(), kind, now), now).await,
                None => ExpiryOutcome::Unchanged,
            };
            result.record(order.order_id, &outcome);
        }
        info!("🔄️🧹️ Reconciliation sweep complete: {result}");
        Ok(result)
    }

    async fn run_outbox(&self, outcome: TransitionOutcome) -> Order {
        self.execute_actions(&outcome.actions).await;
        outcome.order
    }

    async fn execute_actions(&self, actions: &[OutboxAction]) {
        for action in actions {
            match action {
                OutboxAction::Schedule(job) => self.schedule(job.clone()).await,
                OutboxAction::Cancel(key) => match self.scheduler.cancel(key).await {
                    Ok(result) => trace!("🔄️🕰️ Cancel {key}: {result:?}"),
                    Err(e) => warn!("🔄️🕰️ Could not cancel {key}. The job will find nothing to do when it fires. {e}"),
                },
                OutboxAction::Notify(notification) => {
                    for producer in &self.producers.order_updated_producer {
                        producer.publish_event(notification.clone()).await;
                    }
                },
            }
        }
    }

    async fn schedule(&self, job: ExpiryJob) {
        let key = job.key();
        if let Err(e) = self.scheduler.schedule(job).await {
            warn!("🔄️🕰️ Could not schedule {key}. The reconciliation sweep will pick it up. {e}");
        }
    }
}

impl<B, S> OrderFlowApi<B, S>
where
    B: EscrowDatabase + AuthManagement,
    S: ExpiryScheduler,
{
    /// Settles a dispute by splitting the escrow between the parties. Only admins may do this.
    pub async fn admin_resolve(
        &self,
        order_id: &OrderId,
        admin_id: &UserId,
        share: SellerShare,
        note: Option<String>,
    ) -> Result<Order, EscrowError> {
        match self.db.check_user_has_roles(admin_id, &[Role::Admin]).await {
            Ok(()) => {},
            Err(AuthApiError::RoleNotAllowed(_)) => {
                warn!("🔄️⚖️ {admin_id} tried to resolve the dispute on order {order_id} without admin rights");
                return Err(EscrowError::Forbidden(format!("{admin_id} is not an admin")));
            },
            Err(e) => return Err(e.into()),
        }
        trace!("🔄️⚖️ {admin_id} is resolving the dispute on order {order_id} with {share:?}");
        let outcome = self.db.resolve_dispute(order_id, admin_id, share, note, Utc::now()).await?;
        Ok(self.run_outbox(outcome).await)
    }
}
