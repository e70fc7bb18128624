use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Order, OrderId},
    events::{ActorSide, NotificationAction, NotificationChannel, OrderNotification},
    timers::{ExpiryJob, ExpiryKind, JobKey},
};

/// A side effect that must only happen once the transition that produced it has committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxAction {
    Schedule(ExpiryJob),
    Cancel(JobKey),
    Notify(OrderNotification),
}

/// The result of a committed order transition: the order as it now stands, plus the deferred side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub order: Order,
    pub actions: Vec<OutboxAction>,
}

impl TransitionOutcome {
    pub fn new(order: Order) -> Self {
        Self { order, actions: Vec::new() }
    }

    pub fn schedule(mut self, kind: ExpiryKind, run_at: DateTime<Utc>) -> Self {
        let job = ExpiryJob::new(self.order.order_id.clone(), kind, run_at);
        self.actions.push(OutboxAction::Schedule(job));
        self
    }

    pub fn cancel(mut self, kind: ExpiryKind) -> Self {
        self.actions.push(OutboxAction::Cancel(JobKey::new(&self.order.order_id, kind)));
        self
    }

    /// Cancels both the hold and the trade timers.
    pub fn cancel_all_timers(self) -> Self {
        self.cancel(ExpiryKind::Hold).cancel(ExpiryKind::Trade)
    }

    /// Notifies the buyer, the seller and the order room.
    pub fn notify_parties(mut self, action: NotificationAction, actor_side: ActorSide) -> Self {
        let order = &self.order;
        let channels = [
            NotificationChannel::User(order.buyer_id.clone()),
            NotificationChannel::User(order.seller_id.clone()),
            NotificationChannel::Order(order.order_id.clone()),
        ];
        let notifications = channels
            .into_iter()
            .map(|channel| OrderNotification::new(channel, order, action, actor_side))
            .map(OutboxAction::Notify)
            .collect::<Vec<_>>();
        self.actions.extend(notifications);
        self
    }

    pub fn scheduled_jobs(&self) -> impl Iterator<Item = &ExpiryJob> {
        self.actions.iter().filter_map(|a| match a {
            OutboxAction::Schedule(job) => Some(job),
            _ => None,
        })
    }

    pub fn cancelled_keys(&self) -> impl Iterator<Item = &JobKey> {
        self.actions.iter().filter_map(|a| match a {
            OutboxAction::Cancel(key) => Some(key),
            _ => None,
        })
    }

    pub fn notifications(&self) -> impl Iterator<Item = &OrderNotification> {
        self.actions.iter().filter_map(|a| match a {
            OutboxAction::Notify(n) => Some(n),
            _ => None,
        })
    }
}

/// The result of running the expiry path for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpiryOutcome {
    /// The deadline has not passed yet (or was pushed back). Nothing changed.
    NotDue { due_at: DateTime<Utc> },
    /// The order is terminal, or its status does not match the expiry purpose. Nothing changed.
    Unchanged,
    /// The buyer was refunded and the order is `EXPIRED`.
    Expired(TransitionOutcome),
    /// The seller was paid and the order is `COMPLETED`.
    Completed(TransitionOutcome),
    /// A lapsed dispute was settled by the automatic verdict.
    AutoResolved(TransitionOutcome),
    /// A database error stopped the job. It has been re-armed to run again at `retry_at`.
    Deferred { retry_at: DateTime<Utc>, reason: String },
    /// The job could not be applied and will not be retried (e.g. the order does not exist).
    Retired { reason: String },
}

impl ExpiryOutcome {
    pub fn is_changed(&self) -> bool {
        self.transition().is_some()
    }

    pub fn transition(&self) -> Option<&TransitionOutcome> {
        match self {
            Self::Expired(t) | Self::Completed(t) | Self::AutoResolved(t) => Some(t),
            _ => None,
        }
    }

    pub fn order(&self) -> Option<&Order> {
        self.transition().map(|t| &t.order)
    }
}

/// Tally of a reconciliation sweep over overdue orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepResult {
    pub expired: Vec<OrderId>,
    pub completed: Vec<OrderId>,
    pub auto_resolved: Vec<OrderId>,
    pub unchanged: usize,
    pub deferred: usize,
    pub retired: usize,
}

impl SweepResult {
    pub fn record(&mut self, order_id: OrderId, outcome: &ExpiryOutcome) {
        match outcome {
            ExpiryOutcome::Expired(_) => self.expired.push(order_id),
            ExpiryOutcome::Completed(_) => self.completed.push(order_id),
            ExpiryOutcome::AutoResolved(_) => self.auto_resolved.push(order_id),
            ExpiryOutcome::NotDue { .. } | ExpiryOutcome::Unchanged => self.unchanged += 1,
            ExpiryOutcome::Deferred { .. } => self.deferred += 1,
            ExpiryOutcome::Retired { .. } => self.retired += 1,
        }
    }

    pub fn total_changed(&self) -> usize {
        self.expired.len() + self.completed.len() + self.auto_resolved.len()
    }
}

impl Display for SweepResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} expired, {} completed, {} auto-resolved, {} unchanged, {} deferred, {} retired",
            self.expired.len(),
            self.completed.len(),
            self.auto_resolved.len(),
            self.unchanged,
            self.deferred,
            self.retired
        )
    }
}
