use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderId, OrderStatusType};

/// The two expiry purposes an order can have a timer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryKind {
    /// The seller failed to accept before `deadline_at`.
    Hold,
    /// The trade (or dispute) window closed at `trade_deadline_at`.
    Trade,
}

impl ExpiryKind {
    /// The timer purpose that is relevant for an order in the given status, if any.
    pub fn for_status(status: OrderStatusType) -> Option<Self> {
        match status {
            OrderStatusType::EscrowHeld => Some(Self::Hold),
            OrderStatusType::InTrade | OrderStatusType::AwaitConfirm | OrderStatusType::Disputed => Some(Self::Trade),
            OrderStatusType::Completed | OrderStatusType::Cancelled | OrderStatusType::Expired => None,
        }
    }

    /// The reason recorded in the audit trail when this timer expires an order.
    pub fn reason(&self) -> &'static str {
        match self {
            ExpiryKind::Hold => "SELLER_TIMEOUT",
            ExpiryKind::Trade => "TRADE_TIMEOUT",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryKind::Hold => "hold",
            ExpiryKind::Trade => "trade",
        }
    }
}

impl Display for ExpiryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniquely identifies a timer for an (order, purpose) pair, e.g. `order:1234:hold`.
///
/// Scheduling a job under a key that is already pending replaces the earlier job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey(String);

impl JobKey {
    pub fn new(order_id: &OrderId, kind: ExpiryKind) -> Self {
        Self(format!("order:{order_id}:{kind}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request to run the expiry path for `order_id` at or after `run_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryJob {
    pub order_id: OrderId,
    pub kind: ExpiryKind,
    pub run_at: DateTime<Utc>,
}

impl ExpiryJob {
    pub fn new(order_id: OrderId, kind: ExpiryKind, run_at: DateTime<Utc>) -> Self {
        Self { order_id, kind, run_at }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(&self.order_id, self.kind)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.run_at <= now
    }
}

impl Display for ExpiryJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.key(), self.run_at)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn job_keys() {
        let id = OrderId::from("abc");
        assert_eq!(JobKey::new(&id, ExpiryKind::Hold).as_str(), "order:abc:hold");
        assert_eq!(JobKey::new(&id, ExpiryKind::Trade).to_string(), "order:abc:trade");
        let job = ExpiryJob::new(id.clone(), ExpiryKind::Trade, Utc::now());
        assert_eq!(job.key(), JobKey::new(&id, ExpiryKind::Trade));
    }

    #[test]
    fn kind_for_status() {
        use OrderStatusType::*;
        assert_eq!(ExpiryKind::for_status(EscrowHeld), Some(ExpiryKind::Hold));
        assert_eq!(ExpiryKind::for_status(InTrade), Some(ExpiryKind::Trade));
        assert_eq!(ExpiryKind::for_status(AwaitConfirm), Some(ExpiryKind::Trade));
        assert_eq!(ExpiryKind::for_status(Disputed), Some(ExpiryKind::Trade));
        assert_eq!(ExpiryKind::for_status(Completed), None);
        assert_eq!(ExpiryKind::Hold.reason(), "SELLER_TIMEOUT");
        assert_eq!(ExpiryKind::Trade.reason(), "TRADE_TIMEOUT");
    }
}
