//! Guards and policies of the order state machine.
//!
//! Everything in this module is pure: it inspects an [`Order`] and decides whether a transition is allowed, and what
//! it should do. The database backends call these guards inside their transactions, after reading the order, and
//! before writing anything. A guard failure therefore never leaves partial state behind.
//!
//! ```text
//!   (buy) ──► ESCROW_HELD ──accept──► IN_TRADE ──confirm──► AWAIT_CONFIRM ──confirm──► COMPLETED
//!                 │  │                    │  └──────────────────┬─┘   │
//!          cancel │  │ hold timeout       │ trade timeout       │     │ trade timeout
//!                 ▼  ▼                    ▼                     │     ▼
//!           CANCELLED  EXPIRED     EXPIRED / COMPLETED          │  EXPIRED / COMPLETED
//!                                                       dispute ▼
//!                                                           DISPUTED ──admin resolve / timeout──► COMPLETED
//! ```
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{AutoVerdict, Order, OrderStatusType, UserId},
    dispute,
    events::ActorSide,
    timers::ExpiryKind,
    traits::EscrowError,
};

/// One of the two parties to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Buyer,
    Seller,
}

impl Party {
    pub fn other(&self) -> Self {
        match self {
            Party::Buyer => Party::Seller,
            Party::Seller => Party::Buyer,
        }
    }

    pub fn side(&self) -> ActorSide {
        match self {
            Party::Buyer => ActorSide::Buyer,
            Party::Seller => ActorSide::Seller,
        }
    }
}

/// What the order flow should do once a confirmation has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmPlan {
    /// The other party still has to confirm.
    AwaitOther,
    /// Both parties will have confirmed. Release the escrow and complete the order.
    Complete,
}

/// The expiry policy's verdict for an order at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryDecision {
    /// The relevant deadline has not passed yet.
    NotDue(DateTime<Utc>),
    /// The timer purpose does not apply to the order's current status (including terminal orders).
    Inapplicable,
    /// Refund the buyer and mark the order `EXPIRED`.
    RefundBuyer,
    /// Release the escrow to the seller and mark the order `COMPLETED`.
    PaySeller,
    /// Settle the lapsed dispute with the given automatic verdict.
    AutoResolve(AutoVerdict),
}

/// Identifies which party `actor` is on the order, if any.
pub fn party_of(order: &Order, actor: &UserId) -> Option<Party> {
    if order.is_buyer(actor) {
        Some(Party::Buyer)
    } else if order.is_seller(actor) {
        Some(Party::Seller)
    } else {
        None
    }
}

fn require_participant(order: &Order, actor: &UserId) -> Result<Party, EscrowError> {
    party_of(order, actor)
        .ok_or_else(|| EscrowError::Forbidden(format!("User {actor} is not a party to order {}", order.order_id)))
}

fn invalid_state(order: &Order, action: &str) -> EscrowError {
    EscrowError::InvalidState(format!("Cannot {action} order {} while it is {}", order.order_id, order.status))
}

pub fn check_seller_accept(order: &Order, actor: &UserId) -> Result<(), EscrowError> {
    if !order.is_seller(actor) {
        return Err(EscrowError::Forbidden(format!(
            "Only the seller can accept order {}. {actor} is not the seller",
            order.order_id
        )));
    }
    if order.status != OrderStatusType::EscrowHeld {
        return Err(invalid_state(order, "accept"));
    }
    Ok(())
}

/// `actor` must be the given `party`, the order must be in active trade and the party must not have confirmed yet.
pub fn check_confirm(order: &Order, actor: &UserId, party: Party) -> Result<ConfirmPlan, EscrowError> {
    if party_of(order, actor) != Some(party) {
        return Err(EscrowError::Forbidden(format!(
            "User {actor} is not the {} on order {}",
            party.side(),
            order.order_id
        )));
    }
    if !order.status.is_active_trade() {
        return Err(invalid_state(order, "confirm"));
    }
    let (mine, theirs) = match party {
        Party::Seller => (order.seller_confirmed_at, order.buyer_confirmed_at),
        Party::Buyer => (order.buyer_confirmed_at, order.seller_confirmed_at),
    };
    if mine.is_some() {
        return Err(EscrowError::InvalidState(format!(
            "The {} has already confirmed order {}",
            party.side(),
            order.order_id
        )));
    }
    match theirs {
        Some(_) => Ok(ConfirmPlan::Complete),
        None => Ok(ConfirmPlan::AwaitOther),
    }
}

pub fn check_dispute(order: &Order, actor: &UserId) -> Result<Party, EscrowError> {
    let party = require_participant(order, actor)?;
    if !order.status.is_active_trade() {
        return Err(invalid_state(order, "dispute"));
    }
    Ok(party)
}

/// Cancelling is only possible before the seller has accepted.
pub fn check_cancel(order: &Order, actor: &UserId) -> Result<Party, EscrowError> {
    let party = require_participant(order, actor)?;
    if order.status != OrderStatusType::EscrowHeld {
        return Err(invalid_state(order, "cancel"));
    }
    Ok(party)
}

pub fn check_resolvable(order: &Order) -> Result<(), EscrowError> {
    if order.status != OrderStatusType::Disputed {
        return Err(invalid_state(order, "resolve a dispute on"));
    }
    Ok(())
}

/// The new trade deadline when a dispute is raised. The extension is added to the current trade deadline, or to
/// `now` if that deadline has already passed, so a dispute always gets the full extension window.
pub fn dispute_deadline(order: &Order, now: DateTime<Utc>, extension: Duration) -> DateTime<Utc> {
    let base = order.trade_deadline_at.map_or(now, |d| d.max(now));
    base + extension
}

/// Decides what an expiry of type `kind` should do to `order` at time `now`.
///
/// The stored deadline is always re-checked, so late, early and duplicate timer deliveries are all safe.
pub fn expiry_decision(order: &Order, kind: ExpiryKind, now: DateTime<Utc>) -> ExpiryDecision {
    if order.status.is_terminal() {
        return ExpiryDecision::Inapplicable;
    }
    match (kind, order.status) {
        (ExpiryKind::Hold, OrderStatusType::EscrowHeld) => {
            if now < order.deadline_at {
                ExpiryDecision::NotDue(order.deadline_at)
            } else {
                ExpiryDecision::RefundBuyer
            }
        },
        (ExpiryKind::Trade, status @ (OrderStatusType::InTrade | OrderStatusType::AwaitConfirm | OrderStatusType::Disputed)) => {
            let Some(deadline) = order.trade_deadline_at else {
                return ExpiryDecision::Inapplicable;
            };
            if now < deadline {
                return ExpiryDecision::NotDue(deadline);
            }
            if status == OrderStatusType::Disputed {
                ExpiryDecision::AutoResolve(dispute::auto_verdict(order))
            } else if order.only_seller_confirmed() {
                ExpiryDecision::PaySeller
            } else {
                ExpiryDecision::RefundBuyer
            }
        },
        _ => ExpiryDecision::Inapplicable,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::{ItemId, Money, OrderId};

    fn order(status: OrderStatusType) -> Order {
        let now = Utc::now();
        Order {
            order_id: OrderId::from("o1"),
            item_id: ItemId::from("i1"),
            buyer_id: UserId::from("buyer"),
            seller_id: UserId::from("seller"),
            quantity: 1,
            price_at_purchase: Money::from_units(100),
            total: Money::from_units(100),
            status,
            created_at: now,
            updated_at: now,
            deadline_at: now + Duration::hours(1),
            trade_deadline_at: None,
            seller_accept_at: None,
            seller_confirmed_at: None,
            buyer_confirmed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            disputed_at: None,
        }
    }

    fn in_trade() -> Order {
        let mut o = order(OrderStatusType::InTrade);
        o.seller_accept_at = Some(o.created_at);
        o.trade_deadline_at = Some(o.created_at + Duration::days(1));
        o
    }

    fn buyer() -> UserId {
        UserId::from("buyer")
    }

    fn seller() -> UserId {
        UserId::from("seller")
    }

    #[test]
    fn only_the_seller_accepts_held_orders() {
        let o = order(OrderStatusType::EscrowHeld);
        assert!(check_seller_accept(&o, &seller()).is_ok());
        assert!(matches!(check_seller_accept(&o, &buyer()), Err(EscrowError::Forbidden(_))));
        let o = in_trade();
        assert!(matches!(check_seller_accept(&o, &seller()), Err(EscrowError::InvalidState(_))));
    }

    #[test]
    fn confirmations() {
        let mut o = in_trade();
        assert_eq!(check_confirm(&o, &seller(), Party::Seller).unwrap(), ConfirmPlan::AwaitOther);
        assert!(matches!(check_confirm(&o, &buyer(), Party::Seller), Err(EscrowError::Forbidden(_))));
        o.status = OrderStatusType::AwaitConfirm;
        o.seller_confirmed_at = Some(Utc::now());
        assert!(matches!(check_confirm(&o, &seller(), Party::Seller), Err(EscrowError::InvalidState(_))));
        assert_eq!(check_confirm(&o, &buyer(), Party::Buyer).unwrap(), ConfirmPlan::Complete);
        o.status = OrderStatusType::Completed;
        assert!(matches!(check_confirm(&o, &buyer(), Party::Buyer), Err(EscrowError::InvalidState(_))));
        let held = order(OrderStatusType::EscrowHeld);
        assert!(matches!(check_confirm(&held, &buyer(), Party::Buyer), Err(EscrowError::InvalidState(_))));
    }

    #[test]
    fn disputes_need_an_active_trade() {
        let o = in_trade();
        assert_eq!(check_dispute(&o, &buyer()).unwrap(), Party::Buyer);
        assert_eq!(check_dispute(&o, &seller()).unwrap(), Party::Seller);
        assert!(matches!(check_dispute(&o, &UserId::from("mallory")), Err(EscrowError::Forbidden(_))));
        let disputed = order(OrderStatusType::Disputed);
        assert!(matches!(check_dispute(&disputed, &buyer()), Err(EscrowError::InvalidState(_))));
        let held = order(OrderStatusType::EscrowHeld);
        assert!(matches!(check_dispute(&held, &buyer()), Err(EscrowError::InvalidState(_))));
    }

    #[test]
    fn cancel_only_before_acceptance() {
        let o = order(OrderStatusType::EscrowHeld);
        assert_eq!(check_cancel(&o, &buyer()).unwrap(), Party::Buyer);
        assert_eq!(check_cancel(&o, &seller()).unwrap(), Party::Seller);
        assert!(matches!(check_cancel(&o, &UserId::from("mallory")), Err(EscrowError::Forbidden(_))));
        assert!(matches!(check_cancel(&in_trade(), &buyer()), Err(EscrowError::InvalidState(_))));
        assert!(matches!(
            check_cancel(&order(OrderStatusType::Cancelled), &buyer()),
            Err(EscrowError::InvalidState(_))
        ));
    }

    #[test]
    fn dispute_deadline_extends_from_the_later_of_now_and_the_trade_deadline() {
        let o = in_trade();
        let now = o.created_at;
        let ext = Duration::days(3);
        assert_eq!(dispute_deadline(&o, now, ext), o.trade_deadline_at.unwrap() + ext);
        let late = o.trade_deadline_at.unwrap() + Duration::hours(2);
        assert_eq!(dispute_deadline(&o, late, ext), late + ext);
    }

    #[test]
    fn hold_expiry() {
        let o = order(OrderStatusType::EscrowHeld);
        let before = o.deadline_at - Duration::seconds(1);
        assert_eq!(expiry_decision(&o, ExpiryKind::Hold, before), ExpiryDecision::NotDue(o.deadline_at));
        assert_eq!(expiry_decision(&o, ExpiryKind::Hold, o.deadline_at), ExpiryDecision::RefundBuyer);
        assert_eq!(expiry_decision(&o, ExpiryKind::Trade, o.deadline_at), ExpiryDecision::Inapplicable);
        // A hold timer that fires after the seller accepted does nothing
        let o = in_trade();
        assert_eq!(expiry_decision(&o, ExpiryKind::Hold, o.deadline_at), ExpiryDecision::Inapplicable);
    }

    #[test]
    fn trade_expiry_policy() {
        let mut o = in_trade();
        let deadline = o.trade_deadline_at.unwrap();
        assert_eq!(expiry_decision(&o, ExpiryKind::Trade, deadline - Duration::minutes(1)), ExpiryDecision::NotDue(deadline));
        // Nobody confirmed
        assert_eq!(expiry_decision(&o, ExpiryKind::Trade, deadline), ExpiryDecision::RefundBuyer);
        // Only the buyer confirmed
        o.status = OrderStatusType::AwaitConfirm;
        o.buyer_confirmed_at = Some(o.created_at);
        assert_eq!(expiry_decision(&o, ExpiryKind::Trade, deadline), ExpiryDecision::RefundBuyer);
        // Only the seller confirmed
        o.buyer_confirmed_at = None;
        o.seller_confirmed_at = Some(o.created_at);
        assert_eq!(expiry_decision(&o, ExpiryKind::Trade, deadline), ExpiryDecision::PaySeller);
        // Disputed
        o.status = OrderStatusType::Disputed;
        assert_eq!(
            expiry_decision(&o, ExpiryKind::Trade, deadline),
            ExpiryDecision::AutoResolve(AutoVerdict::TimeoutSellerConfirmed)
        );
        o.status = OrderStatusType::Completed;
        assert_eq!(expiry_decision(&o, ExpiryKind::Trade, deadline), ExpiryDecision::Inapplicable);
    }
}
