use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use escrow_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

/// Declares a string-backed identifier newtype that is stored transparently in the database.
macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
        #[sqlx(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generates a new random (UUID v4) identifier.
            pub fn random() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.trim().is_empty() {
                    return Err(ConversionError(format!("{} cannot be empty", stringify!($name))));
                }
                Ok(Self(s.trim().to_string()))
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// The identifier of an order. Immutable once assigned.
    OrderId
);
id_type!(
    /// The identifier of a marketplace user (buyer, seller or admin).
    UserId
);
id_type!(ItemId);
id_type!(DisputeId);

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// The buyer's funds are held in escrow and the seller has not accepted the order yet.
    EscrowHeld,
    /// The seller has accepted and the trade is under way.
    InTrade,
    /// One of the parties has confirmed the trade. Waiting on the other.
    AwaitConfirm,
    /// A party raised a dispute. Waiting on an admin, or the dispute window to lapse.
    Disputed,
    /// Escrow has been settled in favour of the seller (fully or partially).
    Completed,
    /// The order was cancelled before the seller accepted and the buyer was refunded.
    Cancelled,
    /// The order timed out and the buyer was refunded.
    Expired,
}

impl OrderStatusType {
    pub const ACTIVE_TRADE: [OrderStatusType; 2] = [OrderStatusType::InTrade, OrderStatusType::AwaitConfirm];

    /// No further transitions are permitted out of a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }

    pub fn is_active_trade(&self) -> bool {
        Self::ACTIVE_TRADE.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EscrowHeld => "ESCROW_HELD",
            Self::InTrade => "IN_TRADE",
            Self::AwaitConfirm => "AWAIT_CONFIRM",
            Self::Disputed => "DISPUTED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ESCROW_HELD" => Ok(Self::EscrowHeld),
            "IN_TRADE" => Ok(Self::InTrade),
            "AWAIT_CONFIRM" => Ok(Self::AwaitConfirm),
            "DISPUTED" => Ok(Self::Disputed),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            "EXPIRED" => Ok(Self::Expired),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub quantity: i64,
    pub price_at_purchase: Money,
    /// `price_at_purchase × quantity`, frozen when the order is created.
    pub total: Money,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The deadline for the seller to accept the order.
    pub deadline_at: DateTime<Utc>,
    /// The trade (or, once disputed, dispute) deadline. Set when the seller accepts.
    pub trade_deadline_at: Option<DateTime<Utc>>,
    pub seller_accept_at: Option<DateTime<Utc>>,
    pub seller_confirmed_at: Option<DateTime<Utc>>,
    pub buyer_confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<UserId>,
    pub disputed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_buyer(&self, user: &UserId) -> bool {
        &self.buyer_id == user
    }

    pub fn is_seller(&self, user: &UserId) -> bool {
        &self.seller_id == user
    }

    pub fn is_participant(&self, user: &UserId) -> bool {
        self.is_buyer(user) || self.is_seller(user)
    }

    /// True when the seller has confirmed completion but the buyer has not.
    pub fn only_seller_confirmed(&self) -> bool {
        self.seller_confirmed_at.is_some() && self.buyer_confirmed_at.is_none()
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
/// The data needed to open a new order against an item. Price, seller and total are taken from the item at the
/// moment of purchase.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub item_id: ItemId,
    pub created_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(buyer_id: UserId, item_id: ItemId, created_at: DateTime<Utc>, deadline_at: DateTime<Utc>) -> Self {
        Self { order_id: OrderId::random(), buyer_id, item_id, created_at, deadline_at }
    }
}

//--------------------------------------      ItemStatus       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Available,
    Reserved,
    Sold,
}

impl Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Available => write!(f, "AVAILABLE"),
            ItemStatus::Reserved => write!(f, "RESERVED"),
            ItemStatus::Sold => write!(f, "SOLD"),
        }
    }
}

//--------------------------------------         Item          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Item {
    pub item_id: ItemId,
    pub seller_id: UserId,
    pub price: Money,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub item_id: ItemId,
    pub seller_id: UserId,
    pub price: Money,
}

impl NewItem {
    pub fn new(seller_id: UserId, price: Money) -> Self {
        Self { item_id: ItemId::random(), seller_id, price }
    }
}

//--------------------------------------        Wallet         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    /// Funds that are immediately spendable.
    pub balance: Money,
    /// Funds earmarked against in-flight orders.
    pub held: Money,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// The wallet of a user that has never been credited.
    pub fn empty(user_id: UserId) -> Self {
        Self { user_id, balance: Money::zero(), held: Money::zero(), updated_at: Utc::now() }
    }
}

//--------------------------------------    WalletTxAction     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[repr(i32)]
pub enum WalletTxAction {
    /// Buyer balance moved into held.
    Hold = 1,
    /// Buyer held funds released towards the seller.
    Release = 2,
    /// Buyer held funds returned to the buyer's balance.
    Refund = 3,
    /// Seller balance credited with released funds.
    Payout = 4,
}

impl WalletTxAction {
    pub fn code(&self) -> i32 {
        *self as i32
    }
}

impl Display for WalletTxAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletTxAction::Hold => write!(f, "HOLD"),
            WalletTxAction::Release => write!(f, "RELEASE"),
            WalletTxAction::Refund => write!(f, "REFUND"),
            WalletTxAction::Payout => write!(f, "PAYOUT"),
        }
    }
}

//--------------------------------------       WalletTx        ---------------------------------------------------------
/// An append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct WalletTx {
    pub id: String,
    pub user_id: UserId,
    pub order_id: Option<OrderId>,
    pub action: WalletTxAction,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------    OrderEventType     ---------------------------------------------------------
/// The tags written to the order audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEventType {
    OrderCreated,
    EscrowHeld,
    SellerAccepted,
    TradeStarted,
    SellerConfirmed,
    BuyerConfirmed,
    EscrowReleased,
    OrderCompleted,
    OrderCancelled,
    OrderExpired,
    EscrowRefunded,
    DisputeOpened,
    DisputeResolved,
    DisputeAutoResolved,
}

impl OrderEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "ORDER_CREATED",
            Self::EscrowHeld => "ESCROW_HELD",
            Self::SellerAccepted => "SELLER_ACCEPTED",
            Self::TradeStarted => "TRADE_STARTED",
            Self::SellerConfirmed => "SELLER_CONFIRMED",
            Self::BuyerConfirmed => "BUYER_CONFIRMED",
            Self::EscrowReleased => "ESCROW_RELEASED",
            Self::OrderCompleted => "ORDER_COMPLETED",
            Self::OrderCancelled => "ORDER_CANCELLED",
            Self::OrderExpired => "ORDER_EXPIRED",
            Self::EscrowRefunded => "ESCROW_REFUNDED",
            Self::DisputeOpened => "DISPUTE_OPENED",
            Self::DisputeResolved => "DISPUTE_RESOLVED",
            Self::DisputeAutoResolved => "DISPUTE_AUTO_RESOLVED",
        }
    }
}

impl Display for OrderEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//--------------------------------------      OrderEvent       ---------------------------------------------------------
/// An audit trail record. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: String,
    pub order_id: OrderId,
    /// `None` when the system (a timer or the sweep) performed the action.
    pub actor_id: Option<UserId>,
    pub event_type: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrderEvent {
    pub order_id: OrderId,
    pub actor_id: Option<UserId>,
    pub event_type: OrderEventType,
    pub message: String,
}

impl NewOrderEvent {
    pub fn new<S: Into<String>>(
        order_id: &OrderId,
        actor_id: Option<&UserId>,
        event_type: OrderEventType,
        message: S,
    ) -> Self {
        Self { order_id: order_id.clone(), actor_id: actor_id.cloned(), event_type, message: message.into() }
    }
}

//--------------------------------------     DisputeStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

impl Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisputeStatus::Open => write!(f, "OPEN"),
            DisputeStatus::Resolved => write!(f, "RESOLVED"),
        }
    }
}

//--------------------------------------      AutoVerdict      ---------------------------------------------------------
/// The outcome chosen by the timeout policy when nobody adjudicated a dispute in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutoVerdict {
    /// The seller confirmed and the buyer did not: the seller is paid in full.
    TimeoutSellerConfirmed,
    /// Anything else: the buyer is refunded in full.
    TimeoutBuyerRefund,
}

impl Display for AutoVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AutoVerdict::TimeoutSellerConfirmed => write!(f, "TIMEOUT_SELLER_CONFIRMED"),
            AutoVerdict::TimeoutBuyerRefund => write!(f, "TIMEOUT_BUYER_REFUND"),
        }
    }
}

//--------------------------------------        Dispute        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Dispute {
    pub dispute_id: DisputeId,
    pub order_id: OrderId,
    pub opened_by: UserId,
    pub reason_code: String,
    pub status: DisputeStatus,
    pub auto_verdict: Option<AutoVerdict>,
    /// `None` once resolved means the dispute was resolved automatically.
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   DisputeSettlement   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DisputeSettlement {
    pub order_id: OrderId,
    pub dispute_id: DisputeId,
    pub seller_pct: i64,
    pub seller_amount: Money,
    pub buyer_amount: Money,
    pub fee_amount: Money,
    pub note: Option<String>,
    /// The admin that decided the split, or `None` for an automatic verdict.
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl DisputeSettlement {
    pub fn total(&self) -> Money {
        self.seller_amount + self.buyer_amount + self.fee_amount
    }
}

//--------------------------------------         Role          ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_status_round_trips_through_strings() {
        use OrderStatusType::*;
        for s in [EscrowHeld, InTrade, AwaitConfirm, Disputed, Completed, Cancelled, Expired] {
            assert_eq!(s.to_string().parse::<OrderStatusType>().unwrap(), s);
        }
        assert!("PAID".parse::<OrderStatusType>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        use OrderStatusType::*;
        assert!(Completed.is_terminal() && Cancelled.is_terminal() && Expired.is_terminal());
        assert!(!EscrowHeld.is_terminal() && !InTrade.is_terminal() && !AwaitConfirm.is_terminal());
        assert!(!Disputed.is_terminal());
        assert!(InTrade.is_active_trade() && AwaitConfirm.is_active_trade() && !Disputed.is_active_trade());
    }

    #[test]
    fn wallet_tx_action_codes() {
        assert_eq!(WalletTxAction::Hold.code(), 1);
        assert_eq!(WalletTxAction::Release.code(), 2);
        assert_eq!(WalletTxAction::Refund.code(), 3);
        assert_eq!(WalletTxAction::Payout.code(), 4);
    }

    #[test]
    fn ids() {
        assert!("  ".parse::<OrderId>().is_err());
        assert_eq!(" abc ".parse::<UserId>().unwrap(), UserId::from("abc"));
        assert_ne!(OrderId::random(), OrderId::random());
    }
}
