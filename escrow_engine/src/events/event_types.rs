use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, OrderStatusType, UserId};

/// Who triggered a transition, from the point of view of the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorSide {
    Buyer,
    Seller,
    Admin,
    System,
}

impl Display for ActorSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorSide::Buyer => write!(f, "buyer"),
            ActorSide::Seller => write!(f, "seller"),
            ActorSide::Admin => write!(f, "admin"),
            ActorSide::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    Created,
    Accepted,
    SellerConfirmed,
    BuyerConfirmed,
    Completed,
    Cancelled,
    Expired,
    Disputed,
    Resolved,
}

impl NotificationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Accepted => "accepted",
            Self::SellerConfirmed => "seller_confirmed",
            Self::BuyerConfirmed => "buyer_confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Disputed => "disputed",
            Self::Resolved => "resolved",
        }
    }
}

impl Display for NotificationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a notification should be delivered: a user's personal stream, or the shared room for an order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum NotificationChannel {
    User(UserId),
    Order(OrderId),
}

impl Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationChannel::User(id) => write!(f, "user:{id}"),
            NotificationChannel::Order(id) => write!(f, "order:{id}"),
        }
    }
}

/// The structured event emitted to the notification layer on every order status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNotification {
    pub channel: NotificationChannel,
    pub order_id: OrderId,
    pub action: NotificationAction,
    pub actor_side: ActorSide,
    pub status: OrderStatusType,
}

impl OrderNotification {
    pub fn new(channel: NotificationChannel, order: &Order, action: NotificationAction, actor_side: ActorSide) -> Self {
        Self { channel, order_id: order.order_id.clone(), action, actor_side, status: order.status }
    }
}

impl Display for OrderNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] order {} {} by {} ({})", self.channel, self.order_id, self.action, self.actor_side, self.status)
    }
}
