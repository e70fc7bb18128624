//! Unifies API for accessing wallets, orders and their histories.

use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{Dispute, DisputeSettlement, Money, Order, OrderEvent, OrderId, UserId, Wallet, WalletTx},
    traits::{AccountManagement, EscrowError},
};

pub const DEFAULT_ORDER_LIMIT: i64 = 50;

/// The `AccountApi` provides a unified API for accessing wallets and order histories.
pub struct AccountApi<B> {
    db: B,
}

impl<B: Debug> Debug for AccountApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountApi ({:?})", self.db)
    }
}

impl<B> AccountApi<B>
where B: AccountManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Fetches the user's wallet. A user that has never been credited has an empty wallet.
    pub async fn wallet(&self, user_id: &UserId) -> Result<Wallet, EscrowError> {
        self.db.wallet_for_user(user_id).await
    }

    /// Credits the user's spendable balance. Deposits are not tied to an order and write no ledger entry.
    pub async fn deposit(&self, user_id: &UserId, amount: Money) -> Result<Wallet, EscrowError> {
        self.db.deposit(user_id, amount, Utc::now()).await
    }

    pub async fn transactions_for_user(&self, user_id: &UserId) -> Result<Vec<WalletTx>, EscrowError> {
        self.db.transactions_for_user(user_id).await
    }

    pub async fn transactions_for_order(&self, order_id: &OrderId) -> Result<Vec<WalletTx>, EscrowError> {
        self.db.transactions_for_order(order_id).await
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, EscrowError> {
        self.db.fetch_order(order_id).await
    }

    /// Fetches an order on behalf of one of its participants.
    ///
    /// Returns `NotFound` both when the order does not exist and when `user_id` is neither its buyer nor its seller, so
    /// that outsiders cannot probe for order ids.
    pub async fn order_detail_for_participant(&self, order_id: &OrderId, user_id: &UserId) -> Result<Order, EscrowError> {
        match self.db.fetch_order(order_id).await? {
            Some(order) if order.is_participant(user_id) => Ok(order),
            Some(_) => {
                debug!("🔄️ {user_id} asked for order {order_id}, but is not a party to it");
                Err(EscrowError::order_not_found(order_id))
            },
            None => Err(EscrowError::order_not_found(order_id)),
        }
    }

    /// The user's most recent purchases, newest first.
    pub async fn orders_for_buyer(&self, buyer_id: &UserId, limit: Option<i64>) -> Result<Vec<Order>, EscrowError> {
        self.db.orders_for_buyer(buyer_id, clamp_limit(limit)).await
    }

    /// The user's most recent sales, newest first.
    pub async fn orders_for_seller(&self, seller_id: &UserId, limit: Option<i64>) -> Result<Vec<Order>, EscrowError> {
        self.db.orders_for_seller(seller_id, clamp_limit(limit)).await
    }

    /// The order's audit trail, oldest entry first.
    pub async fn events_for_order(&self, order_id: &OrderId) -> Result<Vec<OrderEvent>, EscrowError> {
        self.db.events_for_order(order_id).await
    }

    pub async fn dispute_for_order(&self, order_id: &OrderId) -> Result<Option<Dispute>, EscrowError> {
        self.db.dispute_for_order(order_id).await
    }

    pub async fn settlement_for_order(&self, order_id: &OrderId) -> Result<Option<DisputeSettlement>, EscrowError> {
        self.db.settlement_for_order(order_id).await
    }
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_ORDER_LIMIT).clamp(1, 500)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_limits() {
        assert_eq!(clamp_limit(None), DEFAULT_ORDER_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-5)), 1);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(10_000)), 500);
    }
}
