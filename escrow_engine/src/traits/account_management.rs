use chrono::{DateTime, Utc};

use crate::{
    db_types::{Dispute, DisputeSettlement, Money, Order, OrderEvent, OrderId, UserId, Wallet, WalletTx},
    traits::EscrowError,
};

/// The `AccountManagement` trait defines the read side of the engine, plus the deposit flow that credits a wallet
/// outside any order.
///
/// Queries never mutate order state, so they run against a plain pooled connection rather than a transaction.
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    /// Fetches the wallet for the given user. Users that have never been credited get an empty wallet rather than
    /// `None`.
    async fn wallet_for_user(&self, user_id: &UserId) -> Result<Wallet, EscrowError>;

    /// Credits `amount` to the user's spendable balance, creating the wallet if necessary.
    ///
    /// Deposits are not tied to an order and do not write a ledger entry.
    async fn deposit(&self, user_id: &UserId, amount: Money, now: DateTime<Utc>) -> Result<Wallet, EscrowError>;

    async fn transactions_for_user(&self, user_id: &UserId) -> Result<Vec<WalletTx>, EscrowError>;

    async fn transactions_for_order(&self, order_id: &OrderId) -> Result<Vec<WalletTx>, EscrowError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, EscrowError>;

    /// The most recent orders placed by `buyer_id`, newest first.
    async fn orders_for_buyer(&self, buyer_id: &UserId, limit: i64) -> Result<Vec<Order>, EscrowError>;

    /// The most recent orders received by `seller_id`, newest first.
    async fn orders_for_seller(&self, seller_id: &UserId, limit: i64) -> Result<Vec<Order>, EscrowError>;

    /// The audit trail for the order, oldest entry first.
    async fn events_for_order(&self, order_id: &OrderId) -> Result<Vec<OrderEvent>, EscrowError>;

    async fn dispute_for_order(&self, order_id: &OrderId) -> Result<Option<Dispute>, EscrowError>;

    async fn settlement_for_order(&self, order_id: &OrderId) -> Result<Option<DisputeSettlement>, EscrowError>;
}
