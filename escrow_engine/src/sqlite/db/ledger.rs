//! The wallet ledger.
//!
//! Every money movement tied to an order updates the `wallets` row(s) and appends to `wallet_tx` on the same
//! connection, so when the caller runs these inside a transaction, balances and ledger entries can never disagree.
//!
//! The settlement paths ([`release`], [`refund`] and [`split_release`]) consult the [`SettlementWitness`] before
//! touching any balance. A RELEASE or REFUND row for the order means the escrow has already been settled and the call
//! is a no-op, which makes repeated timer deliveries and duplicate requests safe.
use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::{
    db_types::{Money, OrderId, UserId, Wallet, WalletTx, WalletTxAction},
    dispute::PayoutSplit,
    traits::EscrowError,
};

/// The settlement entries that already exist for an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementWitness {
    pub released: Option<Money>,
    pub refunded: Option<Money>,
}

impl SettlementWitness {
    pub fn is_settled(&self) -> bool {
        self.released.is_some() || self.refunded.is_some()
    }
}

pub async fn settlement_witness(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<SettlementWitness, sqlx::Error> {
    let rows = sqlx::query("SELECT action, amount FROM wallet_tx WHERE order_id = $1 AND action IN ($2, $3)")
        .bind(order_id.as_str())
        .bind(WalletTxAction::Release)
        .bind(WalletTxAction::Refund)
        .fetch_all(conn)
        .await?;
    let mut witness = SettlementWitness::default();
    for row in rows {
        let action: WalletTxAction = row.try_get("action")?;
        let amount: Money = row.try_get("amount")?;
        match action {
            WalletTxAction::Release => witness.released = Some(amount),
            WalletTxAction::Refund => witness.refunded = Some(amount),
            WalletTxAction::Hold | WalletTxAction::Payout => {},
        }
    }
    Ok(witness)
}

pub async fn fetch_wallet(user_id: &UserId, conn: &mut SqliteConnection) -> Result<Option<Wallet>, sqlx::Error> {
    let wallet =
        sqlx::query_as("SELECT * FROM wallets WHERE user_id = $1").bind(user_id.as_str()).fetch_optional(conn).await?;
    Ok(wallet)
}

/// Adds `amount` to the user's spendable balance, creating the wallet if it does not exist yet.
pub async fn credit_balance(
    user_id: &UserId,
    amount: Money,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Wallet, sqlx::Error> {
    let wallet = sqlx::query_as(
        r#"
            INSERT INTO wallets (user_id, balance, held, updated_at) VALUES ($1, $2, 0, $3)
            ON CONFLICT (user_id) DO UPDATE SET balance = balance + excluded.balance, updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(user_id.as_str())
    .bind(amount)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(wallet)
}

async fn insert_tx(
    user_id: &UserId,
    order_id: &OrderId,
    action: WalletTxAction,
    amount: Money,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO wallet_tx (id, user_id, order_id, action, amount, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.as_str())
    .bind(order_id.as_str())
    .bind(action)
    .bind(amount)
    .bind(now)
    .execute(conn)
    .await?;
    trace!("🗃️ Ledger: {action} {amount} for {user_id} on order {order_id}");
    Ok(())
}

/// Moves `amount` from the buyer's balance into held funds and writes a HOLD entry.
///
/// The balance check is part of the update itself, so a concurrent spend cannot slip in between check and debit.
pub async fn hold(
    buyer_id: &UserId,
    amount: Money,
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), EscrowError> {
    if !amount.is_positive() {
        return Err(EscrowError::InvalidAmount(format!("Cannot hold {amount}")));
    }
    let result = sqlx::query(
        r#"
            UPDATE wallets SET balance = balance - $1, held = held + $1, updated_at = $2
            WHERE user_id = $3 AND balance >= $1
        "#,
    )
    .bind(amount)
    .bind(now)
    .bind(buyer_id.as_str())
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(EscrowError::InsufficientFunds(format!(
            "The balance of {buyer_id} does not cover the {amount} needed for order {order_id}"
        )));
    }
    insert_tx(buyer_id, order_id, WalletTxAction::Hold, amount, now, conn).await?;
    debug!("🗃️ Ledger: {amount} held from {buyer_id} for order {order_id}");
    Ok(())
}

/// Removes `amount` from the buyer's held funds. Held funds never go negative.
async fn debit_held(
    buyer_id: &UserId,
    amount: Money,
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), EscrowError> {
    let result = sqlx::query("UPDATE wallets SET held = held - $1, updated_at = $2 WHERE user_id = $3 AND held >= $1")
        .bind(amount)
        .bind(now)
        .bind(buyer_id.as_str())
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(EscrowError::InsufficientFunds(format!(
            "The held funds of {buyer_id} do not cover the {amount} escrowed for order {order_id}"
        )));
    }
    Ok(())
}

/// Releases the escrow to the seller: RELEASE against the buyer, PAYOUT against the seller.
///
/// Returns `false` without touching any balance if the order has already been settled.
pub async fn release(
    order_id: &OrderId,
    buyer_id: &UserId,
    seller_id: &UserId,
    amount: Money,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, EscrowError> {
    if settlement_witness(order_id, conn).await?.is_settled() {
        debug!("🗃️ Ledger: order {order_id} is already settled. Release skipped");
        return Ok(false);
    }
    debit_held(buyer_id, amount, order_id, now, conn).await?;
    credit_balance(seller_id, amount, now, conn).await?;
    insert_tx(buyer_id, order_id, WalletTxAction::Release, amount, now, conn).await?;
    insert_tx(seller_id, order_id, WalletTxAction::Payout, amount, now, conn).await?;
    debug!("🗃️ Ledger: {amount} released from {buyer_id} to {seller_id} for order {order_id}");
    Ok(true)
}

/// Returns the escrow to the buyer's balance and writes a REFUND entry.
///
/// Returns `false` without touching any balance if the order has already been settled.
pub async fn refund(
    order_id: &OrderId,
    buyer_id: &UserId,
    amount: Money,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, EscrowError> {
    if settlement_witness(order_id, conn).await?.is_settled() {
        debug!("🗃️ Ledger: order {order_id} is already settled. Refund skipped");
        return Ok(false);
    }
    debit_held(buyer_id, amount, order_id, now, conn).await?;
    credit_balance(buyer_id, amount, now, conn).await?;
    insert_tx(buyer_id, order_id, WalletTxAction::Refund, amount, now, conn).await?;
    debug!("🗃️ Ledger: {amount} refunded to {buyer_id} for order {order_id}");
    Ok(true)
}

/// Settles a dispute: the full held total leaves the buyer's held funds once, the seller's share is paid out
/// (RELEASE + PAYOUT) and the remainder is refunded (REFUND). Zero-value sides write no entries.
///
/// Returns `false` without touching any balance if the order has already been settled.
pub async fn split_release(
    order_id: &OrderId,
    buyer_id: &UserId,
    seller_id: &UserId,
    split: &PayoutSplit,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, EscrowError> {
    if split.seller_amount + split.buyer_amount != split.total ||
        split.seller_amount.is_negative() ||
        split.buyer_amount.is_negative()
    {
        return Err(EscrowError::InvalidAmount(format!(
            "Split of {} + {} does not match the held total of {}",
            split.seller_amount, split.buyer_amount, split.total
        )));
    }
    if settlement_witness(order_id, conn).await?.is_settled() {
        debug!("🗃️ Ledger: order {order_id} is already settled. Split release skipped");
        return Ok(false);
    }
    debit_held(buyer_id, split.total, order_id, now, conn).await?;
    if split.seller_amount.is_positive() {
        credit_balance(seller_id, split.seller_amount, now, conn).await?;
        insert_tx(buyer_id, order_id, WalletTxAction::Release, split.seller_amount, now, conn).await?;
        insert_tx(seller_id, order_id, WalletTxAction::Payout, split.seller_amount, now, conn).await?;
    }
    if split.buyer_amount.is_positive() {
        credit_balance(buyer_id, split.buyer_amount, now, conn).await?;
        insert_tx(buyer_id, order_id, WalletTxAction::Refund, split.buyer_amount, now, conn).await?;
    }
    debug!(
        "🗃️ Ledger: order {order_id} split. {} to seller {seller_id}, {} to buyer {buyer_id}",
        split.seller_amount, split.buyer_amount
    );
    Ok(true)
}

pub async fn transactions_for_user(
    user_id: &UserId,
    conn: &mut SqliteConnection,
) -> Result<Vec<WalletTx>, sqlx::Error> {
    let txs = sqlx::query_as("SELECT * FROM wallet_tx WHERE user_id = $1 ORDER BY created_at ASC, rowid ASC")
        .bind(user_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(txs)
}

pub async fn transactions_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<WalletTx>, sqlx::Error> {
    let txs = sqlx::query_as("SELECT * FROM wallet_tx WHERE order_id = $1 ORDER BY created_at ASC, rowid ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(txs)
}
