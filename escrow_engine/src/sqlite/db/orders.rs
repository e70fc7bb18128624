//! Order rows.
//!
//! Every status change is a conditional `UPDATE … WHERE status = …` that returns the updated row. If the order moved
//! on in the meantime (a concurrent transition committed first), no row comes back and the caller reports
//! `InvalidState` instead of overwriting the other transition's result.
use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Item, NewOrder, Order, OrderId, OrderStatusType, UserId},
    order_machine::Party,
};

/// Inserts a new `ESCROW_HELD` order for `item`, freezing the item's current price as the order total.
pub async fn insert_order(order: NewOrder, item: &Item, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let quantity = 1i64;
    let total = item.price * quantity;
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                item_id,
                buyer_id,
                seller_id,
                quantity,
                price_at_purchase,
                total,
                status,
                created_at,
                updated_at,
                deadline_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(order.order_id.as_str())
    .bind(item.item_id.as_str())
    .bind(order.buyer_id.as_str())
    .bind(item.seller_id.as_str())
    .bind(quantity)
    .bind(item.price)
    .bind(total)
    .bind(OrderStatusType::EscrowHeld)
    .bind(order.created_at)
    .bind(order.deadline_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order [{}] inserted for item {} with total {}", order.order_id, order.item_id, order.total);
    Ok(order)
}

pub async fn fetch_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn orders_for_buyer(
    buyer_id: &UserId,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as("SELECT * FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC, rowid DESC LIMIT $2")
        .bind(buyer_id.as_str())
        .bind(limit)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

pub async fn orders_for_seller(
    seller_id: &UserId,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as("SELECT * FROM orders WHERE seller_id = $1 ORDER BY created_at DESC, rowid DESC LIMIT $2")
        .bind(seller_id.as_str())
        .bind(limit)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

/// `ESCROW_HELD` → `IN_TRADE`.
pub async fn mark_accepted(
    order_id: &OrderId,
    now: DateTime<Utc>,
    trade_deadline: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = 'IN_TRADE',
                seller_accept_at = $1,
                trade_deadline_at = $2,
                updated_at = $1
            WHERE order_id = $3 AND status = 'ESCROW_HELD'
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(trade_deadline)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Records the party's confirmation and moves the order to `AWAIT_CONFIRM`.
///
/// The update only applies while the party's confirmation timestamp is still null, so a duplicate confirmation can
/// never overwrite the first one.
pub async fn mark_confirmed(
    order_id: &OrderId,
    party: Party,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let column = match party {
        Party::Buyer => "buyer_confirmed_at",
        Party::Seller => "seller_confirmed_at",
    };
    let q = format!(
        r#"
            UPDATE orders SET
                {column} = $1,
                status = 'AWAIT_CONFIRM',
                updated_at = $1
            WHERE order_id = $2 AND {column} IS NULL AND status IN ('IN_TRADE', 'AWAIT_CONFIRM')
            RETURNING *;
        "#
    );
    let order = sqlx::query_as(&q).bind(now).bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// `IN_TRADE | AWAIT_CONFIRM` → `DISPUTED`, with the trade deadline moved to `new_deadline`.
pub async fn mark_disputed(
    order_id: &OrderId,
    now: DateTime<Utc>,
    new_deadline: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = 'DISPUTED',
                disputed_at = $1,
                trade_deadline_at = $2,
                updated_at = $1
            WHERE order_id = $3 AND status IN ('IN_TRADE', 'AWAIT_CONFIRM') AND disputed_at IS NULL
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(new_deadline)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// `ESCROW_HELD` → `CANCELLED`.
pub async fn mark_cancelled(
    order_id: &OrderId,
    cancelled_by: &UserId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = 'CANCELLED',
                cancelled_at = $1,
                cancelled_by = $2,
                updated_at = $1
            WHERE order_id = $3 AND status = 'ESCROW_HELD'
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(cancelled_by.as_str())
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Moves the order from `from` to the terminal status `to`.
pub async fn finalize(
    order_id: &OrderId,
    from: OrderStatusType,
    to: OrderStatusType,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order: Option<Order> =
        sqlx::query_as("UPDATE orders SET status = $1, updated_at = $2 WHERE order_id = $3 AND status = $4 RETURNING *")
            .bind(to)
            .bind(now)
            .bind(order_id.as_str())
            .bind(from)
            .fetch_optional(conn)
            .await?;
    if order.is_some() {
        trace!("🗃️ Order [{order_id}] {from} -> {to}");
    }
    Ok(order)
}

/// Non-terminal orders whose relevant deadline has passed, earliest deadline first.
pub async fn fetch_overdue_orders(
    now: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        r#"
            SELECT * FROM orders
            WHERE (status = 'ESCROW_HELD' AND julianday(deadline_at) <= julianday($1))
               OR (status IN ('IN_TRADE', 'AWAIT_CONFIRM', 'DISPUTED')
                   AND trade_deadline_at IS NOT NULL
                   AND julianday(trade_deadline_at) <= julianday($1))
            ORDER BY julianday(CASE WHEN status = 'ESCROW_HELD' THEN deadline_at ELSE trade_deadline_at END) ASC
            LIMIT $2;
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}
