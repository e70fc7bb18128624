use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{Item, ItemId, ItemStatus, NewItem};

pub async fn insert_item(item: NewItem, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Item, sqlx::Error> {
    let item = sqlx::query_as(
        r#"
            INSERT INTO items (item_id, seller_id, price, status, created_at, updated_at)
            VALUES ($1, $2, $3, 'AVAILABLE', $4, $4)
            RETURNING *;
        "#,
    )
    .bind(item.item_id.as_str())
    .bind(item.seller_id.as_str())
    .bind(item.price)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_item(item_id: &ItemId, conn: &mut SqliteConnection) -> Result<Option<Item>, sqlx::Error> {
    let item =
        sqlx::query_as("SELECT * FROM items WHERE item_id = $1").bind(item_id.as_str()).fetch_optional(conn).await?;
    Ok(item)
}

/// Moves the item from `from` to `to`. Returns `false` if the item was not in the `from` state, which is how two
/// concurrent buyers are told apart: only one of them sees a row change.
async fn transition(
    item_id: &ItemId,
    from: ItemStatus,
    to: ItemStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE items SET status = $1, updated_at = $2 WHERE item_id = $3 AND status = $4")
        .bind(to)
        .bind(now)
        .bind(item_id.as_str())
        .bind(from)
        .execute(conn)
        .await?;
    let changed = result.rows_affected() == 1;
    trace!("🗃️ Item {item_id} {from} -> {to}: {}", if changed { "done" } else { "no change" });
    Ok(changed)
}

/// `AVAILABLE` → `RESERVED`.
pub async fn reserve(item_id: &ItemId, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    transition(item_id, ItemStatus::Available, ItemStatus::Reserved, now, conn).await
}

/// `RESERVED` → `AVAILABLE`.
pub async fn release(item_id: &ItemId, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    transition(item_id, ItemStatus::Reserved, ItemStatus::Available, now, conn).await
}

/// `RESERVED` → `SOLD`.
pub async fn mark_sold(item_id: &ItemId, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    transition(item_id, ItemStatus::Reserved, ItemStatus::Sold, now, conn).await
}
