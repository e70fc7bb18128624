use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{AutoVerdict, Dispute, DisputeId, DisputeSettlement, OrderId, UserId},
    dispute::PayoutSplit,
};

pub async fn open_dispute(
    order_id: &OrderId,
    opened_by: &UserId,
    reason_code: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Dispute, sqlx::Error> {
    let dispute: Dispute = sqlx::query_as(
        r#"
            INSERT INTO disputes (dispute_id, order_id, opened_by, reason_code, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'OPEN', $5, $5)
            RETURNING *;
        "#,
    )
    .bind(DisputeId::random().as_str())
    .bind(order_id.as_str())
    .bind(opened_by.as_str())
    .bind(reason_code)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Dispute {} opened on order {order_id} by {opened_by}", dispute.dispute_id);
    Ok(dispute)
}

pub async fn fetch_dispute_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, sqlx::Error> {
    let dispute = sqlx::query_as("SELECT * FROM disputes WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(dispute)
}

/// `OPEN` → `RESOLVED`. `resolved_by` is `None` for automatic resolutions, which record their verdict instead.
///
/// Returns `None` if the dispute was not open.
pub async fn mark_resolved(
    dispute_id: &DisputeId,
    resolved_by: Option<&UserId>,
    verdict: Option<AutoVerdict>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, sqlx::Error> {
    let dispute = sqlx::query_as(
        r#"
            UPDATE disputes SET
                status = 'RESOLVED',
                resolved_by = $1,
                auto_verdict = $2,
                resolved_at = $3,
                updated_at = $3
            WHERE dispute_id = $4 AND status = 'OPEN'
            RETURNING *;
        "#,
    )
    .bind(resolved_by.map(|u| u.as_str()))
    .bind(verdict)
    .bind(now)
    .bind(dispute_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(dispute)
}

pub async fn fetch_settlement(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<DisputeSettlement>, sqlx::Error> {
    let settlement = sqlx::query_as("SELECT * FROM dispute_settlements WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(settlement)
}

/// Writes the settlement record. The primary key on `order_id` rejects a second settlement for the same order.
pub async fn insert_settlement(
    order_id: &OrderId,
    dispute_id: &DisputeId,
    split: &PayoutSplit,
    note: Option<&str>,
    created_by: Option<&UserId>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<DisputeSettlement, sqlx::Error> {
    let settlement = sqlx::query_as(
        r#"
            INSERT INTO dispute_settlements (
                order_id,
                dispute_id,
                seller_pct,
                seller_amount,
                buyer_amount,
                fee_amount,
                note,
                created_by,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(dispute_id.as_str())
    .bind(split.seller_pct)
    .bind(split.seller_amount)
    .bind(split.buyer_amount)
    .bind(note)
    .bind(created_by.map(|u| u.as_str()))
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(settlement)
}
