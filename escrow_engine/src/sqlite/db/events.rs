use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db_types::{NewOrderEvent, OrderEvent, OrderId};

/// Appends an entry to the order's audit trail. Entries are never updated or deleted.
pub async fn insert_event(
    event: NewOrderEvent,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO order_events (id, order_id, actor_id, event_type, message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(event.order_id.as_str())
    .bind(event.actor_id.as_ref().map(|a| a.as_str()))
    .bind(event.event_type.as_str())
    .bind(event.message.as_str())
    .bind(now)
    .execute(conn)
    .await?;
    trace!("🗃️ Audit: [{}] {} {}", event.order_id, event.event_type, event.message);
    Ok(())
}

pub async fn insert_events<I>(events: I, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), sqlx::Error>
where I: IntoIterator<Item = NewOrderEvent> {
    for event in events {
        insert_event(event, now, conn).await?;
    }
    Ok(())
}

pub async fn events_for_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderEvent>, sqlx::Error> {
    let events = sqlx::query_as("SELECT * FROM order_events WHERE order_id = $1 ORDER BY created_at ASC, rowid ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(events)
}
