//! # SQLite Database methods
//!
//! This module contains the "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers can obtain a connection from a pool, or open an atomic transaction and pass `&mut tx` through to
//! several of these functions, without any other changes.
//!
//! Timestamps are always bound by the caller. Deadline comparisons go through `julianday()` so that they do not
//! depend on the textual format of the stored value.
use std::{env, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use log::{info, trace};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqliteConnection,
    SqlitePool,
};

pub mod auth;
pub mod disputes;
pub mod events;
pub mod items;
pub mod ledger;
pub mod orders;

const SQLITE_DB_URL: &str = "sqlite://data/escrow.db";
/// How long a transaction waits for another connection's write lock before giving up with `database is locked`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn db_url() -> String {
    let result = env::var("ESC_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ ESC_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

/// Opens a connection pool, creating the database file if it does not exist yet.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// Takes the database write lock for the enclosing transaction. This must be the first statement of a transaction
/// that reads and then writes: SQLite waits for the lock here (up to the busy timeout), whereas upgrading a read
/// transaction to a write fails immediately with `SQLITE_BUSY` when another writer got in first.
pub async fn lock_for_write(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), SqlxError> {
    sqlx::query("UPDATE write_lock SET touched_at = $1 WHERE id = 1").bind(now).execute(conn).await?;
    trace!("🗃️ Write lock taken");
    Ok(())
}
