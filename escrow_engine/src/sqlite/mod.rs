//! SQLite backend for the escrow engine.
//!
//! [`SqliteDatabase`] implements every backend trait. The low-level, connection-scoped functions it composes live in
//! [`db`].
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
