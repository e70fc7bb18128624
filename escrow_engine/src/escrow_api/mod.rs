//! # Escrow engine public API
//!
//! The `escrow_api` module exposes the programmatic API for the escrow engine. The API is modular, so that clients can
//! pick and choose the functionality they want.
//!
//! * [`order_flow_api`] drives every order transition, executes the post-commit outbox (timers and notifications),
//!   and is the entry point for expiry jobs and the reconciliation sweep.
//! * [`accounts_api`] provides wallets, deposits, ledger histories, order queries and audit trails.
//! * [`auth_api`] manages user [`Role`]s.
//!
//! # API usage
//!
//! An API instance is created by supplying a database backend that implements the backend traits required by the API.
//!
//! ```rust,ignore
//! use escrow_engine::{AccountApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/escrow.db", 5).await?;
//! // SqliteDatabase implements AccountManagement
//! let api = AccountApi::new(db);
//! let wallet = api.wallet(&user_id).await?;
//! ```
//!
//! [`Role`]: crate::db_types::Role

pub mod accounts_api;
pub mod auth_api;
pub mod order_flow_api;
