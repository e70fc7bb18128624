//! Escrow Engine
//!
//! The escrow engine drives peer-to-peer marketplace orders from purchase to settlement. A buyer's funds are held in
//! escrow while the trade takes place, and are released to the seller, refunded to the buyer, or split between them by
//! a dispute resolution.
//!
//! The library is divided into these main sections:
//! 1. Database backends ([`traits`] and the SQLite implementation, [`SqliteDatabase`]). Every order transition is one
//!    atomic database transaction covering the order status, the wallet ledger and the audit trail. You should rarely
//!    need to access the backend directly. The data types used in the database are defined in [`db_types`].
//! 2. The order policy: [`order_machine`] holds the transition guards and the expiry policy, and [`dispute`] holds
//!    payout split arithmetic and the automatic dispute verdict. Both are pure functions over an [`Order`].
//! 3. The [`timers`] service, which fires deadline jobs at or after their due time.
//! 4. The public API ([`OrderFlowApi`], [`AccountApi`], [`AuthApi`]). Transitions return the side effects they imply
//!    (timers and notifications) and the API executes them once the transaction has committed.
//!
//! The engine also emits an [`OrderNotification`] for every status change through the [`events`] hooks.
//!
//! [`Order`]: db_types::Order
//! [`OrderNotification`]: events::OrderNotification
mod escrow_api;

pub mod config;
pub mod db_types;
pub mod dispute;
pub mod events;
pub mod order_machine;
pub mod timers;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::EngineConfig;
pub use escrow_api::{
    accounts_api::AccountApi,
    auth_api::AuthApi,
    order_flow_api::{OrderFlowApi, UNSPECIFIED_REASON},
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    AccountManagement,
    AuthApiError,
    AuthManagement,
    CatalogManagement,
    EscrowDatabase,
    EscrowError,
    ExpiryOutcome,
    SweepResult,
    TransitionOutcome,
};
