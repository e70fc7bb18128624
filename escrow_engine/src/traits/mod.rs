//! # Database backend contracts
//!
//! This module defines the interfaces that escrow engine database *backends* must implement.
//!
//! * [`EscrowDatabase`] defines every order transition. Each method is one atomic unit of work that validates the
//!   order's current state, mutates it, moves money through the ledger and appends to the audit trail.
//! * [`AccountManagement`] provides read access to wallets, ledger entries, orders, audit trails and disputes, plus
//!   the deposit flow.
//! * [`AuthManagement`] manages user roles.
//! * [`CatalogManagement`] owns the item reservation flag.
mod account_management;
mod auth_management;
mod catalog_management;
mod escrow_database;

pub mod data_objects;

pub use account_management::AccountManagement;
pub use auth_management::{AuthApiError, AuthManagement};
pub use catalog_management::CatalogManagement;
pub use data_objects::{ExpiryOutcome, OutboxAction, SweepResult, TransitionOutcome};
pub use escrow_database::{EscrowDatabase, EscrowError};
