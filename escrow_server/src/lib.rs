//! # Escrow daemon
//!
//! This crate hosts the long-running process that keeps the escrow engine's clocks ticking. It is responsible for:
//! * Opening (and migrating) the escrow database.
//! * Running the in-process timer service, and applying every expiry job it fires.
//! * Periodically sweeping the database for overdue orders whose timers were lost, e.g. across a restart.
//! * Wiring the order notification hook, which currently writes each notification to the log as JSON.
//!
//! ## Configuration
//! The daemon is configured via environment variables. See [config](config/index.html) for more information.
//! Running the binary with any argument prints the help text and the current configuration.
pub mod cli;
pub mod config;
pub mod errors;
pub mod expiry_worker;
pub mod notifications;
pub mod server;
