use std::{env, str::FromStr};

use chrono::Duration;
use log::*;

pub const DEFAULT_HOLD_WINDOW_MINS: i64 = 60;
pub const DEFAULT_TRADE_WINDOW_MINS: i64 = 24 * 60;
pub const DEFAULT_DISPUTE_EXTENSION_MINS: i64 = 3 * 24 * 60;
pub const DEFAULT_SWEEP_BATCH_SIZE: i64 = 100;
pub const DEFAULT_EXPIRY_RETRY_SECS: i64 = 30;

/// Time windows and limits for the order flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long the seller has to accept a new order.
    pub hold_window: Duration,
    /// How long the parties have to complete the trade once the seller accepts.
    pub trade_window: Duration,
    /// How far a dispute pushes out the trade deadline.
    pub dispute_extension: Duration,
    /// The maximum number of overdue orders handled in one reconciliation sweep.
    pub sweep_batch_size: i64,
    /// How long an expiry job waits before trying again after a database error.
    pub expiry_retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hold_window: Duration::minutes(DEFAULT_HOLD_WINDOW_MINS),
            trade_window: Duration::minutes(DEFAULT_TRADE_WINDOW_MINS),
            dispute_extension: Duration::minutes(DEFAULT_DISPUTE_EXTENSION_MINS),
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            expiry_retry_delay: Duration::seconds(DEFAULT_EXPIRY_RETRY_SECS),
        }
    }
}

impl EngineConfig {
    pub fn from_env_or_defaults() -> Self {
        let hold_window = Duration::minutes(positive_env("ESC_HOLD_WINDOW_MINS", DEFAULT_HOLD_WINDOW_MINS));
        let trade_window = Duration::minutes(positive_env("ESC_TRADE_WINDOW_MINS", DEFAULT_TRADE_WINDOW_MINS));
        let dispute_extension =
            Duration::minutes(positive_env("ESC_DISPUTE_EXTENSION_MINS", DEFAULT_DISPUTE_EXTENSION_MINS));
        let sweep_batch_size = positive_env("ESC_SWEEP_BATCH_SIZE", DEFAULT_SWEEP_BATCH_SIZE);
        let expiry_retry_delay = Duration::seconds(positive_env("ESC_EXPIRY_RETRY_SECS", DEFAULT_EXPIRY_RETRY_SECS));
        Self { hold_window, trade_window, dispute_extension, sweep_batch_size, expiry_retry_delay }
    }

    pub fn with_hold_window(mut self, window: Duration) -> Self {
        self.hold_window = window;
        self
    }

    pub fn with_trade_window(mut self, window: Duration) -> Self {
        self.trade_window = window;
        self
    }

    pub fn with_dispute_extension(mut self, extension: Duration) -> Self {
        self.dispute_extension = extension;
        self
    }

    pub fn with_expiry_retry_delay(mut self, delay: Duration) -> Self {
        self.expiry_retry_delay = delay;
        self
    }
}

/// Reads a strictly positive number from the environment, falling back to `default` (with a warning) when the
/// variable is malformed or not positive.
pub fn positive_env<T>(var: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + std::fmt::Display + Copy,
{
    match env::var(var) {
        Ok(s) => match s.trim().parse::<T>() {
            Ok(v) if v > T::default() => v,
            Ok(v) => {
                warn!("🪛️ {var} must be positive, but was {v}. Using the default, {default}, instead.");
                default
            },
            Err(_) => {
                warn!("🪛️ {s} is not a valid value for {var}. Using the default, {default}, instead.");
                default
            },
        },
        Err(_) => {
            debug!("🪛️ {var} is not set. Using the default, {default}.");
            default
        },
    }
}
