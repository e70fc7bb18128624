//! Daemon configuration.
//!
//! Everything is read from `ESC_*` environment variables (see `cli-help.txt`). Invalid values never stop the
//! daemon; they are logged and replaced with the defaults.
use std::{env, time::Duration};

use escrow_engine::{config::positive_env, EngineConfig};
use log::*;

const DEFAULT_ESC_DATABASE_URL: &str = "sqlite://data/escrow.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// How often the reconciliation sweep looks for overdue orders.
    pub sweep_interval: Duration,
    /// The capacity of the timer job channel and the notification channel.
    pub event_buffer_size: usize,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_ESC_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("ESC_DATABASE_URL").ok().filter(|s| !s.trim().is_empty()).unwrap_or_else(|| {
            warn!("🪛️ ESC_DATABASE_URL is not set. Using the default, {DEFAULT_ESC_DATABASE_URL}.");
            DEFAULT_ESC_DATABASE_URL.to_string()
        });
        let max_connections = positive_env("ESC_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let sweep_interval = Duration::from_secs(positive_env("ESC_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS));
        let event_buffer_size = positive_env("ESC_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE);
        let engine = EngineConfig::from_env_or_defaults();
        Self { database_url, max_connections, sweep_interval, event_buffer_size, engine }
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration as ChronoDuration;

    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.database_url, "sqlite://data/escrow.db");
        assert_eq!(config.max_connections, 25);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.event_buffer_size, 100);
        assert_eq!(config.engine, EngineConfig::default());
    }

    // All env manipulation lives in one test, since tests run in parallel and share the process environment.
    #[test]
    fn from_env() {
        env::set_var("ESC_DATABASE_URL", "sqlite://escrow_test.db");
        env::set_var("ESC_MAX_CONNECTIONS", "4");
        env::set_var("ESC_SWEEP_INTERVAL_SECS", "-5");
        env::set_var("ESC_EVENT_BUFFER_SIZE", "lots");
        env::set_var("ESC_HOLD_WINDOW_MINS", "15");
        let config = ServerConfig::from_env_or_default();
        assert_eq!(config.database_url, "sqlite://escrow_test.db");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.event_buffer_size, 100);
        assert_eq!(config.engine.hold_window, ChronoDuration::minutes(15));
        assert_eq!(config.engine.trade_window, ChronoDuration::days(1));

        env::set_var("ESC_DATABASE_URL", "  ");
        let config = ServerConfig::from_env_or_default();
        assert_eq!(config.database_url, "sqlite://data/escrow.db");
    }
}
