use escrow_engine::{
    events::EventHandlers,
    timers::TokioScheduler,
    EscrowDatabase,
    OrderFlowApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::{start_expiry_worker, start_sweep_worker},
    notifications::logging_hooks,
};

/// The order flow as the daemon runs it: SQLite storage with the in-process timer service.
pub type EscrowFlowApi = OrderFlowApi<SqliteDatabase, TokioScheduler>;

/// Runs the daemon until Ctrl-C is received.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    if !config.database_url.starts_with("sqlite:") {
        return Err(ServerError::ConfigurationError(format!(
            "{} is not a SQLite database URL",
            config.database_url
        )));
    }
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let handlers = EventHandlers::new(config.event_buffer_size, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let (scheduler, jobs) = TokioScheduler::channel(config.event_buffer_size);
    let mut api = OrderFlowApi::new(db, scheduler.clone(), producers, config.engine.clone());
    let expiry_worker = start_expiry_worker(api.clone(), jobs);
    let sweep_worker = start_sweep_worker(api.clone(), config.sweep_interval);
    info!("🚀️ Escrow daemon is running. Press Ctrl-C to stop.");

    let result = tokio::signal::ctrl_c().await;
    info!("🚀️ Shutting down");
    sweep_worker.abort();
    scheduler.shutdown().await;
    expiry_worker.abort();
    if let Err(e) = api.db_mut().close().await {
        warn!("🚀️ Could not close the database cleanly. {e}");
    }
    result.map_err(ServerError::from)
}
