use std::{future::Future, pin::Pin};

use escrow_engine::events::{EventHooks, OrderNotification};
use log::*;

/// Hooks that write every order notification to the `escrow::notifications` log target as a JSON line. Fan-out to
/// real delivery channels plugs in here.
pub fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_order_updated(|notification| {
        Box::pin(async move { log_notification(&notification) }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks
}

fn log_notification(notification: &OrderNotification) {
    match serde_json::to_string(notification) {
        Ok(json) => info!(target: "escrow::notifications", "{json}"),
        Err(e) => warn!("📬️ Could not serialize notification ({notification}). {e}"),
    }
}
