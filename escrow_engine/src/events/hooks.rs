use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, OrderNotification};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_updated_producer: Vec<EventProducer<OrderNotification>>,
}

impl EventProducers {
    pub fn is_empty(&self) -> bool {
        self.order_updated_producer.is_empty()
    }
}

pub struct EventHandlers {
    pub on_order_updated: Option<EventHandler<OrderNotification>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_updated = hooks.on_order_updated.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_updated }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_updated {
            result.order_updated_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_updated {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_updated: Option<Handler<OrderNotification>>,
}

impl EventHooks {
    /// Registers the hook that is called for every notification produced by an order transition.
    pub fn on_order_updated<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderNotification) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_updated = Some(Arc::new(f));
        self
    }
}
