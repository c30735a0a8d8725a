use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{EventHandler, EventProducer, Handler, OrderAnnulledEvent, OrderPaidEvent, ReturnDecidedEvent};

/// Cloneable handles used by the engine APIs to publish events. Empty by default, in which case publishing is a no-op.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub order_annulled_producer: Vec<EventProducer<OrderAnnulledEvent>>,
    pub return_decided_producer: Vec<EventProducer<ReturnDecidedEvent>>,
}

impl EventProducers {
    pub async fn publish_order_paid(&self, event: OrderPaidEvent) {
        for producer in &self.order_paid_producer {
            debug!("📬️ Notifying order paid hook subscribers");
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_order_annulled(&self, event: OrderAnnulledEvent) {
        for producer in &self.order_annulled_producer {
            debug!("📬️ Notifying order annulled hook subscribers");
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_return_decided(&self, event: ReturnDecidedEvent) {
        for producer in &self.return_decided_producer {
            debug!("📬️ Notifying return decision hook subscribers");
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_order_annulled: Option<EventHandler<OrderAnnulledEvent>>,
    pub on_return_decided: Option<EventHandler<ReturnDecidedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_paid = hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f));
        let on_order_annulled = hooks.on_order_annulled.map(|f| EventHandler::new(buffer_size, f));
        let on_return_decided = hooks.on_return_decided.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_paid, on_order_annulled, on_return_decided }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_annulled {
            result.order_annulled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_return_decided {
            result.return_decided_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns one task per configured hook. Each task ends once all of its producers have been dropped.
    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_annulled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_return_decided {
            tokio::spawn(handler.start_handler());
        }
    }
}

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_order_annulled: Option<Handler<OrderAnnulledEvent>>,
    pub on_return_decided: Option<Handler<ReturnDecidedEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_order_annulled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAnnulledEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_annulled = Some(Arc::new(f));
        self
    }

    pub fn on_return_decided<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ReturnDecidedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_return_decided = Some(Arc::new(f));
        self
    }
}
