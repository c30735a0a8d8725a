//! Customer notification hooks.
//!
//! The engine publishes an event when an order is paid, annulled (cancelled or returned) or when a return is decided.
//! These hooks log every event and, if `KK_NOTIFICATION_URL` is set, POST a small JSON summary to the email service.
//! Delivery failures are logged and otherwise ignored. They never affect the order.
use std::time::Duration;

use kk_order_engine::{
    db_types::{Order, OrderId, OrderStatusType, Paise, PaymentStatus},
    events::{EventHandlers, EventHooks, OrderAnnulledEvent},
};
use log::*;
use serde::Serialize;

use crate::errors::ServerError;

pub const NOTIFICATION_EVENT_BUFFER_SIZE: usize = 25;
const NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderNotification {
    pub event: &'static str,
    pub order_id: OrderId,
    pub user_id: String,
    pub status: OrderStatusType,
    pub payment_status: PaymentStatus,
    pub amount: Paise,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<Paise>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_approved: Option<bool>,
}

impl OrderNotification {
    pub fn new(event: &'static str, order: &Order) -> Self {
        Self {
            event,
            order_id: order.order_id.clone(),
            user_id: order.user_id.clone(),
            status: order.status,
            payment_status: order.payment_status,
            amount: order.amount,
            refund_amount: None,
            return_approved: None,
        }
    }
}

#[derive(Clone)]
struct Notifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl Notifier {
    async fn send(&self, notification: OrderNotification) {
        info!("📬️ Order {} {} (status {})", notification.order_id, notification.event, notification.status);
        let Some(url) = &self.url else {
            trace!("📬️ No notification URL configured");
            return;
        };
        let result = self.client.post(url).json(&notification).send().await.and_then(|r| r.error_for_status());
        match result {
            Ok(_) => debug!("📬️ Sent {} notification for {}", notification.event, notification.order_id),
            Err(e) => {
                warn!("📬️ Could not send {} notification for {}. {e}", notification.event, notification.order_id)
            },
        }
    }
}

pub fn create_notification_handlers(url: Option<String>) -> Result<EventHandlers, ServerError> {
    let client = reqwest::Client::builder()
        .timeout(NOTIFICATION_TIMEOUT)
        .build()
        .map_err(|e| ServerError::InitializeError(format!("Could not create the notification client. {e}")))?;
    if url.is_none() {
        info!("📬️ KK_NOTIFICATION_URL is not set. Order events will only be logged.");
    }
    let notifier = Notifier { client, url };
    let mut hooks = EventHooks::default();
    let n = notifier.clone();
    hooks.on_order_paid(move |ev| {
        let n = n.clone();
        Box::pin(async move { n.send(OrderNotification::new("order_paid", &ev.order)).await })
    });
    let n = notifier.clone();
    hooks.on_order_annulled(move |ev| {
        let OrderAnnulledEvent { order, status, refund } = ev;
        let event = if status == OrderStatusType::Returned { "order_returned" } else { "order_cancelled" };
        let mut notification = OrderNotification::new(event, &order);
        notification.refund_amount = refund.map(|r| r.amount);
        let n = n.clone();
        Box::pin(async move { n.send(notification).await })
    });
    hooks.on_return_decided(move |ev| {
        let mut notification = OrderNotification::new("return_decided", &ev.order);
        notification.return_approved = Some(ev.approved);
        let n = notifier.clone();
        Box::pin(async move { n.send(notification).await })
    });
    Ok(EventHandlers::new(NOTIFICATION_EVENT_BUFFER_SIZE, hooks))
}
