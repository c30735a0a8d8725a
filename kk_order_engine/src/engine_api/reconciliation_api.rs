use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{Order, OrderId, OrderStatusType},
    engine_api::{
        config::EngineConfig,
        errors::OrderEngineError,
        objects::{ReconcileFinding, ReconcileReport, SweepReport, WebhookOutcome},
        order_flow_api::{OrderFlowApi, PaymentEvidence},
    },
    events::EventProducers,
    order_state::VerifiedPayment,
    traits::{CheckoutDatabase, GatewayEvent, GatewayPaymentStatus, OrderQueryFilter, PaymentGateway, PaymentSource},
};

/// `ReconciliationApi` is the server-side half of payment confirmation. It handles payment webhooks, lets an admin
/// re-check an order against the gateway, and sweeps pending orders that neither confirmation channel has settled.
pub struct ReconciliationApi<B, G> {
    db: B,
    gateway: G,
    flow: OrderFlowApi<B>,
    config: EngineConfig,
}

impl<B, G> Debug for ReconciliationApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B: Clone, G> ReconciliationApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers, config: EngineConfig) -> Self {
        let flow = OrderFlowApi::new(db.clone(), producers).with_config(config.clone());
        Self { db, gateway, flow, config }
    }
}

impl<B, G> ReconciliationApi<B, G>
where
    B: CheckoutDatabase,
    G: PaymentGateway,
{
    /// Handles a payment webhook body. The signature must already have been checked against these exact bytes.
    ///
    /// Captures go through the same confirmation as the client callback, so it does not matter which of the two
    /// arrives first, or whether one of them never arrives at all.
    pub async fn handle_payment_webhook(&self, raw_body: &[u8]) -> Result<WebhookOutcome, OrderEngineError> {
        match self.gateway.parse_webhook(raw_body)? {
            GatewayEvent::PaymentCaptured { intent_id, payment_id, amount } => {
                let Some(order) = self.db.fetch_order_by_gateway_order_id(&intent_id).await? else {
                    warn!("🔁️ Payment {payment_id} was captured for unknown gateway order {intent_id}");
                    return Ok(WebhookOutcome::UnknownOrder { gateway_order_id: intent_id });
                };
                let evidence =
                    PaymentEvidence::new(VerifiedPayment::new(payment_id), PaymentSource::Webhook).with_amount(amount);
                let confirmed = self.flow.confirm_payment(&order, evidence).await?;
                let already_paid = confirmed.already_paid;
                Ok(WebhookOutcome::Confirmed { order_id: confirmed.order.order_id, already_paid })
            },
            GatewayEvent::PaymentFailed { intent_id, payment_id, reason } => {
                let Some(order) = self.db.fetch_order_by_gateway_order_id(&intent_id).await? else {
                    warn!("🔁️ Payment {payment_id} failed for unknown gateway order {intent_id}");
                    return Ok(WebhookOutcome::UnknownOrder { gateway_order_id: intent_id });
                };
                let order = self.flow.record_payment_failure(&order, &payment_id, reason.as_deref()).await?;
                Ok(WebhookOutcome::PaymentFailed { order_id: order.order_id, payment_status: order.payment_status })
            },
            GatewayEvent::Other(event) => {
                debug!("🔁️ Ignoring webhook event {event}");
                Ok(WebhookOutcome::Ignored { event })
            },
        }
    }

    /// Asks the gateway what happened to a pending order's intent and applies a captured payment if there is one.
    pub async fn reconcile_order(&self, order_id: &OrderId) -> Result<ReconcileReport, OrderEngineError> {
        let order = self.flow.fetch_order(order_id).await?;
        self.reconcile(order).await
    }

    async fn reconcile(&self, order: Order) -> Result<ReconcileReport, OrderEngineError> {
        let order_id = order.order_id.clone();
        if order.status != OrderStatusType::Pending {
            let finding = ReconcileFinding::NotPending { status: order.status };
            return Ok(ReconcileReport { order_id, finding, order });
        }
        let Some(intent_id) = order.gateway_order_id.clone() else {
            return Err(OrderEngineError::ValidationError(format!("Order {order_id} has no gateway order")));
        };
        let key_id = order.gateway_key_id.clone().unwrap_or_default();
        let payments = self.gateway.fetch_payments(&key_id, &intent_id).await?;
        if let Some(captured) = payments.iter().find(|p| p.is_captured()) {
            info!("🔁️ Found captured payment {} for pending order {order_id}", captured.payment_id);
            let payment = VerifiedPayment::new(&captured.payment_id);
            let evidence = PaymentEvidence::new(payment, PaymentSource::Reconciliation).with_amount(captured.amount);
            let confirmed = self.flow.confirm_payment(&order, evidence).await?;
            let finding = ReconcileFinding::Captured {
                payment_id: captured.payment_id.clone(),
                already_paid: confirmed.already_paid,
            };
            return Ok(ReconcileReport { order_id, finding, order: confirmed.order });
        }
        let all_failed = payments.iter().all(|p| p.status == GatewayPaymentStatus::Failed);
        let order = match payments.last().filter(|_| all_failed) {
            Some(failed) => {
                self.flow.record_payment_failure(&order, &failed.payment_id, failed.error.as_deref()).await?
            },
            None => order,
        };
        debug!("🔁️ No captured payment for {order_id} after {} attempt(s)", payments.len());
        let finding = ReconcileFinding::NotCaptured { attempts: payments.iter().map(|p| p.status).collect() };
        Ok(ReconcileReport { order_id, finding, order })
    }

    /// Reconciles every pending order older than `stale_after`, and cancels those older than `abandon_after` that
    /// still have no captured payment. An order is never cancelled when the gateway could not be asked.
    pub async fn sweep_stale_orders(&self, now: DateTime<Utc>) -> Result<SweepReport, OrderEngineError> {
        let filter = OrderQueryFilter::default()
            .with_status(OrderStatusType::Pending)
            .created_before(now - self.config.stale_after);
        let stale = self.db.search_orders(filter).await?;
        let abandon_before = now - self.config.abandon_after;
        let mut report = SweepReport { examined: stale.len(), ..Default::default() };
        for order in stale {
            let order_id = order.order_id.clone();
            let abandoned = order.created_at < abandon_before;
            match self.reconcile(order).await {
                Ok(ReconcileReport { finding: ReconcileFinding::Captured { .. }, .. }) => {
                    report.confirmed.push(order_id);
                },
                Ok(ReconcileReport { finding: ReconcileFinding::NotCaptured { .. }, order, .. }) if abandoned => {
                    match self.flow.cancel_abandoned(&order).await {
                        Ok(_) => report.cancelled.push(order_id),
                        Err(e) => {
                            warn!("🔁️ Could not cancel abandoned order {order_id}: {e}");
                            report.skipped.push(order_id);
                        },
                    }
                },
                Ok(_) => {},
                Err(e) => {
                    warn!("🔁️ Could not reconcile order {order_id}: {e}");
                    report.skipped.push(order_id);
                },
            }
        }
        if report.examined > 0 {
            info!(
                "🔁️ Sweep examined {} pending order(s): {} confirmed, {} cancelled, {} skipped",
                report.examined,
                report.confirmed.len(),
                report.cancelled.len(),
                report.skipped.len()
            );
        }
        Ok(report)
    }
}
