use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{Order, OrderId, OrderStatusType, Paise, TrackingInfo},
    engine_api::{
        config::EngineConfig,
        errors::OrderEngineError,
        objects::{ConfirmedPayment, ShippingEvent, ShippingUpdate},
    },
    events::{EventProducers, OrderAnnulledEvent, OrderPaidEvent},
    order_state::{transition, OrderEvent, OrderState, Transition, TransitionError, TransitionRules, VerifiedPayment},
    traits::{CheckoutDatabase, CommitOutcome, PaymentCommit, PaymentSource, StatusChange},
};

/// A verified payment, and what we know about it.
#[derive(Debug, Clone)]
pub struct PaymentEvidence {
    pub payment: VerifiedPayment,
    pub signature: Option<String>,
    pub amount_captured: Option<Paise>,
    pub source: PaymentSource,
}

impl PaymentEvidence {
    pub(crate) fn new(payment: VerifiedPayment, source: PaymentSource) -> Self {
        Self { payment, signature: None, amount_captured: None, source }
    }

    pub fn with_signature<S: Into<String>>(mut self, signature: S) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_amount(mut self, amount: Paise) -> Self {
        self.amount_captured = Some(amount);
        self
    }
}

/// `OrderFlowApi` moves orders through their lifecycle. Every transition is checked by the state machine in
/// [`crate::order_state`] and then written as a compare-and-set on the status it was computed from.
///
/// [`OrderFlowApi::confirm_payment`] is the single join point for payment confirmations. The client callback, the
/// payment webhook and the reconciliation worker all end up there, in any order and any number of times.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
    config: EngineConfig,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, config: EngineConfig::default() }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn rules(&self) -> TransitionRules {
        TransitionRules::new(self.config.return_window)
    }
}

impl<B> OrderFlowApi<B>
where B: CheckoutDatabase
{
    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, OrderEngineError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| OrderEngineError::OrderNotFound(order_id.clone()))
    }

    /// Applies a verified payment to `order`.
    ///
    /// The first confirmation marks the order paid and commits stock and coupon usage in one transaction. Later
    /// confirmations of the same payment are successful no-ops (`already_paid` is set). A payment that cannot be
    /// applied, e.g. because the order was cancelled in the meantime, flags the order for manual review and returns
    /// the transition error: the money has been taken and somebody has to look at it.
    pub async fn confirm_payment(
        &self,
        order: &Order,
        evidence: PaymentEvidence,
    ) -> Result<ConfirmedPayment, OrderEngineError> {
        let event = OrderEvent::MarkPaid(evidence.payment.clone());
        match transition(OrderState::from(order), &event, &self.rules()) {
            Ok(Transition::NoOp) => {
                debug!("💳️ Payment {} for {} was already applied", evidence.payment.payment_id(), order.order_id);
                return Ok(ConfirmedPayment { order: order.clone(), already_paid: true });
            },
            Ok(Transition::To(_)) => {},
            Err(e) => return Err(self.reject_payment(order, &evidence, e).await),
        }
        let commit = PaymentCommit {
            order_id: order.order_id.clone(),
            gateway_payment_id: evidence.payment.payment_id().to_string(),
            gateway_signature: evidence.signature.clone(),
            amount_captured: evidence.amount_captured,
            source: evidence.source,
            at: Utc::now(),
        };
        match self.db.commit_payment(commit).await? {
            CommitOutcome::Paid(committed) => {
                let order = committed.order;
                info!(
                    "💳️ Order {} is paid. {} captured as {} via {}",
                    order.order_id,
                    order.prepaid_amount,
                    evidence.payment.payment_id(),
                    evidence.source
                );
                if order.needs_reconciliation {
                    warn!("💳️ Order {} was paid but needs manual reconciliation", order.order_id);
                }
                self.producers.publish_order_paid(OrderPaidEvent::new(order.clone())).await;
                Ok(ConfirmedPayment { order, already_paid: false })
            },
            CommitOutcome::AlreadyPaid(order) => {
                debug!("💳️ Payment {} for {} was applied concurrently", evidence.payment.payment_id(), order.order_id);
                Ok(ConfirmedPayment { order, already_paid: true })
            },
            CommitOutcome::NotPending(current) => {
                let to = OrderStatusType::Paid;
                let err = match transition(OrderState::from(&current), &event, &self.rules()) {
                    Err(e) => e,
                    Ok(_) => TransitionError::InvalidStateTransition { from: current.status, to },
                };
                Err(self.reject_payment(&current, &evidence, err).await)
            },
        }
    }

    async fn reject_payment(
        &self,
        order: &Order,
        evidence: &PaymentEvidence,
        err: TransitionError,
    ) -> OrderEngineError {
        let note = format!(
            "Payment {} ({}) arrived while the order was {}. Refund it or apply it manually.",
            evidence.payment.payment_id(),
            evidence.source,
            order.status
        );
        warn!("💳️ Order {}: {note}", order.order_id);
        if let Err(e) = self.db.flag_for_reconciliation(&order.order_id, &note).await {
            error!("💳️ Could not flag order {} for reconciliation: {e}", order.order_id);
        }
        err.into()
    }

    /// Records a failed payment attempt on a still-pending order. Other orders are returned unchanged.
    pub async fn record_payment_failure(
        &self,
        order: &Order,
        payment_id: &str,
        reason: Option<&str>,
    ) -> Result<Order, OrderEngineError> {
        let updated = self.db.mark_payment_failed(&order.order_id).await?;
        info!(
            "💳️ Payment attempt {payment_id} for {} failed: {}. Payment status is now {}",
            order.order_id,
            reason.unwrap_or("no reason given"),
            updated.payment_status
        );
        Ok(updated)
    }

    pub async fn flag_for_reconciliation(&self, order_id: &OrderId, note: &str) -> Result<Order, OrderEngineError> {
        Ok(self.db.flag_for_reconciliation(order_id, note).await?)
    }

    async fn advance(
        &self,
        order: &Order,
        event: &OrderEvent,
        tracking: Option<TrackingInfo>,
        at: DateTime<Utc>,
    ) -> Result<Order, OrderEngineError> {
        match transition(OrderState::from(order), event, &self.rules())? {
            Transition::NoOp => Ok(order.clone()),
            Transition::To(status) => {
                let mut change = StatusChange::new(order.order_id.clone(), order.status, status).at(at);
                if let Some(tracking) = tracking.filter(|t| !t.is_empty()) {
                    change = change.with_tracking(tracking);
                }
                let updated = self.db.update_order_status(change).await?;
                info!("📦️ Order {} moved from {} to {}", updated.order_id, order.status, updated.status);
                Ok(updated)
            },
        }
    }

    pub async fn start_processing(&self, order_id: &OrderId) -> Result<Order, OrderEngineError> {
        let order = self.fetch_order(order_id).await?;
        self.advance(&order, &OrderEvent::StartProcessing, None, Utc::now()).await
    }

    /// Hands the order to the courier. A tracking URL is mandatory.
    pub async fn ship(&self, order_id: &OrderId, tracking: TrackingInfo) -> Result<Order, OrderEngineError> {
        let order = self.fetch_order(order_id).await?;
        let event = OrderEvent::Ship { tracking_url: tracking.tracking_url.clone() };
        self.advance(&order, &event, Some(tracking), Utc::now()).await
    }

    pub async fn deliver(
        &self,
        order_id: &OrderId,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<Order, OrderEngineError> {
        let order = self.fetch_order(order_id).await?;
        self.advance(&order, &OrderEvent::Deliver, None, delivered_at.unwrap_or_else(Utc::now)).await
    }

    /// Admin status changes along the fulfilment path. Cancellations and returns have their own flows in
    /// [`crate::RefundApi`] because they move money.
    pub async fn update_status(
        &self,
        order_id: &OrderId,
        status: OrderStatusType,
        tracking: TrackingInfo,
    ) -> Result<Order, OrderEngineError> {
        match status {
            OrderStatusType::Processing => self.start_processing(order_id).await,
            OrderStatusType::Shipped => self.ship(order_id, tracking).await,
            OrderStatusType::Delivered => self.deliver(order_id, None).await,
            other => Err(OrderEngineError::ValidationError(format!(
                "Orders cannot be moved to {other} directly. Use the cancellation or return endpoints"
            ))),
        }
    }

    /// Applies a shipping partner event. Courier reports can arrive late, twice, or out of order:
    ///
    /// * a repeated `shipped` or an `in_transit` only refreshes the tracking details;
    /// * `delivered` for an order that is still `processing` ships and delivers it in one go, if the report carries a
    ///   tracking URL;
    /// * reports about orders that have already moved past the reported state are acknowledged without changes.
    pub async fn apply_shipping_update(&self, update: ShippingUpdate) -> Result<Order, OrderEngineError> {
        use OrderStatusType::*;
        let order = self.fetch_order(&update.order_id).await?;
        let tracking = TrackingInfo {
            tracking_url: update.tracking_url.clone(),
            courier_name: update.courier_name.clone(),
            awb_code: update.awb_code.clone(),
            estimated_delivery: update.estimated_delivery.clone(),
        };
        let now = Utc::now();
        match (update.event, order.status) {
            (ShippingEvent::Shipped, Shipped) | (ShippingEvent::InTransit, Processing | Shipped) => {
                if tracking.is_empty() {
                    return Ok(order);
                }
                debug!("📦️ Updating tracking details for {}", order.order_id);
                Ok(self.db.update_tracking(&order.order_id, tracking).await?)
            },
            (ShippingEvent::InTransit | ShippingEvent::Shipped, Delivered | ReturnRequested | Returned)
            | (ShippingEvent::Delivered, Delivered | ReturnRequested | Returned) => {
                debug!("📦️ Ignoring a stale {:?} report for {} ({})", update.event, order.order_id, order.status);
                Ok(order)
            },
            (ShippingEvent::InTransit, status) => {
                Err(OrderEngineError::InvalidStateTransition { from: status, to: Shipped })
            },
            (ShippingEvent::Shipped, _) => {
                let event = OrderEvent::Ship { tracking_url: tracking.tracking_url.clone() };
                self.advance(&order, &event, Some(tracking), now).await
            },
            (ShippingEvent::Delivered, Processing) if tracking.tracking_url.is_some() => {
                let event = OrderEvent::Ship { tracking_url: tracking.tracking_url.clone() };
                let shipped = self.advance(&order, &event, Some(tracking), now).await?;
                self.advance(&shipped, &OrderEvent::Deliver, None, update.delivered_at.unwrap_or(now)).await
            },
            (ShippingEvent::Delivered, _) => {
                self.advance(&order, &OrderEvent::Deliver, Some(tracking), update.delivered_at.unwrap_or(now)).await
            },
        }
    }

    /// Cancels a pending order whose payment never arrived. No stock was committed and nothing was captured, so there
    /// is nothing to put back.
    pub async fn cancel_abandoned(&self, order: &Order) -> Result<Order, OrderEngineError> {
        if order.status != OrderStatusType::Pending {
            return Err(OrderEngineError::InvalidStateTransition { from: order.status, to: OrderStatusType::Cancelled });
        }
        let cancelled = self.advance(order, &OrderEvent::Cancel, None, Utc::now()).await?;
        info!("📦️ Abandoned order {} has been cancelled", cancelled.order_id);
        self.producers.publish_order_annulled(OrderAnnulledEvent::new(cancelled.clone(), None)).await;
        Ok(cancelled)
    }
}
