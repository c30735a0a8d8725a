use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewRefund, Order, OrderId, Paise, PaymentMethod, PaymentStatus, Refund, RefundKind},
    engine_api::{
        config::EngineConfig,
        errors::OrderEngineError,
        objects::{ManualRefundRequest, Requester, ReturnDecision},
    },
    events::{EventProducers, OrderAnnulledEvent, ReturnDecidedEvent},
    order_state::{transition, OrderEvent, OrderState, Transition, TransitionRules},
    traits::{
        AnnulledOrder,
        OrderAnnulment,
        PaymentGateway,
        RefundManagement,
        RefundQueryFilter,
        RefundRequest,
        ReturnRequest,
        StatusChange,
    },
};

/// `RefundApi` handles everything that sends money back: cancellations, returns and manual refunds.
///
/// The gateway refund is always issued first. If it fails, the order is left exactly as it was and
/// [`OrderEngineError::RefundFailed`] is returned. If the refund succeeds but the order cannot be updated afterwards,
/// the order is flagged for reconciliation so that the refund is not lost.
pub struct RefundApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
    config: EngineConfig,
}

impl<B, G> Debug for RefundApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi")
    }
}

impl<B, G> RefundApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers, config: EngineConfig) -> Self {
        Self { db, gateway, producers, config }
    }

    fn rules(&self) -> TransitionRules {
        TransitionRules::new(self.config.return_window)
    }
}

impl<B, G> RefundApi<B, G>
where
    B: RefundManagement,
    G: PaymentGateway,
{
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, OrderEngineError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| OrderEngineError::OrderNotFound(order_id.clone()))
    }

    /// Cancels an order that has not shipped yet. A captured payment is refunded in full and committed stock is put
    /// back.
    pub async fn process_order_cancellation(
        &self,
        requester: &Requester,
        order_id: &OrderId,
        reason: &str,
    ) -> Result<AnnulledOrder, OrderEngineError> {
        let order = self.fetch_order(order_id).await?;
        if !requester.may_access(&order) {
            return Err(OrderEngineError::NotOrderOwner);
        }
        let to = match transition(OrderState::from(&order), &OrderEvent::Cancel, &self.rules())? {
            Transition::To(status) => status,
            Transition::NoOp => return Ok(AnnulledOrder { order, refund: None, stock_restored: false }),
        };
        let reason = if reason.trim().is_empty() { "Cancelled on request" } else { reason.trim() };
        let mut annulment = OrderAnnulment::new(order.order_id.clone(), order.status, to);
        if let Some(refund) = self.refund_remaining(&order, RefundKind::Cancellation, reason, None).await? {
            annulment = annulment.with_refund(refund, PaymentStatus::Refunded);
        }
        let annulled = self.annul(&order, annulment).await?;
        info!(
            "💸️ Order {} cancelled by {}. Refunded: {}. Stock restored: {}",
            annulled.order.order_id,
            requester.user_id,
            annulled.refund.as_ref().map(|r| r.amount.to_string()).unwrap_or_else(|| "nothing".into()),
            annulled.stock_restored
        );
        let event = OrderAnnulledEvent::new(annulled.order.clone(), annulled.refund.clone());
        self.producers.publish_order_annulled(event).await;
        Ok(annulled)
    }

    /// The owner asks to return a delivered order within the return window.
    pub async fn request_return(
        &self,
        user_id: &str,
        order_id: &OrderId,
        reason: &str,
        comments: Option<String>,
    ) -> Result<Order, OrderEngineError> {
        let order = self.fetch_order(order_id).await?;
        if !order.is_owned_by(user_id) {
            return Err(OrderEngineError::NotOrderOwner);
        }
        let event = OrderEvent::RequestReturn { reason: reason.to_string() };
        match transition(OrderState::from(&order), &event, &self.rules())? {
            Transition::NoOp => Ok(order),
            Transition::To(status) => {
                let request = ReturnRequest { reason: reason.trim().to_string(), comments };
                let change = StatusChange::new(order.order_id.clone(), order.status, status).with_return_request(request);
                let order = self.db.update_order_status(change).await?;
                info!("💸️ Return requested for order {}: {}", order.order_id, reason.trim());
                Ok(order)
            },
        }
    }

    /// Approving a return refunds what is left of the captured payment and puts the stock back. Rejecting it moves the
    /// order back to `delivered`.
    pub async fn decide_return(&self, order_id: &OrderId, approve: bool) -> Result<ReturnDecision, OrderEngineError> {
        let order = self.fetch_order(order_id).await?;
        let event = if approve { OrderEvent::ApproveReturn } else { OrderEvent::RejectReturn };
        let to = match transition(OrderState::from(&order), &event, &self.rules())? {
            Transition::To(status) => status,
            Transition::NoOp => return Ok(ReturnDecision { order, approved: approve, refund: None }),
        };
        let decision = if approve {
            let reason = order.return_reason.clone().unwrap_or_else(|| "Return approved".to_string());
            let note = offline_settlement_note(&order);
            let mut annulment = OrderAnnulment::new(order.order_id.clone(), order.status, to);
            if let Some(refund) = self.refund_remaining(&order, RefundKind::Return, &reason, note).await? {
                annulment = annulment.with_refund(refund, PaymentStatus::Refunded);
            }
            let annulled = self.annul(&order, annulment).await?;
            let event = OrderAnnulledEvent::new(annulled.order.clone(), annulled.refund.clone());
            self.producers.publish_order_annulled(event).await;
            ReturnDecision { order: annulled.order, approved: true, refund: annulled.refund }
        } else {
            let change = StatusChange::new(order.order_id.clone(), order.status, to);
            let order = self.db.update_order_status(change).await?;
            ReturnDecision { order, approved: false, refund: None }
        };
        info!(
            "💸️ Return for order {} {}",
            decision.order.order_id,
            if approve { "approved" } else { "rejected" }
        );
        self.producers.publish_return_decided(ReturnDecidedEvent::new(decision.order.clone(), approve)).await;
        Ok(decision)
    }

    /// Refunds part or all of a captured payment without changing the order's fulfilment status.
    pub async fn process_manual_refund(
        &self,
        request: ManualRefundRequest,
    ) -> Result<(Order, Refund), OrderEngineError> {
        if !request.amount.is_positive() {
            return Err(OrderEngineError::ValidationError("A refund must be for a positive amount".into()));
        }
        if request.reason.trim().is_empty() {
            return Err(OrderEngineError::ValidationError("A refund needs a reason".into()));
        }
        let order = self.fetch_order(&request.order_id).await?;
        let captured = order.captured_amount();
        let Some(payment_id) = order.gateway_payment_id.clone().filter(|_| captured.is_positive()) else {
            return Err(OrderEngineError::ValidationError(format!(
                "Order {} has no captured payment to refund",
                order.order_id
            )));
        };
        let refundable = captured - self.db.total_refunded(&order.order_id).await?;
        if request.amount > refundable {
            return Err(OrderEngineError::RefundExceedsCaptured { refundable, requested: request.amount });
        }
        let gateway_refund_id = self.issue_refund(&order, &payment_id, request.amount, RefundKind::Manual).await?;
        let payment_status =
            if request.amount == refundable { PaymentStatus::Refunded } else { PaymentStatus::PartiallyRefunded };
        let refund = NewRefund {
            order_id: order.order_id.clone(),
            gateway_refund_id: Some(gateway_refund_id),
            gateway_payment_id: Some(payment_id),
            amount: request.amount,
            reason: request.reason.trim().to_string(),
            kind: RefundKind::Manual,
            note: None,
        };
        match self.db.record_refund(refund, captured, payment_status).await {
            Ok((order, refund)) => {
                info!("💸️ Manual refund of {} issued for order {}", refund.amount, order.order_id);
                Ok((order, refund))
            },
            Err(e) => Err(self.refund_not_recorded(&order, request.amount, e.into()).await),
        }
    }

    pub async fn refunds(&self, filter: RefundQueryFilter) -> Result<Vec<Refund>, OrderEngineError> {
        Ok(self.db.fetch_refunds(filter).await?)
    }

    /// Refunds whatever is left of the captured payment through the gateway and returns the record to store.
    async fn refund_remaining(
        &self,
        order: &Order,
        kind: RefundKind,
        reason: &str,
        note: Option<String>,
    ) -> Result<Option<NewRefund>, OrderEngineError> {
        let captured = order.captured_amount();
        let Some(payment_id) = order.gateway_payment_id.clone().filter(|_| captured.is_positive()) else {
            return Ok(None);
        };
        let remaining = captured - self.db.total_refunded(&order.order_id).await?;
        if !remaining.is_positive() {
            debug!("💸️ Order {} has already been refunded in full", order.order_id);
            return Ok(None);
        }
        let gateway_refund_id = self.issue_refund(order, &payment_id, remaining, kind).await?;
        Ok(Some(NewRefund {
            order_id: order.order_id.clone(),
            gateway_refund_id: Some(gateway_refund_id),
            gateway_payment_id: Some(payment_id),
            amount: remaining,
            reason: reason.to_string(),
            kind,
            note,
        }))
    }

    async fn issue_refund(
        &self,
        order: &Order,
        payment_id: &str,
        amount: Paise,
        kind: RefundKind,
    ) -> Result<String, OrderEngineError> {
        let request = RefundRequest {
            key_id: order.gateway_key_id.clone().unwrap_or_default(),
            payment_id: payment_id.to_string(),
            amount,
            receipt: format!("{}-{kind}", order.order_id),
        };
        match self.gateway.refund(request).await {
            Ok(refund) => {
                debug!("💸️ Gateway refund {} of {amount} issued for {}", refund.refund_id, order.order_id);
                Ok(refund.refund_id)
            },
            Err(e) => {
                error!("💸️ Refund of {amount} for order {} failed: {e}. The order has not been changed", order.order_id);
                Err(OrderEngineError::RefundFailed(e.to_string()))
            },
        }
    }

    async fn annul(&self, order: &Order, annulment: OrderAnnulment) -> Result<AnnulledOrder, OrderEngineError> {
        let refunded = annulment.refund.as_ref().map(|r| r.amount);
        match self.db.annul_order(annulment).await {
            Ok(annulled) => Ok(annulled),
            Err(e) => match refunded {
                Some(amount) => Err(self.refund_not_recorded(order, amount, e.into()).await),
                None => Err(e.into()),
            },
        }
    }

    async fn refund_not_recorded(
        &self,
        order: &Order,
        amount: Paise,
        err: OrderEngineError,
    ) -> OrderEngineError {
        let note = format!("A refund of {amount} was issued by the gateway but could not be recorded: {err}");
        error!("💸️ Order {}: {note}", order.order_id);
        if let Err(e) = self.db.flag_for_reconciliation(&order.order_id, &note).await {
            error!("💸️ Could not flag order {} for reconciliation: {e}", order.order_id);
        }
        err
    }
}

/// For COD orders only the confirmation token went through the gateway. The rest was paid in cash.
fn offline_settlement_note(order: &Order) -> Option<String> {
    if order.payment_method != PaymentMethod::Cod {
        return None;
    }
    let offline = order.amount - order.prepaid_amount;
    offline.is_positive().then(|| format!("{offline} collected on delivery is settled offline"))
}
