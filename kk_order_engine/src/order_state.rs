//! The order status state machine.
//!
//! [`transition`] is a pure, total function: for every `(status, event)` pair it returns either the next status, a
//! no-op, or a [`TransitionError`]. It never touches storage. Persisting a transition is the job of the storage
//! layer, which applies it as a compare-and-set on the status that was used to compute it.
//!
//! | From \ Event       | MarkPaid           | StartProcessing | Ship      | Deliver   | RequestReturn     | Approve  | Reject    | Cancel          |
//! |--------------------|--------------------|-----------------|-----------|-----------|-------------------|----------|-----------|-----------------|
//! | `pending`          | `paid`             | ✗               | ✗         | ✗         | ✗                 | ✗        | ✗         | `cancelled`     |
//! | `paid`             | no-op if same id   | `processing`    | ✗         | ✗         | ✗                 | ✗        | ✗         | `cancelled`     |
//! | `processing`       | ✗                  | ✗               | `shipped` | ✗         | ✗                 | ✗        | ✗         | `cancelled`     |
//! | `shipped`          | ✗                  | ✗               | ✗         | `delivered` | ✗               | ✗        | ✗         | window closed   |
//! | `delivered`        | ✗                  | ✗               | ✗         | ✗         | `return_requested` | ✗       | ✗         | window closed   |
//! | `return_requested` | ✗                  | ✗               | ✗         | ✗         | ✗                 | `returned` | `delivered` | window closed |
//! | `returned`         | ✗                  | ✗               | ✗         | ✗         | ✗                 | ✗        | ✗         | window closed   |
//! | `cancelled`        | ✗                  | ✗               | ✗         | ✗         | ✗                 | ✗        | ✗         | ✗               |
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::db_types::{Order, OrderStatusType};

/// Proof that a payment id has passed signature verification or was reported captured by the gateway itself.
///
/// Only the engine can construct one, so `MarkPaid` cannot be fed an unverified payment from outside the crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    payment_id: String,
}

impl VerifiedPayment {
    pub(crate) fn new<S: Into<String>>(payment_id: S) -> Self {
        Self { payment_id: payment_id.into() }
    }

    pub fn payment_id(&self) -> &str {
        &self.payment_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    MarkPaid(VerifiedPayment),
    StartProcessing,
    Ship { tracking_url: Option<String> },
    Deliver,
    RequestReturn { reason: String },
    ApproveReturn,
    RejectReturn,
    Cancel,
}

impl OrderEvent {
    /// The status this event moves an order into when it is allowed.
    pub fn target_status(&self) -> OrderStatusType {
        match self {
            Self::MarkPaid(_) => OrderStatusType::Paid,
            Self::StartProcessing => OrderStatusType::Processing,
            Self::Ship { .. } => OrderStatusType::Shipped,
            Self::Deliver => OrderStatusType::Delivered,
            Self::RequestReturn { .. } => OrderStatusType::ReturnRequested,
            Self::ApproveReturn => OrderStatusType::Returned,
            Self::RejectReturn => OrderStatusType::Delivered,
            Self::Cancel => OrderStatusType::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Cannot move an order from {from} to {to}")]
    InvalidStateTransition { from: OrderStatusType, to: OrderStatusType },
    #[error("The order has already left the warehouse and can no longer be cancelled")]
    CancellationWindowClosed,
    #[error("The return window for this order has closed")]
    ReturnWindowClosed,
    #[error("A tracking URL is required to mark an order as shipped")]
    MissingTrackingUrl,
    #[error("A reason is required to request a return")]
    MissingReturnReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    To(OrderStatusType),
    /// The event has already been applied. Nothing changes.
    NoOp,
}

/// The parts of an order that the state machine looks at.
#[derive(Debug, Clone, Copy)]
pub struct OrderState<'a> {
    pub status: OrderStatusType,
    pub gateway_payment_id: Option<&'a str>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Order> for OrderState<'a> {
    fn from(order: &'a Order) -> Self {
        Self {
            status: order.status,
            gateway_payment_id: order.gateway_payment_id.as_deref(),
            delivered_at: order.delivered_at,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransitionRules {
    pub now: DateTime<Utc>,
    pub return_window: Duration,
}

impl TransitionRules {
    pub fn new(return_window: Duration) -> Self {
        Self { now: Utc::now(), return_window }
    }
}

pub fn transition(
    state: OrderState<'_>,
    event: &OrderEvent,
    rules: &TransitionRules,
) -> Result<Transition, TransitionError> {
    use OrderStatusType::*;
    let invalid = || TransitionError::InvalidStateTransition { from: state.status, to: event.target_status() };
    match (state.status, event) {
        (Pending, OrderEvent::MarkPaid(_)) => Ok(Transition::To(Paid)),
        (Paid, OrderEvent::MarkPaid(p)) if state.gateway_payment_id == Some(p.payment_id()) => Ok(Transition::NoOp),
        (Paid, OrderEvent::StartProcessing) => Ok(Transition::To(Processing)),
        (Processing, OrderEvent::Ship { tracking_url }) => match tracking_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(Transition::To(Shipped)),
            _ => Err(TransitionError::MissingTrackingUrl),
        },
        (Shipped, OrderEvent::Deliver) => Ok(Transition::To(Delivered)),
        (Delivered, OrderEvent::RequestReturn { reason }) => {
            if reason.trim().is_empty() {
                return Err(TransitionError::MissingReturnReason);
            }
            match state.delivered_at {
                Some(delivered) if rules.now - delivered <= rules.return_window => Ok(Transition::To(ReturnRequested)),
                _ => Err(TransitionError::ReturnWindowClosed),
            }
        },
        (ReturnRequested, OrderEvent::ApproveReturn) => Ok(Transition::To(Returned)),
        (ReturnRequested, OrderEvent::RejectReturn) => Ok(Transition::To(Delivered)),
        (Pending | Paid | Processing, OrderEvent::Cancel) => Ok(Transition::To(Cancelled)),
        (Shipped | Delivered | ReturnRequested | Returned, OrderEvent::Cancel) => {
            Err(TransitionError::CancellationWindowClosed)
        },
        _ => Err(invalid()),
    }
}
