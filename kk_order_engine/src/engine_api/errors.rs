use serde::Serialize;
use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderStatusType, Paise, ProductId},
    order_state::TransitionError,
    pricing::CouponError,
    traits::{GatewayError, StockShortfall, StoreError},
};

#[derive(Debug, Clone, Error)]
pub enum OrderEngineError {
    #[error("Not enough stock for {} line(s)", .0.len())]
    InsufficientStock(Vec<StockShortfall>),
    #[error("{0}")]
    InvalidCoupon(CouponError),
    #[error("The payment signature is invalid")]
    GatewaySignatureInvalid,
    #[error("The payment gateway did not respond in time: {0}")]
    GatewayTimeout(String),
    #[error(
        "Payment {gateway_payment_id} for gateway order {gateway_order_id} was received but could not be confirmed \
         yet. Do not retry the payment"
    )]
    PaymentAmbiguous { gateway_order_id: String, gateway_payment_id: String },
    #[error("The payment gateway rejected the request: {0}")]
    GatewayRejected(String),
    #[error("The payment gateway is misconfigured: {0}")]
    GatewayMisconfigured(String),
    #[error("Cannot move an order from {from} to {to}")]
    InvalidStateTransition { from: OrderStatusType, to: OrderStatusType },
    #[error("The order has already left the warehouse and can no longer be cancelled")]
    CancellationWindowClosed,
    #[error("The return window for this order has closed")]
    ReturnWindowClosed,
    #[error("Payment {0} has already been applied to a different order")]
    DuplicatePayment(String),
    #[error("The refund could not be issued: {0}")]
    RefundFailed(String),
    #[error("Cannot refund {requested}. Only {refundable} of the captured amount is still refundable")]
    RefundExceedsCaptured { refundable: Paise, requested: Paise },
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("This order belongs to another account")]
    NotOrderOwner,
    #[error("Product {0} does not exist or is not for sale")]
    ProductNotFound(ProductId),
    #[error("Order {0} was modified by another request. Reload it and try again")]
    ConcurrentModification(OrderId),
    #[error("{0}")]
    ValidationError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<StoreError> for OrderEngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DatabaseError(s) => Self::DatabaseError(s),
            StoreError::OrderNotFound(id) => Self::OrderNotFound(id),
            StoreError::DuplicateOrder(id) => Self::ValidationError(format!("Order {id} already exists")),
            StoreError::ProductNotFound(id) => Self::ProductNotFound(id),
            StoreError::InsufficientStock(lines) => Self::InsufficientStock(lines),
            StoreError::StatusConflict { order_id, .. } => Self::ConcurrentModification(order_id),
            StoreError::DuplicatePayment(id) => Self::DuplicatePayment(id),
            StoreError::RefundExceedsCaptured { captured, requested, .. } => {
                Self::RefundExceedsCaptured { refundable: captured, requested }
            },
            StoreError::InvalidInput(s) => Self::ValidationError(s),
        }
    }
}

impl From<GatewayError> for OrderEngineError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Timeout(s) => Self::GatewayTimeout(s),
            GatewayError::Rejected(s) => Self::GatewayRejected(s),
            GatewayError::Configuration(s) => Self::GatewayMisconfigured(s),
            GatewayError::InvalidPayload(s) => Self::ValidationError(s),
        }
    }
}

impl From<TransitionError> for OrderEngineError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::InvalidStateTransition { from, to } => Self::InvalidStateTransition { from, to },
            TransitionError::CancellationWindowClosed => Self::CancellationWindowClosed,
            TransitionError::ReturnWindowClosed => Self::ReturnWindowClosed,
            e @ (TransitionError::MissingTrackingUrl | TransitionError::MissingReturnReason) => {
                Self::ValidationError(e.to_string())
            },
        }
    }
}

impl From<CouponError> for OrderEngineError {
    fn from(e: CouponError) -> Self {
        Self::InvalidCoupon(e)
    }
}

/// The machine-readable part of an error, for clients that branch on it.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ErrorDetails {
    Stock { lines: Vec<StockShortfall> },
    Coupon { coupon: CouponError },
    Payment { gateway_order_id: String, gateway_payment_id: String },
}

impl OrderEngineError {
    pub fn details(&self) -> Option<ErrorDetails> {
        match self {
            Self::InsufficientStock(lines) => Some(ErrorDetails::Stock { lines: lines.clone() }),
            Self::InvalidCoupon(coupon) => Some(ErrorDetails::Coupon { coupon: coupon.clone() }),
            Self::PaymentAmbiguous { gateway_order_id, gateway_payment_id } => Some(ErrorDetails::Payment {
                gateway_order_id: gateway_order_id.clone(),
                gateway_payment_id: gateway_payment_id.clone(),
            }),
            _ => None,
        }
    }
}
