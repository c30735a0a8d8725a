use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{
        NewRefund,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
        Paise,
        PaymentMethod,
        PaymentStatus,
        ProductId,
        Refund,
        RefundKind,
        TrackingInfo,
    },
    pricing::CouponError,
};

//--------------------------------------         Stock         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: ProductId,
    pub size: String,
    pub quantity: i64,
}

impl From<&OrderItem> for StockLine {
    fn from(item: &OrderItem) -> Self {
        Self { product_id: item.product_id.clone(), size: item.size.clone(), quantity: item.quantity }
    }
}

/// One cart line that cannot be fulfilled from current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortfall {
    pub product_id: ProductId,
    pub size: String,
    pub requested: i64,
    pub available: i64,
}

impl std::fmt::Display for StockShortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}: requested {}, available {}", self.product_id, self.size, self.requested, self.available)
    }
}

//--------------------------------------     Order queries     ---------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub user_id: Option<String>,
    #[serde(default)]
    pub statuses: Vec<OrderStatusType>,
    pub payment_method: Option<PaymentMethod>,
    pub needs_reconciliation: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl OrderQueryFilter {
    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn created_before(mut self, before: DateTime<Utc>) -> Self {
        self.created_before = Some(before);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundQueryFilter {
    pub order_id: Option<OrderId>,
    pub kind: Option<RefundKind>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

//--------------------------------------    Status changes     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub reason: String,
    pub comments: Option<String>,
}

/// A status transition that has already been approved by the state machine, to be written as a compare-and-set on
/// `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub from: OrderStatusType,
    pub to: OrderStatusType,
    pub at: DateTime<Utc>,
    pub tracking: Option<TrackingInfo>,
    pub return_request: Option<ReturnRequest>,
}

impl StatusChange {
    pub fn new(order_id: OrderId, from: OrderStatusType, to: OrderStatusType) -> Self {
        Self { order_id, from, to, at: Utc::now(), tracking: None, return_request: None }
    }

    pub fn with_tracking(mut self, tracking: TrackingInfo) -> Self {
        self.tracking = Some(tracking);
        self
    }

    pub fn with_return_request(mut self, request: ReturnRequest) -> Self {
        self.return_request = Some(request);
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }
}

//--------------------------------------   Payment commits     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSource {
    /// The shopper's browser relayed the gateway's signed callback.
    Client,
    /// The gateway called our webhook.
    Webhook,
    /// We asked the gateway directly (manual reconcile or the staleness sweep).
    Reconciliation,
}

impl std::fmt::Display for PaymentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentSource::Client => write!(f, "client callback"),
            PaymentSource::Webhook => write!(f, "webhook"),
            PaymentSource::Reconciliation => write!(f, "reconciliation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCommit {
    pub order_id: OrderId,
    pub gateway_payment_id: String,
    pub gateway_signature: Option<String>,
    /// The amount the gateway reports as captured, if it told us. The client path does not carry an amount.
    pub amount_captured: Option<Paise>,
    pub source: PaymentSource,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedPayment {
    pub order: Order,
    /// Lines that could not be decremented. Non-empty means the order is paid but flagged for manual review.
    pub stock_shortfalls: Vec<StockShortfall>,
    /// The coupon rule that no longer held when the payment was committed (usage limit reached, already used on this
    /// account, expired, ...). The discount stands, and the order is flagged.
    pub coupon_rejected: Option<CouponError>,
    pub amount_mismatch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// `pending → paid` was applied, together with its stock and coupon side effects.
    Paid(CommittedPayment),
    /// The same payment was already applied. Nothing changed.
    AlreadyPaid(Order),
    /// The order is not pending and was not paid with this payment (e.g. paid with another id, or cancelled).
    NotPending(Order),
}

//--------------------------------------      Annulments       ---------------------------------------------------------
/// Moves an order into `cancelled` or `returned`, restoring stock if it was committed and recording the refund (if any)
/// in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAnnulment {
    pub order_id: OrderId,
    pub from: OrderStatusType,
    pub to: OrderStatusType,
    pub at: DateTime<Utc>,
    pub refund: Option<NewRefund>,
    pub payment_status: Option<PaymentStatus>,
}

impl OrderAnnulment {
    pub fn new(order_id: OrderId, from: OrderStatusType, to: OrderStatusType) -> Self {
        Self { order_id, from, to, at: Utc::now(), refund: None, payment_status: None }
    }

    pub fn with_refund(mut self, refund: NewRefund, payment_status: PaymentStatus) -> Self {
        self.refund = Some(refund);
        self.payment_status = Some(payment_status);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnulledOrder {
    pub order: Order,
    pub refund: Option<Refund>,
    pub stock_restored: bool,
}
