//! Request and result types of the engine APIs.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{
        Order,
        OrderId,
        OrderStatusType,
        Paise,
        PaymentMethod,
        PaymentStatus,
        ProductId,
        Refund,
        ShippingAddress,
    },
    traits::{GatewayPaymentStatus, StockLine, StockShortfall},
};

//--------------------------------------       Requester       ---------------------------------------------------------
/// Who is asking. Owners may act on their own orders; admins on any order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: String,
    pub is_admin: bool,
}

impl Requester {
    pub fn user<S: Into<String>>(user_id: S) -> Self {
        Self { user_id: user_id.into(), is_admin: false }
    }

    pub fn admin<S: Into<String>>(user_id: S) -> Self {
        Self { user_id: user_id.into(), is_admin: true }
    }

    pub fn may_access(&self, order: &Order) -> bool {
        self.is_admin || order.is_owned_by(&self.user_id)
    }
}

//--------------------------------------       Checkout        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CartLine {
    pub product_id: ProductId,
    pub size: String,
    pub quantity: i64,
}

impl From<&CartLine> for StockLine {
    fn from(line: &CartLine) -> Self {
        Self { product_id: line.product_id.clone(), size: line.size.clone(), quantity: line.quantity }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub items: Vec<CartLine>,
    pub shipping_address: ShippingAddress,
    pub coupon_code: Option<String>,
    /// Client-chosen idempotency key. It becomes the order id. A retry with the same receipt gets the same intent.
    pub receipt: Option<String>,
}

/// What the client needs to open the gateway's payment widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutIntent {
    pub order_id: OrderId,
    pub intent_id: String,
    /// The amount the intent is for. For COD this is the confirmation token.
    pub amount: Paise,
    /// The full order amount.
    pub order_amount: Paise,
    pub discount_amount: Paise,
    pub currency: String,
    pub key_id: String,
    pub payment_method: PaymentMethod,
    /// True if an earlier request with the same receipt already created this intent.
    pub reused: bool,
}

impl CheckoutIntent {
    pub fn for_order(order: &Order, reused: bool) -> Self {
        Self {
            order_id: order.order_id.clone(),
            intent_id: order.gateway_order_id.clone().unwrap_or_default(),
            amount: order.prepaid_amount,
            order_amount: order.amount,
            discount_amount: order.discount_amount,
            currency: order.currency.clone(),
            key_id: order.gateway_key_id.clone().unwrap_or_default(),
            payment_method: order.payment_method,
            reused,
        }
    }
}

/// The signed callback the client relays after paying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentVerification {
    pub order_id: OrderId,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedPayment {
    pub order: Order,
    /// The payment had already been applied, by this or the other confirmation channel.
    pub already_paid: bool,
}

impl ConfirmedPayment {
    pub fn needs_reconciliation(&self) -> bool {
        self.order.needs_reconciliation
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartValidation {
    pub available: bool,
    pub shortfalls: Vec<StockShortfall>,
}

//--------------------------------------    Reconciliation     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Confirmed { order_id: OrderId, already_paid: bool },
    PaymentFailed { order_id: OrderId, payment_status: PaymentStatus },
    /// The event refers to a gateway order we do not know about.
    UnknownOrder { gateway_order_id: String },
    Ignored { event: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "finding", rename_all = "snake_case")]
pub enum ReconcileFinding {
    /// A captured payment was found and applied to the order.
    Captured { payment_id: String, already_paid: bool },
    /// The gateway has no captured payment for this order.
    NotCaptured { attempts: Vec<GatewayPaymentStatus> },
    /// The order is past `pending`. There is nothing to reconcile.
    NotPending { status: OrderStatusType },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub order_id: OrderId,
    pub finding: ReconcileFinding,
    pub order: Order,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub confirmed: Vec<OrderId>,
    pub cancelled: Vec<OrderId>,
    /// Orders whose state is unknown because the gateway or the database could not be reached.
    pub skipped: Vec<OrderId>,
}

//--------------------------------------       Shipping        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingEvent {
    Shipped,
    InTransit,
    Delivered,
}

/// A status report from the shipping partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShippingUpdate {
    pub order_id: OrderId,
    pub event: ShippingEvent,
    #[serde(default)]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub courier_name: Option<String>,
    #[serde(default)]
    pub awb_code: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<String>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
}

//--------------------------------------        Refunds        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnDecision {
    pub order: Order,
    pub approved: bool,
    pub refund: Option<Refund>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManualRefundRequest {
    pub order_id: OrderId,
    pub amount: Paise,
    pub reason: String,
}
