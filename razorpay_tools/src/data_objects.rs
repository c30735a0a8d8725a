use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST /v1/orders`. Amounts are always in paise.
#[derive(Debug, Clone, Serialize)]
pub struct NewRazorpayOrder {
    pub amount: i64,
    pub currency: String,
    /// Our own order id. Razorpay echoes it back on the order entity.
    pub receipt: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub notes: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    /// One of `created`, `attempted` or `paid`.
    pub status: String,
    #[serde(default)]
    pub attempts: i64,
    /// Razorpay sends `[]` rather than `{}` when there are no notes, so this is left untyped.
    #[serde(default)]
    pub notes: Value,
    #[serde(default)]
    pub created_at: i64,
}

impl RazorpayOrder {
    pub fn is_paid(&self) -> bool {
        self.status == "paid"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RazorpayPayment {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    /// One of `created`, `authorized`, `captured`, `refunded` or `failed`.
    pub status: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub captured: bool,
    #[serde(default)]
    pub amount_refunded: i64,
    #[serde(default)]
    pub refund_status: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub notes: Value,
    #[serde(default)]
    pub created_at: i64,
}

impl RazorpayPayment {
    /// Money has been taken from the customer. A payment that was captured and later refunded still counts.
    pub fn is_captured(&self) -> bool {
        self.captured || self.status == "captured"
    }

    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCollection {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub items: Vec<RazorpayPayment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RazorpayRefund {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    pub payment_id: String,
    /// One of `pending`, `processed` or `failed`.
    pub status: String,
    #[serde(default)]
    pub speed_processed: Option<String>,
    #[serde(default)]
    pub notes: Value,
    #[serde(default)]
    pub created_at: i64,
}

impl RazorpayRefund {
    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }
}

/// Envelope for an entity inside a webhook payload, e.g. `payload.payment.entity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEntity<T> {
    pub entity: T,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub payment: Option<WebhookEntity<RazorpayPayment>>,
    #[serde(default)]
    pub order: Option<WebhookEntity<RazorpayOrder>>,
    #[serde(default)]
    pub refund: Option<WebhookEntity<RazorpayRefund>>,
}

/// The body of a Razorpay webhook call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// e.g. `payment.captured`, `payment.failed` or `order.paid`.
    pub event: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub contains: Vec<String>,
    #[serde(default)]
    pub payload: WebhookPayload,
    #[serde(default)]
    pub created_at: i64,
}

impl WebhookEvent {
    pub fn payment(&self) -> Option<&RazorpayPayment> {
        self.payload.payment.as_ref().map(|p| &p.entity)
    }

    pub fn order(&self) -> Option<&RazorpayOrder> {
        self.payload.order.as_ref().map(|o| &o.entity)
    }

    /// The gateway order id this event refers to, taken from the payment entity if present, else the order entity.
    pub fn gateway_order_id(&self) -> Option<&str> {
        self.payment().and_then(|p| p.order_id.as_deref()).or_else(|| self.order().map(|o| o.id.as_str()))
    }
}
