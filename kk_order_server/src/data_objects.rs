//! Request and response bodies of the HTTP API.
//!
//! Every request body rejects unknown fields. Types the engine already defines (cart lines, payment verification,
//! shipping updates, manual refunds) are used directly.
use std::fmt::Display;

use chrono::{DateTime, Utc};
use kk_order_engine::{
    db_types::{OrderId, OrderStatusType, Paise, PaymentMethod, RefundKind, ShippingAddress, TrackingInfo},
    objects::{CartLine, CheckoutRequest, WebhookOutcome},
    traits::{OrderQueryFilter, RefundQueryFilter},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CANCELLATION_REASON: &str = "Cancelled by customer";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// The body returned to the payment gateway. It is always sent with a 2xx status once the signature is valid, so
/// business rejections are reported here rather than through the status code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<WebhookOutcome>,
}

impl WebhookAck {
    pub fn accepted(outcome: WebhookOutcome) -> Self {
        Self { success: true, message: "Webhook processed".into(), outcome: Some(outcome) }
    }

    pub fn rejected<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string(), outcome: None }
    }
}

//--------------------------------------      Cart & coupons       -----------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CartValidationRequest {
    pub items: Vec<CartLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CouponValidationRequest {
    pub code: String,
    /// In paise.
    pub cart_total: Paise,
}

//--------------------------------------         Checkout          -----------------------------------------------------
/// The checkout body. The user comes from the access token, never from the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutBody {
    pub items: Vec<CartLine>,
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub receipt: Option<String>,
}

impl CheckoutBody {
    pub fn into_request<S: Into<String>>(self, user_id: S) -> CheckoutRequest {
        CheckoutRequest {
            user_id: user_id.into(),
            items: self.items,
            shipping_address: self.shipping_address,
            coupon_code: self.coupon_code.filter(|c| !c.trim().is_empty()),
            receipt: self.receipt,
        }
    }
}

//--------------------------------------  Cancellations & returns  -----------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelOrderBody {
    #[serde(default)]
    pub reason: Option<String>,
}

impl CancelOrderBody {
    pub fn reason(&self) -> &str {
        non_empty_reason(self.reason.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefundCancelRequest {
    pub order_id: OrderId,
    #[serde(default)]
    pub reason: Option<String>,
}

impl RefundCancelRequest {
    pub fn reason(&self) -> &str {
        non_empty_reason(self.reason.as_deref())
    }
}

fn non_empty_reason(reason: Option<&str>) -> &str {
    reason.map(str::trim).filter(|r| !r.is_empty()).unwrap_or(DEFAULT_CANCELLATION_REASON)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReturnRequestBody {
    pub reason: String,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReturnDecisionRequest {
    pub approve: bool,
}

//--------------------------------------           Admin           -----------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusUpdateRequest {
    pub status: OrderStatusType,
    #[serde(default)]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub courier_name: Option<String>,
    #[serde(default)]
    pub awb_code: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<String>,
}

impl StatusUpdateRequest {
    pub fn tracking(&self) -> TrackingInfo {
        TrackingInfo {
            tracking_url: self.tracking_url.clone(),
            courier_name: self.courier_name.clone(),
            awb_code: self.awb_code.clone(),
            estimated_delivery: self.estimated_delivery.clone(),
        }
    }
}

/// Query string of the admin order search, e.g. `?status=pending&needs_reconciliation=true`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderSearchQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status: Option<OrderStatusType>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub needs_reconciliation: Option<bool>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl From<OrderSearchQuery> for OrderQueryFilter {
    fn from(q: OrderSearchQuery) -> Self {
        OrderQueryFilter {
            user_id: q.user_id,
            statuses: q.status.into_iter().collect(),
            payment_method: q.payment_method,
            needs_reconciliation: q.needs_reconciliation,
            created_after: q.since,
            created_before: q.until,
            limit: q.limit,
        }
    }
}

/// Query string of the refund ledger, e.g. `?kind=return&since=2024-06-01T00:00:00Z`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefundLedgerQuery {
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub kind: Option<RefundKind>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

impl From<RefundLedgerQuery> for RefundQueryFilter {
    fn from(q: RefundLedgerQuery) -> Self {
        RefundQueryFilter { order_id: q.order_id, kind: q.kind, since: q.since, until: q.until }
    }
}
