use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{OrderId, Paise};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The gateway did not answer in time, or the connection failed mid-request. The outcome is unknown: the request
    /// may or may not have been acted upon.
    #[error("Gateway outcome unknown: {0}")]
    Timeout(String),
    /// The gateway explicitly refused the request.
    #[error("Gateway rejected the request: {0}")]
    Rejected(String),
    #[error("Gateway is misconfigured: {0}")]
    Configuration(String),
    #[error("Could not understand the gateway payload: {0}")]
    InvalidPayload(String),
}

impl GatewayError {
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRequest {
    pub amount: Paise,
    pub currency: String,
    /// Our order id, used by the gateway as its receipt reference.
    pub receipt: OrderId,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
}

/// A payment intent (a gateway-side order) the client can pay against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayIntent {
    pub intent_id: String,
    pub amount: Paise,
    pub currency: String,
    /// The API key the intent was created with. Verification and refunds for this intent must use the same key.
    pub key_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    Created,
    Authorized,
    Captured,
    Refunded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub payment_id: String,
    pub intent_id: Option<String>,
    pub amount: Paise,
    pub status: GatewayPaymentStatus,
    pub error: Option<String>,
}

impl GatewayPayment {
    /// Captured, including payments that were captured and later refunded.
    pub fn is_captured(&self) -> bool {
        matches!(self.status, GatewayPaymentStatus::Captured | GatewayPaymentStatus::Refunded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub key_id: String,
    pub payment_id: String,
    pub amount: Paise,
    /// Our reference for the refund.
    pub receipt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub refund_id: String,
    pub payment_id: String,
    pub amount: Paise,
    pub status: String,
}

/// A webhook notification, reduced to the cases the order engine acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayEvent {
    PaymentCaptured { intent_id: String, payment_id: String, amount: Paise },
    PaymentFailed { intent_id: String, payment_id: String, reason: Option<String> },
    /// Any event the engine does not act on, by name.
    Other(String),
}

/// The boundary to the payment provider.
///
/// Implementations bound every network call with a timeout and report it as [`GatewayError::Timeout`]. Only
/// [`GatewayError::Rejected`] is an explicit negative; callers never mark anything failed on a timeout.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway: Clone {
    async fn create_intent(&self, request: IntentRequest) -> Result<GatewayIntent, GatewayError>;

    /// Checks the signature the client relays after paying. `key_id` selects the secret the intent was created with.
    fn verify_client_signature(&self, key_id: &str, intent_id: &str, payment_id: &str, signature: &str) -> bool;

    /// Checks a webhook signature against the exact raw request body.
    fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool;

    /// Parses a (verified) webhook body.
    fn parse_webhook(&self, raw_body: &[u8]) -> Result<GatewayEvent, GatewayError>;

    /// Every payment attempt against an intent.
    async fn fetch_payments(&self, key_id: &str, intent_id: &str) -> Result<Vec<GatewayPayment>, GatewayError>;

    async fn refund(&self, request: RefundRequest) -> Result<GatewayRefund, GatewayError>;
}
