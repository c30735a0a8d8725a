//! The Razorpay implementation of the engine's [`PaymentGateway`].
//!
//! Gateway "orders" are the engine's payment intents. Every call is bounded by a timeout on top of the HTTP client's
//! own per-request timeout, and the outcome of a timed-out call is reported as unknown ([`GatewayError::Timeout`]).
use std::{future::Future, time::Duration};

use kk_common::{Paise, Secret, INR_CURRENCY_CODE};
use kk_order_engine::{
    helpers::{verify_hmac_sha256_hex, PaymentSignature},
    traits::{
        GatewayError,
        GatewayEvent,
        GatewayIntent,
        GatewayPayment,
        GatewayPaymentStatus,
        GatewayRefund,
        IntentRequest,
        PaymentGateway,
        RefundRequest,
    },
};
use log::*;
use razorpay_tools::{RazorpayApi, RazorpayApiError, RazorpayPayment, WebhookEvent};
use serde_json::json;

use crate::{config::ServerConfig, errors::ServerError};

#[derive(Clone)]
pub struct RazorpayGateway {
    api: RazorpayApi,
    webhook_secret: Secret<String>,
    call_timeout: Duration,
}

impl RazorpayGateway {
    pub fn new(api: RazorpayApi, webhook_secret: Secret<String>, call_timeout: Duration) -> Self {
        Self { api, webhook_secret, call_timeout }
    }

    /// Builds the gateway from the server configuration. Idempotent reads are retried by the API client, so the
    /// bound on a whole call allows for a few attempts.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        let api = RazorpayApi::new(config.razorpay.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
        if api.credentials().is_empty() {
            warn!("💳️ No Razorpay keys are configured. Checkout will fail until KK_RAZORPAY_KEYS is set.");
        } else {
            info!("💳️ Razorpay gateway configured with {} key(s)", api.credentials().len());
        }
        let call_timeout = config.razorpay.timeout.saturating_mul(4);
        Ok(Self::new(api, config.payment_webhook_secret.clone(), call_timeout))
    }

    async fn bounded<T, F>(&self, label: &str, call: F) -> Result<T, GatewayError>
    where F: Future<Output = Result<T, RazorpayApiError>> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result.map_err(|e| {
                warn!("💳️ Gateway call {label} failed. {e}");
                to_gateway_error(e)
            }),
            Err(_) => {
                warn!("💳️ Gateway call {label} did not complete within {:?}", self.call_timeout);
                Err(GatewayError::Timeout(format!("{label} did not complete within {:?}", self.call_timeout)))
            },
        }
    }
}

impl PaymentGateway for RazorpayGateway {
    async fn create_intent(&self, request: IntentRequest) -> Result<GatewayIntent, GatewayError> {
        if request.currency != INR_CURRENCY_CODE {
            return Err(GatewayError::Configuration(format!("Only {INR_CURRENCY_CODE} is supported")));
        }
        let notes = json!(request.notes);
        let (order, key_id) =
            self.bounded("create_order", self.api.create_order(request.amount, request.receipt.as_str(), notes)).await?;
        Ok(GatewayIntent { intent_id: order.id, amount: Paise::from(order.amount), currency: order.currency, key_id })
    }

    fn verify_client_signature(&self, key_id: &str, intent_id: &str, payment_id: &str, signature: &str) -> bool {
        let Ok(credentials) = self.api.credentials().find(key_id) else {
            warn!("🔐️ Payment for {intent_id} refers to key {key_id}, which is not configured");
            return false;
        };
        let signature = PaymentSignature { gateway_order_id: intent_id, gateway_payment_id: payment_id, signature };
        signature.verify(credentials.key_secret.reveal())
    }

    fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        !self.webhook_secret.is_empty()
            && verify_hmac_sha256_hex(self.webhook_secret.reveal().as_bytes(), raw_body, signature)
    }

    fn parse_webhook(&self, raw_body: &[u8]) -> Result<GatewayEvent, GatewayError> {
        let event = serde_json::from_slice::<WebhookEvent>(raw_body)
            .map_err(|e| GatewayError::InvalidPayload(format!("Not a Razorpay webhook. {e}")))?;
        event_from_webhook(&event)
    }

    async fn fetch_payments(&self, key_id: &str, intent_id: &str) -> Result<Vec<GatewayPayment>, GatewayError> {
        let payments = self.bounded("fetch_order_payments", self.api.fetch_order_payments(key_id, intent_id)).await?;
        Ok(payments.iter().map(to_gateway_payment).collect())
    }

    async fn refund(&self, request: RefundRequest) -> Result<GatewayRefund, GatewayError> {
        let call = self.api.create_refund(&request.key_id, &request.payment_id, request.amount, &request.receipt);
        let refund = self.bounded("create_refund", call).await?;
        if refund.is_failed() {
            return Err(GatewayError::Rejected(format!("Refund {} failed at the gateway", refund.id)));
        }
        Ok(GatewayRefund {
            refund_id: refund.id,
            payment_id: refund.payment_id,
            amount: Paise::from(refund.amount),
            status: refund.status,
        })
    }
}

pub fn to_gateway_error(e: RazorpayApiError) -> GatewayError {
    if e.is_indeterminate() {
        return GatewayError::Timeout(e.to_string());
    }
    match e {
        RazorpayApiError::Initialization(_) | RazorpayApiError::NoCredentials | RazorpayApiError::UnknownKey(_) => {
            GatewayError::Configuration(e.to_string())
        },
        RazorpayApiError::QueryError { status: 401, .. } => GatewayError::Configuration(e.to_string()),
        RazorpayApiError::JsonError(_) => GatewayError::InvalidPayload(e.to_string()),
        _ => GatewayError::Rejected(e.to_string()),
    }
}

pub fn to_gateway_payment(payment: &RazorpayPayment) -> GatewayPayment {
    let status = match payment.status.as_str() {
        "captured" => GatewayPaymentStatus::Captured,
        "refunded" => GatewayPaymentStatus::Refunded,
        "authorized" => GatewayPaymentStatus::Authorized,
        "failed" => GatewayPaymentStatus::Failed,
        "created" => GatewayPaymentStatus::Created,
        other => {
            warn!("💳️ Unknown payment status '{other}' for {}", payment.id);
            if payment.is_captured() {
                GatewayPaymentStatus::Captured
            } else {
                GatewayPaymentStatus::Created
            }
        },
    };
    GatewayPayment {
        payment_id: payment.id.clone(),
        intent_id: payment.order_id.clone(),
        amount: Paise::from(payment.amount),
        status,
        error: payment.error_description.clone().or_else(|| payment.error_code.clone()),
    }
}

/// Reduces a Razorpay webhook to the events the engine acts on.
pub fn event_from_webhook(event: &WebhookEvent) -> Result<GatewayEvent, GatewayError> {
    let name = event.event.as_str();
    let payment = match (name, event.payment()) {
        ("payment.captured" | "order.paid" | "payment.failed", Some(payment)) => payment,
        ("payment.captured" | "order.paid" | "payment.failed", None) => {
            return Err(GatewayError::InvalidPayload(format!("{name} webhook without a payment entity")));
        },
        _ => return Ok(GatewayEvent::Other(name.to_string())),
    };
    let intent_id = event
        .gateway_order_id()
        .ok_or_else(|| GatewayError::InvalidPayload(format!("Payment {} is not linked to an order", payment.id)))?
        .to_string();
    let payment_id = payment.id.clone();
    if name == "payment.failed" {
        let reason = payment.error_description.clone().or_else(|| payment.error_code.clone());
        return Ok(GatewayEvent::PaymentFailed { intent_id, payment_id, reason });
    }
    if !payment.is_captured() {
        debug!("💳️ {name} for {payment_id} does not carry a captured payment yet ({})", payment.status);
        return Ok(GatewayEvent::Other(name.to_string()));
    }
    Ok(GatewayEvent::PaymentCaptured { intent_id, payment_id, amount: Paise::from(payment.amount) })
}
