//! An in-memory [`PaymentGateway`] whose behaviour tests can script: capture or fail payments, make the next call
//! time out, and inspect the intents and refunds the engine asked for.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    db_types::Paise,
    helpers::{hmac_sha256_hex, verify_hmac_sha256_hex, PaymentSignature},
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

pub const MOCK_KEY_ID: &str = "rzp_test_mock";
pub const MOCK_KEY_SECRET: &str = "mock_key_secret";
pub const MOCK_WEBHOOK_SECRET: &str = "mock_webhook_secret";

#[derive(Default)]
struct GatewayState {
    intents: Vec<IntentRequest>,
    payments: HashMap<String, Vec<GatewayPayment>>,
    refunds: Vec<RefundRequest>,
    intent_error: Option<GatewayError>,
    fetch_error: Option<GatewayError>,
    refund_error: Option<GatewayError>,
}

#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().expect("mock gateway state poisoned")
    }

    /// The signature a client would relay after paying `payment_id` against `intent_id`.
    pub fn sign_payment(&self, intent_id: &str, payment_id: &str) -> String {
        PaymentSignature::sign(MOCK_KEY_SECRET, intent_id, payment_id)
    }

    pub fn sign_webhook(&self, body: &[u8]) -> String {
        hmac_sha256_hex(MOCK_WEBHOOK_SECRET.as_bytes(), body)
    }

    /// The body of a `payment.captured` webhook, in this mock's wire format.
    pub fn captured_webhook(&self, intent_id: &str, payment_id: &str, amount: Paise) -> Vec<u8> {
        let event =
            GatewayEvent::PaymentCaptured { intent_id: intent_id.into(), payment_id: payment_id.into(), amount };
        serde_json::to_vec(&event).expect("serializable event")
    }

    pub fn failed_webhook(&self, intent_id: &str, payment_id: &str, reason: &str) -> Vec<u8> {
        let event = GatewayEvent::PaymentFailed {
            intent_id: intent_id.into(),
            payment_id: payment_id.into(),
            reason: Some(reason.into()),
        };
        serde_json::to_vec(&event).expect("serializable event")
    }

    /// Records a payment attempt against an intent, as the gateway would see it.
    pub fn add_payment(&self, intent_id: &str, payment_id: &str, amount: Paise, status: GatewayPaymentStatus) {
        let payment = GatewayPayment {
            payment_id: payment_id.into(),
            intent_id: Some(intent_id.into()),
            amount,
            status,
            error: (status == GatewayPaymentStatus::Failed).then(|| "Card declined".to_string()),
        };
        self.state().payments.entry(intent_id.to_string()).or_default().push(payment);
    }

    /// The next `create_intent` call fails with `error`.
    pub fn fail_next_intent(&self, error: GatewayError) {
        self.state().intent_error = Some(error);
    }

    /// Every `fetch_payments` call fails with `error` until cleared.
    pub fn set_fetch_error(&self, error: Option<GatewayError>) {
        self.state().fetch_error = error;
    }

    /// Every `refund` call fails with `error` until cleared.
    pub fn set_refund_error(&self, error: Option<GatewayError>) {
        self.state().refund_error = error;
    }

    pub fn intents(&self) -> Vec<IntentRequest> {
        self.state().intents.clone()
    }

    pub fn refunds(&self) -> Vec<RefundRequest> {
        self.state().refunds.clone()
    }
}

impl PaymentGateway for MockGateway {
    async fn create_intent(&self, request: IntentRequest) -> Result<GatewayIntent, GatewayError> {
        let mut state = self.state();
        if let Some(e) = state.intent_error.take() {
            return Err(e);
        }
        state.intents.push(request.clone());
        let intent_id = format!("order_mock{:06}", state.intents.len());
        Ok(GatewayIntent { intent_id, amount: request.amount, currency: request.currency, key_id: MOCK_KEY_ID.into() })
    }

    fn verify_client_signature(&self, key_id: &str, intent_id: &str, payment_id: &str, signature: &str) -> bool {
        let signature = PaymentSignature { gateway_order_id: intent_id, gateway_payment_id: payment_id, signature };
        key_id == MOCK_KEY_ID && signature.verify(MOCK_KEY_SECRET)
    }

    fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        verify_hmac_sha256_hex(MOCK_WEBHOOK_SECRET.as_bytes(), raw_body, signature)
    }

    fn parse_webhook(&self, raw_body: &[u8]) -> Result<GatewayEvent, GatewayError> {
        serde_json::from_slice(raw_body).map_err(|e| GatewayError::InvalidPayload(e.to_string()))
    }

    async fn fetch_payments(&self, _key_id: &str, intent_id: &str) -> Result<Vec<GatewayPayment>, GatewayError> {
        let state = self.state();
        if let Some(e) = &state.fetch_error {
            return Err(e.clone());
        }
        Ok(state.payments.get(intent_id).cloned().unwrap_or_default())
    }

    async fn refund(&self, request: RefundRequest) -> Result<GatewayRefund, GatewayError> {
        let mut state = self.state();
        if let Some(e) = &state.refund_error {
            return Err(e.clone());
        }
        state.refunds.push(request.clone());
        Ok(GatewayRefund {
            refund_id: format!("rfnd_mock{:06}", state.refunds.len()),
            payment_id: request.payment_id,
            amount: request.amount,
            status: "processed".into(),
        })
    }
}
