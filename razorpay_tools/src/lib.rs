//! A small REST client for the parts of the Razorpay API the order service needs: orders (payment intents),
//! payments, refunds and the webhook event envelope.
//!
//! Requests are authenticated with HTTP basic auth using a key id and key secret. Several key pairs may be
//! configured; new orders rotate through them via a [`CredentialRing`], and every follow-up call for an order must
//! use the key that created it (see [`RazorpayApi::create_order`]).
mod api;
mod config;
mod credentials;
mod data_objects;
mod error;
mod retry;

pub use api::RazorpayApi;
pub use config::RazorpayConfig;
pub use credentials::{ApiCredentials, CredentialRing};
pub use data_objects::{
    NewRazorpayOrder,
    PaymentCollection,
    RazorpayOrder,
    RazorpayPayment,
    RazorpayRefund,
    WebhookEntity,
    WebhookEvent,
    WebhookPayload,
};
pub use error::RazorpayApiError;
pub use retry::RetryPolicy;
