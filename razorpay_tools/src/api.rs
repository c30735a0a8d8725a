use std::sync::Arc;

use kk_common::{Paise, INR_CURRENCY_CODE};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    config::RazorpayConfig,
    credentials::{ApiCredentials, CredentialRing},
    data_objects::{NewRazorpayOrder, PaymentCollection, RazorpayOrder, RazorpayPayment, RazorpayRefund},
    retry::RetryPolicy,
    RazorpayApiError,
};

#[derive(Clone)]
pub struct RazorpayApi {
    base_url: String,
    ring: CredentialRing,
    retry: RetryPolicy,
    client: Arc<Client>,
}

impl RazorpayApi {
    pub fn new(config: RazorpayConfig) -> Result<Self, RazorpayApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| RazorpayApiError::Initialization(e.to_string()))?;
        let ring = CredentialRing::new(config.credentials);
        Ok(Self { base_url: config.base_url, ring, retry: RetryPolicy::default(), client: Arc::new(client) })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn credentials(&self) -> &CredentialRing {
        &self.ring
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        credentials: &ApiCredentials,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, RazorpayApiError> {
        let url = self.url(path);
        trace!("💳️ Sending REST query: {method} {url}");
        let mut req =
            self.client.request(method, url).basic_auth(&credentials.key_id, Some(credentials.key_secret.reveal()));
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await?;
        if response.status().is_success() {
            trace!("💳️ REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| RazorpayApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await?;
            Err(RazorpayApiError::QueryError { status, message })
        }
    }

    /// Creates a gateway order (payment intent) for `amount`, signed with the next key in the ring.
    ///
    /// Returns the order together with the key id used. All later calls for this order must use that key id.
    pub async fn create_order(
        &self,
        amount: Paise,
        receipt: &str,
        notes: Value,
    ) -> Result<(RazorpayOrder, String), RazorpayApiError> {
        let credentials = self.ring.next_credentials()?;
        let body = NewRazorpayOrder {
            amount: amount.value(),
            currency: INR_CURRENCY_CODE.to_string(),
            receipt: receipt.to_string(),
            notes,
        };
        debug!("💳️ Creating gateway order for {receipt} ({amount}) with key {}", credentials.key_id);
        let order =
            self.rest_query::<RazorpayOrder, NewRazorpayOrder>(credentials, Method::POST, "/v1/orders", &[], Some(body))
                .await?;
        info!("💳️ Created gateway order {} for {receipt}", order.id);
        Ok((order, credentials.key_id.clone()))
    }

    pub async fn fetch_order(&self, key_id: &str, order_id: &str) -> Result<RazorpayOrder, RazorpayApiError> {
        let credentials = self.ring.find(key_id)?;
        let path = format!("/v1/orders/{order_id}");
        debug!("💳️ Fetching gateway order {order_id}");
        self.retry
            .run("fetch_order", || self.rest_query::<RazorpayOrder, ()>(credentials, Method::GET, &path, &[], None))
            .await
    }

    /// All payment attempts made against a gateway order, in the order the gateway returns them.
    pub async fn fetch_order_payments(
        &self,
        key_id: &str,
        order_id: &str,
    ) -> Result<Vec<RazorpayPayment>, RazorpayApiError> {
        let credentials = self.ring.find(key_id)?;
        let path = format!("/v1/orders/{order_id}/payments");
        debug!("💳️ Fetching payments for gateway order {order_id}");
        let result = self
            .retry
            .run("fetch_order_payments", || {
                self.rest_query::<PaymentCollection, ()>(credentials, Method::GET, &path, &[], None)
            })
            .await?;
        debug!("💳️ Gateway order {order_id} has {} payment attempts", result.items.len());
        Ok(result.items)
    }

    pub async fn fetch_payment(&self, key_id: &str, payment_id: &str) -> Result<RazorpayPayment, RazorpayApiError> {
        let credentials = self.ring.find(key_id)?;
        let path = format!("/v1/payments/{payment_id}");
        self.retry
            .run("fetch_payment", || self.rest_query::<RazorpayPayment, ()>(credentials, Method::GET, &path, &[], None))
            .await
    }

    /// Issues a refund of `amount` against a captured payment. `receipt` is our own refund reference.
    pub async fn create_refund(
        &self,
        key_id: &str,
        payment_id: &str,
        amount: Paise,
        receipt: &str,
    ) -> Result<RazorpayRefund, RazorpayApiError> {
        let credentials = self.ring.find(key_id)?;
        let path = format!("/v1/payments/{payment_id}/refund");
        let body = serde_json::json!({
            "amount": amount.value(),
            "speed": "normal",
            "receipt": receipt,
        });
        debug!("💸️ Requesting refund of {amount} against payment {payment_id}");
        let refund = self.rest_query::<RazorpayRefund, Value>(credentials, Method::POST, &path, &[], Some(body)).await?;
        info!("💸️ Gateway accepted refund {} ({amount}) for payment {payment_id}. Status: {}", refund.id, refund.status);
        Ok(refund)
    }
}
