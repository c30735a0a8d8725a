use actix_web::{
    body::MessageBody,
    http::{header, StatusCode},
    test,
    test::TestRequest,
    web::ServiceConfig,
    App,
};
use chrono::Duration;
use kk_common::Secret;
use kk_order_engine::{
    events::EventProducers,
    helpers::hmac_sha256_hex,
    test_utils::{mock_gateway::MOCK_WEBHOOK_SECRET, storefront::TestStore},
};
use log::debug;
use serde_json::Value;

use crate::{
    auth::{Role, TokenIssuer},
    config::{AuthConfig, ServerConfig},
    server::configure_app,
};

// DO NOT re-use these secrets anywhere.
pub const TEST_JWT_SECRET: &str = "endpoint-tests-only-jwt-secret-0123456789";
pub const SHIPPING_SECRET: &str = "endpoint-tests-only-shipping-secret";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        auth: AuthConfig::new(TEST_JWT_SECRET),
        payment_webhook_secret: Secret::new(MOCK_WEBHOOK_SECRET.to_string()),
        shipping_webhook_secret: Secret::new(SHIPPING_SECRET.to_string()),
        hmac_checks: true,
        ..ServerConfig::default()
    }
}

pub fn issue_token(user_id: &str, roles: Vec<Role>) -> String {
    TokenIssuer::new(&test_config().auth).issue_token(user_id, roles, None).expect("Failed to sign token")
}

/// A token that expired well outside the validator's leeway.
pub fn expired_token(user_id: &str) -> String {
    TokenIssuer::new(&test_config().auth)
        .issue_token(user_id, vec![Role::User], Some(Duration::minutes(-10)))
        .expect("Failed to sign token")
}

pub fn user_token(user_id: &str) -> String {
    issue_token(user_id, vec![Role::User])
}

pub fn admin_token() -> String {
    issue_token("ops", vec![Role::User, Role::Admin])
}

pub fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {token}"))
}

pub fn sign_shipping_update(body: &[u8]) -> String {
    hmac_sha256_hex(SHIPPING_SECRET.as_bytes(), body)
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or_else(|e| panic!("Response is not JSON ({e}): {}", self.body))
    }
}

/// Sends `req` to a fresh app. Errors raised by middleware are rendered into responses, the way the HTTP server would.
pub async fn send<F>(configure: F, req: TestRequest) -> TestResponse
where F: FnOnce(&mut ServiceConfig) {
    let app = test::init_service(App::new().configure(configure)).await;
    let (status, body) = match test::try_call_service(&app, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            (status, test::read_body(res).await)
        },
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            (status, res.into_body().try_into_bytes().unwrap_or_default())
        },
    };
    let body = String::from_utf8_lossy(&body).into_owned();
    debug!("🚀️ Response: {status} {body}");
    TestResponse { status, body }
}

/// Wires the whole app to the store's database and mock gateway.
pub fn store_app(store: &TestStore) -> impl FnOnce(&mut ServiceConfig) {
    let db = store.db.clone();
    let gateway = store.gateway.clone();
    move |cfg| configure_app(cfg, db, gateway, EventProducers::default(), &test_config())
}

pub async fn call_store(store: &TestStore, req: TestRequest) -> TestResponse {
    send(store_app(store), req).await
}
