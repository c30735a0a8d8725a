use actix_web::{http::header::ContentType, http::StatusCode, test::TestRequest};
use kk_order_engine::{
    db_types::{OrderStatusType, Paise, ProductId},
    objects::CheckoutIntent,
    test_utils::{
        fixtures::{cart_line, checkout_request},
        storefront::TestStore,
    },
    StockLedger,
};
use serde_json::json;

use super::helpers::{call_store, sign_shipping_update};
use crate::server::{PAYMENT_SIGNATURE_HEADER, SHIPPING_SIGNATURE_HEADER};

async fn pending_order(store: &TestStore) -> CheckoutIntent {
    store.seed_catalog().await;
    let request = checkout_request("alice", vec![cart_line("P1", "M", 1)], Some("KALLKEYY100"));
    store.checkout.create_intent(request).await.unwrap()
}

fn payment_webhook(body: &[u8], signature: &str) -> TestRequest {
    TestRequest::post()
        .uri("/webhook/payment")
        .insert_header(ContentType::json())
        .insert_header((PAYMENT_SIGNATURE_HEADER, signature.to_string()))
        .set_payload(body.to_vec())
}

fn shipping_webhook(body: &[u8], signature: &str) -> TestRequest {
    TestRequest::post()
        .uri("/webhook/shipping")
        .insert_header(ContentType::json())
        .insert_header((SHIPPING_SIGNATURE_HEADER, signature.to_string()))
        .set_payload(body.to_vec())
}

async fn medium_tees(store: &TestStore) -> Option<i64> {
    store.db.stock_level(&ProductId::from("P1"), "M").await.unwrap()
}

#[actix_web::test]
async fn captured_payments_mark_the_order_paid_once() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let intent = pending_order(&store).await;
    let body = store.gateway.captured_webhook(&intent.intent_id, "pay_W1", intent.amount);
    let signature = store.gateway.sign_webhook(&body);

    let res = call_store(&store, payment_webhook(&body, &signature)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let ack = res.json();
    assert_eq!(ack["success"], true);
    assert_eq!(ack["outcome"]["outcome"], "confirmed");
    assert_eq!(ack["outcome"]["already_paid"], false);
    assert_eq!(ack["outcome"]["order_id"], intent.order_id.as_str());
    let order = store.order(&intent.order_id).await;
    assert_eq!(order.status, OrderStatusType::Paid);
    assert_eq!(medium_tees(&store).await, Some(4));

    // Gateways deliver at least once
    let res = call_store(&store, payment_webhook(&body, &signature)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["outcome"]["already_paid"], true);
    assert_eq!(medium_tees(&store).await, Some(4));
    store.tear_down().await;
}

#[actix_web::test]
async fn the_webhook_and_the_client_callback_apply_one_payment() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let intent = pending_order(&store).await;
    let confirmed = store.pay("alice", &intent, "pay_W2").await.unwrap();
    assert!(!confirmed.already_paid);
    let body = store.gateway.captured_webhook(&intent.intent_id, "pay_W2", intent.amount);
    let signature = store.gateway.sign_webhook(&body);
    let res = call_store(&store, payment_webhook(&body, &signature)).await;
    assert_eq!(res.json()["outcome"]["already_paid"], true);
    assert_eq!(medium_tees(&store).await, Some(4));
    store.tear_down().await;
}

#[actix_web::test]
async fn unsigned_or_tampered_webhooks_are_refused() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let intent = pending_order(&store).await;
    let body = store.gateway.captured_webhook(&intent.intent_id, "pay_W3", intent.amount);
    let signature = store.gateway.sign_webhook(&body);

    let req = TestRequest::post().uri("/webhook/payment").insert_header(ContentType::json()).set_payload(body.clone());
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let cheaper = store.gateway.captured_webhook(&intent.intent_id, "pay_W3", Paise::from(100));
    let res = call_store(&store, payment_webhook(&cheaper, &signature)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = call_store(&store, payment_webhook(&body, "00ff")).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let order = store.order(&intent.order_id).await;
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(medium_tees(&store).await, Some(5));
    store.tear_down().await;
}

#[actix_web::test]
async fn failed_payments_leave_the_order_payable() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let intent = pending_order(&store).await;
    let body = store.gateway.failed_webhook(&intent.intent_id, "pay_W4", "Card declined");
    let signature = store.gateway.sign_webhook(&body);
    let res = call_store(&store, payment_webhook(&body, &signature)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let ack = res.json();
    assert_eq!(ack["outcome"]["outcome"], "payment_failed");
    assert_eq!(ack["outcome"]["payment_status"], "failed");
    let order = store.order(&intent.order_id).await;
    assert_eq!(order.status, OrderStatusType::Pending);

    // The shopper retries and succeeds
    let confirmed = store.pay("alice", &intent, "pay_W5").await.unwrap();
    assert_eq!(confirmed.order.status, OrderStatusType::Paid);
    store.tear_down().await;
}

#[actix_web::test]
async fn unknown_gateway_orders_are_acknowledged() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let body = store.gateway.captured_webhook("order_from_another_shop", "pay_X", Paise::from_rupees(500));
    let signature = store.gateway.sign_webhook(&body);
    let res = call_store(&store, payment_webhook(&body, &signature)).await;
    assert_eq!(res.status, StatusCode::OK);
    let ack = res.json();
    assert_eq!(ack["outcome"]["outcome"], "unknown_order");
    assert_eq!(ack["outcome"]["gateway_order_id"], "order_from_another_shop");
    store.tear_down().await;
}

#[actix_web::test]
async fn signed_garbage_is_acknowledged_without_effect() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let body = b"{ this is not json".to_vec();
    let signature = store.gateway.sign_webhook(&body);
    let res = call_store(&store, payment_webhook(&body, &signature)).await;
    assert_eq!(res.status, StatusCode::OK);
    let ack = res.json();
    assert_eq!(ack["success"], false);
    assert!(ack.get("outcome").is_none());
    store.tear_down().await;
}

#[actix_web::test]
async fn shipping_updates_move_the_order_along() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let intent = pending_order(&store).await;
    store.pay("alice", &intent, "pay_S1").await.unwrap();
    store.flow.start_processing(&intent.order_id).await.unwrap();

    let update = json!({
        "order_id": intent.order_id,
        "event": "shipped",
        "tracking_url": "https://track.courier.test/AWB9",
        "courier_name": "Blue Dart",
        "awb_code": "AWB9"
    });
    let body = serde_json::to_vec(&update).unwrap();
    let res = call_store(&store, shipping_webhook(&body, &sign_shipping_update(&body))).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let order = res.json();
    assert_eq!(order["status"], "shipped");
    assert_eq!(order["awb_code"], "AWB9");

    // The payment secret does not sign shipping updates
    let res = call_store(&store, shipping_webhook(&body, &store.gateway.sign_webhook(&body))).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let delivered = json!({ "order_id": intent.order_id, "event": "delivered" });
    let body = serde_json::to_vec(&delivered).unwrap();
    let res = call_store(&store, shipping_webhook(&body, &sign_shipping_update(&body))).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.json()["status"], "delivered");

    // A late "shipped" report does not undo the delivery
    let body = serde_json::to_vec(&update).unwrap();
    let res = call_store(&store, shipping_webhook(&body, &sign_shipping_update(&body))).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["status"], "delivered");
    store.tear_down().await;
}
