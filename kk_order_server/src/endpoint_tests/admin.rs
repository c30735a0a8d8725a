use actix_web::{http::StatusCode, test::TestRequest};
use chrono::{Duration, Utc};
use kk_order_engine::{
    db_types::{OrderId, OrderStatusType, ProductId},
    test_utils::{
        fixtures::{cart_line, checkout_request},
        storefront::TestStore,
    },
    traits::GatewayPaymentStatus,
    StockLedger,
};
use serde_json::json;

use super::helpers::{admin_token, bearer, call_store, user_token};

/// Alice buys one medium tee for ₹1899 with the KALLKEYY100 coupon and pays for it.
async fn paid_tee(store: &TestStore) -> OrderId {
    store.seed_catalog().await;
    let request = checkout_request("alice", vec![cart_line("P1", "M", 1)], Some("KALLKEYY100"));
    let intent = store.checkout.create_intent(request).await.unwrap();
    store.pay("alice", &intent, "pay_T1").await.unwrap();
    intent.order_id
}

async fn medium_tees(store: &TestStore) -> Option<i64> {
    store.db.stock_level(&ProductId::from("P1"), "M").await.unwrap()
}

fn status_update(uri: &str, body: serde_json::Value) -> TestRequest {
    TestRequest::post().uri(uri).insert_header(bearer(&admin_token())).set_json(body)
}

#[actix_web::test]
async fn admins_move_orders_through_fulfilment() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let order_id = paid_tee(&store).await;
    let uri = format!("/admin/orders/{order_id}/status");

    let req = status_update(&uri, json!({ "status": "processing" }));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.json()["status"], "processing");

    let body = json!({
        "status": "shipped",
        "tracking_url": "https://track.courier.test/AWB1",
        "courier_name": "Delhivery",
        "awb_code": "AWB1"
    });
    let req = status_update(&uri, body);
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let order = res.json();
    assert_eq!(order["status"], "shipped");
    assert_eq!(order["courier_name"], "Delhivery");

    // Orders never move backwards
    let req = status_update(&uri, json!({ "status": "processing" }));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    store.tear_down().await;
}

#[actix_web::test]
async fn status_updates_cannot_cancel_or_refund() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let order_id = paid_tee(&store).await;
    let uri = format!("/admin/orders/{order_id}/status");
    for status in ["cancelled", "returned", "paid"] {
        let req = status_update(&uri, json!({ "status": status }));
        let res = call_store(&store, req).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{status}: {}", res.body);
    }
    assert_eq!(store.order(&order_id).await.status, OrderStatusType::Paid);
    store.tear_down().await;
}

#[actix_web::test]
async fn shoppers_cannot_use_admin_routes() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let order_id = paid_tee(&store).await;
    let req = TestRequest::post()
        .uri(&format!("/admin/orders/{order_id}/status"))
        .insert_header(bearer(&user_token("alice")))
        .set_json(json!({ "status": "processing" }));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    let req = TestRequest::post()
        .uri("/admin/refunds/manual")
        .insert_header(bearer(&user_token("alice")))
        .set_json(json!({ "order_id": order_id, "amount": 100, "reason": "please" }));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert!(store.gateway.refunds().is_empty());
    store.tear_down().await;
}

#[actix_web::test]
async fn wrong_size_return_is_refunded_in_full() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let order_id = paid_tee(&store).await;
    store.deliver(&order_id, Utc::now() - Duration::days(3)).await.unwrap();

    let req = TestRequest::post()
        .uri(&format!("/orders/{order_id}/return"))
        .insert_header(bearer(&user_token("alice")))
        .set_json(json!({ "reason": "Wrong Size", "comments": "Need an L" }));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let order = res.json();
    assert_eq!(order["status"], "return_requested");
    assert_eq!(order["return_reason"], "Wrong Size");

    let req = TestRequest::post()
        .uri(&format!("/admin/returns/{order_id}/decision"))
        .insert_header(bearer(&admin_token()))
        .set_json(json!({ "approve": true }));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let decision = res.json();
    assert_eq!(decision["approved"], true);
    assert_eq!(decision["order"]["status"], "returned");
    assert_eq!(decision["order"]["payment_status"], "refunded");
    assert_eq!(decision["refund"]["amount"], 189_900);
    assert_eq!(decision["refund"]["kind"], "return");

    let refunds = store.gateway.refunds();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].payment_id, "pay_T1");
    assert_eq!(refunds[0].amount.value(), 189_900);
    assert_eq!(medium_tees(&store).await, Some(5));
    store.tear_down().await;
}

#[actix_web::test]
async fn returns_close_after_the_window() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let order_id = paid_tee(&store).await;
    store.deliver(&order_id, Utc::now() - Duration::days(8)).await.unwrap();
    let req = TestRequest::post()
        .uri(&format!("/orders/{order_id}/return"))
        .insert_header(bearer(&user_token("alice")))
        .set_json(json!({ "reason": "Changed my mind" }));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::CONFLICT, "{}", res.body);
    assert_eq!(store.order(&order_id).await.status, OrderStatusType::Delivered);
    store.tear_down().await;
}

#[actix_web::test]
async fn rejected_returns_go_back_to_delivered() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let order_id = paid_tee(&store).await;
    store.deliver(&order_id, Utc::now() - Duration::days(1)).await.unwrap();
    store.refunds.request_return("alice", &order_id, "Faded colour", None).await.unwrap();
    let req = TestRequest::post()
        .uri(&format!("/admin/returns/{order_id}/decision"))
        .insert_header(bearer(&admin_token()))
        .set_json(json!({ "approve": false }));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let decision = res.json();
    assert_eq!(decision["approved"], false);
    assert_eq!(decision["order"]["status"], "delivered");
    assert!(decision["refund"].is_null());
    assert!(store.gateway.refunds().is_empty());
    store.tear_down().await;
}

#[actix_web::test]
async fn paid_orders_can_be_cancelled_without_a_body() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let order_id = paid_tee(&store).await;
    assert_eq!(medium_tees(&store).await, Some(4));
    let req = TestRequest::put().uri(&format!("/orders/{order_id}/cancel")).insert_header(bearer(&user_token("alice")));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let annulled = res.json();
    assert_eq!(annulled["order"]["status"], "cancelled");
    assert_eq!(annulled["refund"]["amount"], 189_900);
    assert_eq!(annulled["refund"]["kind"], "cancellation");
    assert_eq!(annulled["stock_restored"], true);
    assert_eq!(medium_tees(&store).await, Some(5));

    // A second cancellation is refused and refunds nothing
    let req = TestRequest::put().uri(&format!("/orders/{order_id}/cancel")).insert_header(bearer(&user_token("alice")));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::CONFLICT, "{}", res.body);
    assert_eq!(store.gateway.refunds().len(), 1);
    assert_eq!(medium_tees(&store).await, Some(5));
    store.tear_down().await;
}

#[actix_web::test]
async fn delivered_orders_cannot_be_cancelled() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let order_id = paid_tee(&store).await;
    store.deliver(&order_id, Utc::now()).await.unwrap();
    let req = TestRequest::post()
        .uri("/refunds/cancel")
        .insert_header(bearer(&admin_token()))
        .set_json(json!({ "order_id": order_id, "reason": "Customer called" }));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::CONFLICT, "{}", res.body);
    assert!(store.gateway.refunds().is_empty());
    store.tear_down().await;
}

#[actix_web::test]
async fn shoppers_cannot_cancel_other_orders() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let order_id = paid_tee(&store).await;
    let req = TestRequest::put()
        .uri(&format!("/orders/{order_id}/cancel"))
        .insert_header(bearer(&user_token("mallory")))
        .set_json(json!({ "reason": "lol" }));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(store.order(&order_id).await.status, OrderStatusType::Paid);
    store.tear_down().await;
}

#[actix_web::test]
async fn manual_refunds_are_capped_by_what_was_captured() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let order_id = paid_tee(&store).await;
    let refund = |amount: i64| {
        TestRequest::post().uri("/admin/refunds/manual").insert_header(bearer(&admin_token())).set_json(json!({
            "order_id": order_id,
            "amount": amount,
            "reason": "Late delivery goodwill"
        }))
    };
    let res = call_store(&store, refund(200_000)).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY, "{}", res.body);

    let res = call_store(&store, refund(50_000)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let body = res.json();
    assert_eq!(body["refund"]["amount"], 50_000);
    assert_eq!(body["refund"]["kind"], "manual");
    assert_eq!(body["order"]["payment_status"], "partially_refunded");
    assert_eq!(body["order"]["status"], "paid");

    // Only ₹1399 is left
    let res = call_store(&store, refund(140_000)).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    let res = call_store(&store, refund(139_900)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.json()["order"]["payment_status"], "refunded");

    let req = TestRequest::get().uri("/admin/refunds?kind=manual").insert_header(bearer(&admin_token()));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let ledger = res.json();
    let ledger = ledger.as_array().unwrap();
    assert_eq!(ledger.len(), 2);
    assert!(ledger.iter().all(|r| r["order_id"] == order_id.as_str()));

    let req = TestRequest::get().uri("/admin/refunds?kind=return").insert_header(bearer(&admin_token()));
    let res = call_store(&store, req).await;
    assert_eq!(res.body, "[]");
    store.tear_down().await;
}

#[actix_web::test]
async fn reconciliation_applies_a_payment_the_webhook_missed() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let request = checkout_request("alice", vec![cart_line("P1", "M", 1)], Some("KALLKEYY100"));
    let intent = store.checkout.create_intent(request).await.unwrap();
    store.gateway.add_payment(&intent.intent_id, "pay_R1", intent.amount, GatewayPaymentStatus::Captured);

    let uri = format!("/admin/reconcile/{}", intent.order_id);
    let res = call_store(&store, TestRequest::post().uri(&uri).insert_header(bearer(&admin_token()))).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let report = res.json();
    assert_eq!(report["finding"]["finding"], "captured");
    assert_eq!(report["finding"]["payment_id"], "pay_R1");
    assert_eq!(report["order"]["status"], "paid");
    assert_eq!(medium_tees(&store).await, Some(4));

    let res = call_store(&store, TestRequest::post().uri(&uri).insert_header(bearer(&admin_token()))).await;
    assert_eq!(res.json()["finding"]["finding"], "not_pending");
    store.tear_down().await;
}
