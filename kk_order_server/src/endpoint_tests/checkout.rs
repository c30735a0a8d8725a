use actix_web::{http::StatusCode, test::TestRequest};
use kk_order_engine::{
    db_types::ProductId,
    objects::CheckoutIntent,
    test_utils::{fixtures::address, storefront::TestStore},
    StockLedger,
};
use serde_json::{json, Value};

use super::helpers::{bearer, call_store, user_token};

fn checkout_body(items: Value, coupon: Option<&str>) -> Value {
    json!({
        "items": items,
        "shipping_address": address(),
        "coupon_code": coupon,
    })
}

async fn stock(store: &TestStore, product_id: &str, size: &str) -> Option<i64> {
    store.db.stock_level(&ProductId::from(product_id), size).await.unwrap()
}

async fn create_intent(store: &TestStore, user: &str, body: Value) -> CheckoutIntent {
    let req =
        TestRequest::post().uri("/checkout/create-intent").insert_header(bearer(&user_token(user))).set_json(body);
    let res = call_store(store, req).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    serde_json::from_str(&res.body).unwrap()
}

#[actix_web::test]
async fn pay_for_a_tee_with_a_coupon() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let items = json!([{ "product_id": "P1", "size": "M", "quantity": 1 }]);
    let intent = create_intent(&store, "alice", checkout_body(items, Some("KALLKEYY100"))).await;
    assert_eq!(intent.amount.value(), 189_900);
    assert_eq!(intent.discount_amount.value(), 10_000);
    assert_eq!(intent.currency, "INR");
    assert_eq!(intent.key_id, "rzp_test_mock");
    // Nothing is taken from stock until the payment is confirmed
    assert_eq!(stock(&store, "P1", "M").await, Some(5));

    let verification = store.verification(&intent, "pay_A1");
    let req = TestRequest::post()
        .uri("/checkout/verify")
        .insert_header(bearer(&user_token("alice")))
        .set_json(&verification);
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let body = res.json();
    assert_eq!(body["already_paid"], false);
    assert_eq!(body["order"]["status"], "paid");
    assert_eq!(body["order"]["payment_status"], "completed");
    assert_eq!(body["order"]["amount"], 189_900);
    assert_eq!(body["order"]["gateway_payment_id"], "pay_A1");
    assert_eq!(stock(&store, "P1", "M").await, Some(4));

    // The client retries the callback
    let req = TestRequest::post()
        .uri("/checkout/verify")
        .insert_header(bearer(&user_token("alice")))
        .set_json(&verification);
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["already_paid"], true);
    assert_eq!(stock(&store, "P1", "M").await, Some(4));
    store.tear_down().await;
}

#[actix_web::test]
async fn forged_payment_signatures_are_rejected() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let items = json!([{ "product_id": "P1", "size": "S", "quantity": 1 }]);
    let intent = create_intent(&store, "alice", checkout_body(items, None)).await;
    let mut verification = store.verification(&intent, "pay_F1");
    verification.signature = store.gateway.sign_payment(&intent.intent_id, "pay_other");
    let req = TestRequest::post()
        .uri("/checkout/verify")
        .insert_header(bearer(&user_token("alice")))
        .set_json(&verification);
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    let order = store.order(&intent.order_id).await;
    assert_eq!(order.status.as_str(), "pending");
    assert_eq!(stock(&store, "P1", "S").await, Some(2));
    store.tear_down().await;
}

#[actix_web::test]
async fn only_the_owner_can_confirm_a_payment() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let items = json!([{ "product_id": "P1", "size": "S", "quantity": 1 }]);
    let intent = create_intent(&store, "alice", checkout_body(items, None)).await;
    let req = TestRequest::post()
        .uri("/checkout/verify")
        .insert_header(bearer(&user_token("mallory")))
        .set_json(store.verification(&intent, "pay_M1"));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    store.tear_down().await;
}

#[actix_web::test]
async fn out_of_stock_lines_are_listed() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let items = json!([
        { "product_id": "P1", "size": "M", "quantity": 1 },
        { "product_id": "P2", "size": "XL", "quantity": 1 }
    ]);
    let req = TestRequest::post()
        .uri("/checkout/create-intent")
        .insert_header(bearer(&user_token("alice")))
        .set_json(checkout_body(items, None));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::CONFLICT, "{}", res.body);
    let body = res.json();
    let lines = body["details"]["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["product_id"], "P2");
    assert_eq!(lines[0]["size"], "XL");
    assert_eq!(lines[0]["available"], 0);
    assert!(store.gateway.intents().is_empty());
    store.tear_down().await;
}

#[actix_web::test]
async fn unknown_coupons_are_unprocessable() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let items = json!([{ "product_id": "P1", "size": "M", "quantity": 1 }]);
    let req = TestRequest::post()
        .uri("/checkout/create-intent")
        .insert_header(bearer(&user_token("alice")))
        .set_json(checkout_body(items, Some("FREESTUFF")));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY, "{}", res.body);
    let body = res.json();
    assert_eq!(body["details"]["coupon"]["rule"], "not_found");
    assert_eq!(body["details"]["coupon"]["code"], "FREESTUFF");
    store.tear_down().await;
}

#[actix_web::test]
async fn clients_cannot_set_their_own_price() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let mut body = checkout_body(json!([{ "product_id": "P1", "size": "M", "quantity": 1 }]), None);
    body["amount"] = json!(100);
    let req =
        TestRequest::post().uri("/checkout/create-intent").insert_header(bearer(&user_token("alice"))).set_json(body);
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.json()["error"].as_str().unwrap().contains("amount"), "was: {}", res.body);
    store.tear_down().await;
}

#[actix_web::test]
async fn checkout_needs_a_token() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let body = checkout_body(json!([{ "product_id": "P1", "size": "M", "quantity": 1 }]), None);
    let req = TestRequest::post().uri("/checkout/create-intent").set_json(body);
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    store.tear_down().await;
}

#[actix_web::test]
async fn anyone_can_validate_a_cart() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let body = json!({ "items": [
        { "product_id": "P1", "size": "L", "quantity": 2 },
        { "product_id": "P2", "size": "M", "quantity": 1 }
    ]});
    let res = call_store(&store, TestRequest::post().uri("/cart/validate").set_json(body)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let body = res.json();
    assert_eq!(body["available"], false);
    assert_eq!(body["shortfalls"][0]["product_id"], "P1");
    assert_eq!(body["shortfalls"][0]["requested"], 2);
    assert_eq!(body["shortfalls"][0]["available"], 1);

    let body = json!({ "items": [{ "product_id": "P1", "size": "M", "quantity": 5 }] });
    let res = call_store(&store, TestRequest::post().uri("/cart/validate").set_json(body)).await;
    assert_eq!(res.json()["available"], true);
    store.tear_down().await;
}

#[actix_web::test]
async fn coupon_quotes() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let body = json!({ "code": "KALLKEYY100", "cart_total": 199_900 });
    let req = TestRequest::post().uri("/coupons/validate").insert_header(bearer(&user_token("alice"))).set_json(body);
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let body = res.json();
    assert_eq!(body["discount_amount"], 10_000);
    assert_eq!(body["final_amount"], 189_900);

    let body = json!({ "code": "NOPE", "cart_total": 199_900 });
    let req = TestRequest::post().uri("/coupons/validate").insert_header(bearer(&user_token("alice"))).set_json(body);
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    store.tear_down().await;
}

#[actix_web::test]
async fn cash_on_delivery_is_confirmed_with_a_token_payment() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let items = json!([{ "product_id": "P2", "size": "M", "quantity": 1 }]);
    let req = TestRequest::post()
        .uri("/checkout/cod/create-token-intent")
        .insert_header(bearer(&user_token("bob")))
        .set_json(checkout_body(items, None));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let intent: CheckoutIntent = serde_json::from_str(&res.body).unwrap();
    assert_eq!(intent.amount.value(), 10_000);
    assert_eq!(intent.order_amount.value(), 249_900);
    assert_eq!(intent.payment_method.to_string(), "cod");

    // An online verification cannot confirm a COD order
    let req = TestRequest::post()
        .uri("/checkout/verify")
        .insert_header(bearer(&user_token("bob")))
        .set_json(store.verification(&intent, "pay_C1"));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let req = TestRequest::post()
        .uri("/checkout/cod/verify-token")
        .insert_header(bearer(&user_token("bob")))
        .set_json(store.verification(&intent, "pay_C1"));
    let res = call_store(&store, req).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let body = res.json();
    assert_eq!(body["order"]["status"], "paid");
    assert_eq!(body["order"]["payment_method"], "cod");
    assert_eq!(body["order"]["prepaid_amount"], 10_000);
    assert_eq!(stock(&store, "P2", "M").await, Some(2));
    store.tear_down().await;
}
