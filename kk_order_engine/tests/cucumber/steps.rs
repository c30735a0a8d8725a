use std::str::FromStr;

use chrono::{Duration, Utc};
use cucumber::{given, then, when};
use futures_util::future::join_all;
use kk_order_engine::{
    db_types::{NewCoupon, OrderStatusType, Paise, ProductId, TrackingInfo},
    objects::{Requester, WebhookOutcome},
    test_utils::{
        fixtures::{cart_line, checkout_request},
        storefront::TestStore,
    },
    traits::RefundQueryFilter,
    CouponManagement,
    OrderEngineError,
    StockLedger,
};

use crate::cucumber::StoreWorld;

#[given("a store with the standard catalog")]
async fn open_store(world: &mut StoreWorld) {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    world.store = Some(store);
}

#[given(expr = "coupon {word} worth {int} rupees limited to {int} use(s)")]
async fn limited_coupon(world: &mut StoreWorld, code: String, rupees: i64, limit: i64) {
    let coupon = NewCoupon::fixed(code, Paise::from_rupees(rupees)).with_usage_limit(limit);
    world.store().coupons.upsert_coupon(coupon).await.expect("Error creating coupon");
}

async fn start_checkout(world: &mut StoreWorld, user: &str, name: &str, line: (String, String, i64), code: Option<&str>) {
    let (product, size, quantity) = line;
    let request = checkout_request(user, vec![cart_line(&product, &size, quantity)], code);
    let result = world.store().checkout.create_intent(request).await;
    if let Some(intent) = world.record(result) {
        world.intents.insert(name.to_string(), intent);
    }
}

#[when(expr = "{word} starts checkout {string} for {int} x {word} size {word}")]
async fn checkout_without_coupon(
    world: &mut StoreWorld,
    user: String,
    name: String,
    quantity: i64,
    product: String,
    size: String,
) {
    start_checkout(world, &user, &name, (product, size, quantity), None).await;
}

#[when(expr = "{word} starts checkout {string} for {int} x {word} size {word} with coupon {word}")]
async fn checkout_with_coupon(
    world: &mut StoreWorld,
    user: String,
    name: String,
    quantity: i64,
    product: String,
    size: String,
    code: String,
) {
    start_checkout(world, &user, &name, (product, size, quantity), Some(&code)).await;
}

#[when(expr = "{word} pays checkout {string} with payment {word}")]
async fn pay(world: &mut StoreWorld, user: String, name: String, payment_id: String) {
    let result = world.store().pay(&user, world.intent(&name), &payment_id).await;
    let confirmed = world.record(result);
    world.already_paid = confirmed.map(|c| c.already_paid);
}

#[given(expr = "{word} has paid checkout {string} for {int} x {word} size {word} with coupon {word}")]
async fn paid_checkout(
    world: &mut StoreWorld,
    user: String,
    name: String,
    quantity: i64,
    product: String,
    size: String,
    code: String,
) {
    start_checkout(world, &user, &name, (product, size, quantity), Some(&code)).await;
    let payment_id = format!("pay_{name}");
    pay(world, user, name, payment_id).await;
    assert!(world.last_error.is_none(), "Payment failed: {:?}", world.last_error);
}

#[when(expr = "the gateway sends a captured webhook for checkout {string} with payment {word}")]
async fn captured_webhook(world: &mut StoreWorld, name: String, payment_id: String) {
    let store = world.store();
    let intent = world.intent(&name);
    let body = store.gateway.captured_webhook(&intent.intent_id, &payment_id, intent.amount);
    let result = store.reconciliation.handle_payment_webhook(&body).await;
    world.already_paid = match world.record(result) {
        Some(WebhookOutcome::Confirmed { already_paid, .. }) => Some(already_paid),
        _ => None,
    };
}

#[given(expr = "order {string} was delivered {int} days ago")]
async fn delivered(world: &mut StoreWorld, name: String, days: i64) {
    let order_id = world.order_id(&name);
    world.store().deliver(&order_id, Utc::now() - Duration::days(days)).await.expect("Error delivering order");
}

#[given(expr = "order {string} has shipped")]
async fn shipped(world: &mut StoreWorld, name: String) {
    let order_id = world.order_id(&name);
    let store = world.store();
    store.flow.start_processing(&order_id).await.expect("Error processing order");
    let tracking =
        TrackingInfo { tracking_url: Some(format!("https://track.courier.test/{order_id}")), ..Default::default() };
    store.flow.ship(&order_id, tracking).await.expect("Error shipping order");
}

#[when(expr = "{word} requests a return of order {string} because {string}")]
async fn request_return(world: &mut StoreWorld, user: String, name: String, reason: String) {
    let order_id = world.order_id(&name);
    let result = world.store().refunds.request_return(&user, &order_id, &reason, None).await;
    world.record(result);
}

#[when(expr = "the return for order {string} is {word}")]
async fn decide_return(world: &mut StoreWorld, name: String, decision: String) {
    let order_id = world.order_id(&name);
    let approve = match decision.as_str() {
        "approved" => true,
        "rejected" => false,
        other => panic!("Unknown return decision: {other}"),
    };
    let result = world.store().refunds.decide_return(&order_id, approve).await;
    world.record(result);
}

#[when(expr = "{word} cancels order {string}")]
async fn cancel(world: &mut StoreWorld, user: String, name: String) {
    let order_id = world.order_id(&name);
    let result = world.store().refunds.process_order_cancellation(&Requester::user(user), &order_id, "").await;
    world.record(result);
}

#[when(expr = "{int} buyers try to take the last unit of {word} size {word} at once")]
async fn race_for_stock(world: &mut StoreWorld, buyers: usize, product: String, size: String) {
    let product = ProductId::from(product.as_str());
    let attempts = (0..buyers).map(|_| {
        let db = world.store().db.clone();
        let product = product.clone();
        let size = size.clone();
        tokio::spawn(async move { db.decrement_stock(&product, &size, 1).await })
    });
    let results = join_all(attempts).await;
    world.winners = Some(results.iter().filter(|r| matches!(r, Ok(Ok(())))).count());
}

#[then(expr = "exactly {int} of them succeed(s)")]
async fn check_winners(world: &mut StoreWorld, expected: usize) {
    assert_eq!(world.winners, Some(expected));
}

#[then(expr = "checkout {string} asks for {int} rupees")]
async fn check_intent_amount(world: &mut StoreWorld, name: String, rupees: i64) {
    assert_eq!(world.intent(&name).amount, Paise::from_rupees(rupees));
}

#[then(expr = "order {string} is {word}")]
async fn check_status(world: &mut StoreWorld, name: String, status: String) {
    let expected = OrderStatusType::from_str(&status).expect("Not a valid order status");
    let order = world.order(&name).await;
    assert_eq!(order.status, expected);
    assert!(order.amount_is_consistent(), "Order amount does not add up: {order:?}");
}

#[then(expr = "the stock of {word} size {word} is {int}")]
async fn check_stock(world: &mut StoreWorld, product: String, size: String, quantity: i64) {
    let level = world.store().db.stock_level(&ProductId::from(product.as_str()), &size).await.expect("Stock query");
    assert_eq!(level, Some(quantity));
}

#[then(expr = "coupon {word} has been used {int} time(s)")]
async fn check_coupon_usage(world: &mut StoreWorld, code: String, count: i64) {
    let coupon = world.store().db.fetch_coupon(&code).await.expect("Coupon query").expect("Coupon does not exist");
    assert_eq!(coupon.used_count, count);
}

#[then("the payment was already applied")]
async fn check_already_paid(world: &mut StoreWorld) {
    assert!(world.last_error.is_none(), "Unexpected error: {:?}", world.last_error);
    assert_eq!(world.already_paid, Some(true));
}

#[then(expr = "the request fails because {string}")]
async fn check_error(world: &mut StoreWorld, reason: String) {
    let err = world.last_error.as_ref().expect("The last request succeeded");
    let matched = match reason.as_str() {
        "the cancellation window has closed" => matches!(err, OrderEngineError::CancellationWindowClosed),
        "the return window has closed" => matches!(err, OrderEngineError::ReturnWindowClosed),
        "the coupon is invalid" => matches!(err, OrderEngineError::InvalidCoupon(_)),
        "there is not enough stock" => matches!(err, OrderEngineError::InsufficientStock(_)),
        other => panic!("Unknown failure reason: {other}"),
    };
    assert!(matched, "Expected failure '{reason}', got {err:?}");
}

#[then(expr = "a refund of {int} rupees was issued for order {string}")]
async fn check_refund(world: &mut StoreWorld, rupees: i64, name: String) {
    let filter = RefundQueryFilter { order_id: Some(world.order_id(&name)), ..Default::default() };
    let refunds = world.store().refunds.refunds(filter).await.expect("Refund query");
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, Paise::from_rupees(rupees));
    let issued = world.store().gateway.refunds();
    assert!(issued.iter().any(|r| r.amount == Paise::from_rupees(rupees)));
}

#[then("no refund was issued")]
async fn check_no_refund(world: &mut StoreWorld) {
    assert!(world.store().gateway.refunds().is_empty());
}
