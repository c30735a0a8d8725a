use chrono::Utc;
use kk_order_engine::{
    db_types::{CouponRules, NewCoupon, OrderStatusType, Paise, PaymentMethod, PaymentStatus, ProductId},
    events::EventProducers,
    pricing::CouponError,
    test_utils::{
        fixtures::{cart_line, checkout_request},
        storefront::TestStore,
    },
    traits::{GatewayError, OrderQueryFilter},
    CouponManagement,
    EngineConfig,
    OrderEngineError,
    OrderManagement,
    StockLedger,
};

async fn stock(store: &TestStore, product: &str, size: &str) -> i64 {
    store.db.stock_level(&ProductId::from(product), size).await.unwrap().unwrap()
}

async fn used_count(store: &TestStore, code: &str) -> i64 {
    store.db.fetch_coupon(code).await.unwrap().unwrap().used_count
}

#[tokio::test]
async fn fixed_coupon_checkout_is_paid_and_commits_stock() {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let request = checkout_request("alice", vec![cart_line("P1", "M", 1)], Some("kallkeyy100"));
    let intent = store.checkout.create_intent(request).await.unwrap();
    assert_eq!(intent.amount, Paise::from_rupees(1899));
    assert_eq!(intent.discount_amount, Paise::from_rupees(100));
    assert_eq!(intent.payment_method, PaymentMethod::Razorpay);
    assert!(!intent.reused);
    assert_eq!(store.gateway.intents()[0].amount, Paise::from_rupees(1899));

    let pending = store.order(&intent.order_id).await;
    assert_eq!(pending.status, OrderStatusType::Pending);
    assert_eq!(pending.coupon_code.as_deref(), Some("KALLKEYY100"));
    assert!(pending.amount_is_consistent());
    // Nothing is reserved before payment
    assert_eq!(stock(&store, "P1", "M").await, 5);

    let confirmed = store.pay("alice", &intent, "pay_001").await.unwrap();
    assert!(!confirmed.already_paid);
    let order = confirmed.order;
    assert_eq!(order.status, OrderStatusType::Paid);
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.gateway_payment_id.as_deref(), Some("pay_001"));
    assert!(order.stock_committed);
    assert!(!order.needs_reconciliation);
    assert!(order.paid_at.is_some());
    assert!(order.amount_is_consistent());
    assert_eq!(order.amount, Paise::from_rupees(1899));
    assert_eq!(stock(&store, "P1", "M").await, 4);
    assert_eq!(used_count(&store, "KALLKEYY100").await, 1);
    store.tear_down().await;
}

#[tokio::test]
async fn repeated_confirmations_apply_the_payment_once() {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let request = checkout_request("alice", vec![cart_line("P1", "M", 2)], Some("KALLKEYY100"));
    let intent = store.checkout.create_intent(request).await.unwrap();

    let first = store.pay("alice", &intent, "pay_002").await.unwrap();
    assert!(!first.already_paid);
    let second = store.pay("alice", &intent, "pay_002").await.unwrap();
    assert!(second.already_paid);
    store.capture_via_webhook(&intent, "pay_002").await.unwrap();

    assert_eq!(stock(&store, "P1", "M").await, 3);
    assert_eq!(used_count(&store, "KALLKEYY100").await, 1);
    let order = store.order(&intent.order_id).await;
    assert_eq!(order.status, OrderStatusType::Paid);
    assert!(order.amount_is_consistent());
    store.tear_down().await;
}

#[tokio::test]
async fn webhook_may_arrive_before_the_client_callback() {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let intent =
        store.checkout.create_intent(checkout_request("bob", vec![cart_line("P2", "M", 1)], None)).await.unwrap();
    store.capture_via_webhook(&intent, "pay_003").await.unwrap();
    let order = store.order(&intent.order_id).await;
    assert_eq!(order.status, OrderStatusType::Paid);
    assert_eq!(stock(&store, "P2", "M").await, 2);

    let late = store.pay("bob", &intent, "pay_003").await.unwrap();
    assert!(late.already_paid);
    assert_eq!(stock(&store, "P2", "M").await, 2);
    store.tear_down().await;
}

#[tokio::test]
async fn shortfalls_are_itemised() {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let lines = vec![cart_line("P1", "L", 2), cart_line("P1", "M", 1), cart_line("P2", "XL", 1)];
    let validation = store.checkout.validate_cart(&lines).await.unwrap();
    assert!(!validation.available);
    assert_eq!(validation.shortfalls.len(), 2);

    let err = store.checkout.create_intent(checkout_request("alice", lines, None)).await.unwrap_err();
    let OrderEngineError::InsufficientStock(shortfalls) = err else {
        panic!("Expected InsufficientStock, got {err:?}");
    };
    assert_eq!(shortfalls[0].product_id.as_str(), "P1");
    assert_eq!(shortfalls[0].size, "L");
    assert_eq!(shortfalls[0].requested, 2);
    assert_eq!(shortfalls[0].available, 1);
    assert_eq!(shortfalls[1].product_id.as_str(), "P2");
    assert_eq!(shortfalls[1].available, 0);
    assert!(store.gateway.intents().is_empty());
    store.tear_down().await;
}

#[tokio::test]
async fn exhausted_coupons_are_rejected_even_after_an_earlier_quote() {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let coupon = NewCoupon::fixed("LAUNCH1", Paise::from_rupees(200)).with_usage_limit(1);
    store.coupons.upsert_coupon(coupon).await.unwrap();

    let quote = store.coupons.validate("launch1", Paise::from_rupees(1999), "alice").await.unwrap();
    assert_eq!(quote.final_amount, Paise::from_rupees(1799));

    let bob = store
        .checkout
        .create_intent(checkout_request("bob", vec![cart_line("P1", "M", 1)], Some("LAUNCH1")))
        .await
        .unwrap();
    store.pay("bob", &bob, "pay_bob").await.unwrap();
    assert_eq!(used_count(&store, "LAUNCH1").await, 1);

    let err = store
        .checkout
        .create_intent(checkout_request("alice", vec![cart_line("P1", "M", 1)], Some("LAUNCH1")))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderEngineError::InvalidCoupon(CouponError::UsageLimitReached { .. })), "{err:?}");
    store.tear_down().await;
}

#[tokio::test]
async fn coupon_exhausted_between_quote_and_payment_keeps_the_discount_and_flags() {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    store.coupons.upsert_coupon(NewCoupon::fixed("LAUNCH1", Paise::from_rupees(200)).with_usage_limit(1)).await.unwrap();
    let alice = store
        .checkout
        .create_intent(checkout_request("alice", vec![cart_line("P1", "M", 1)], Some("LAUNCH1")))
        .await
        .unwrap();
    let bob = store
        .checkout
        .create_intent(checkout_request("bob", vec![cart_line("P1", "S", 1)], Some("LAUNCH1")))
        .await
        .unwrap();
    store.pay("alice", &alice, "pay_a").await.unwrap();
    let late = store.pay("bob", &bob, "pay_b").await.unwrap();
    assert_eq!(late.order.status, OrderStatusType::Paid);
    assert_eq!(late.order.discount_amount, Paise::from_rupees(200));
    assert!(late.needs_reconciliation());
    assert!(late.order.reconciliation_note.unwrap().contains("LAUNCH1"));
    assert_eq!(used_count(&store, "LAUNCH1").await, 1);
    store.tear_down().await;
}

#[tokio::test]
async fn account_rules_are_enforced() {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let rules = CouponRules { first_time_purchase_only: true, once_per_account: true, apply_to_shipping: false };
    store.coupons.upsert_coupon(NewCoupon::percentage("WELCOME10", 10).with_rules(rules)).await.unwrap();
    let quote = store.coupons.validate("WELCOME10", Paise::from_rupees(1999), "carol").await.unwrap();
    assert_eq!(quote.discount_amount, Paise::from(19_990));

    let intent = store
        .checkout
        .create_intent(checkout_request("carol", vec![cart_line("P1", "M", 1)], Some("WELCOME10")))
        .await
        .unwrap();
    store.pay("carol", &intent, "pay_c").await.unwrap();
    let err = store.coupons.validate("WELCOME10", Paise::from_rupees(1999), "carol").await.unwrap_err();
    assert!(matches!(err, OrderEngineError::InvalidCoupon(CouponError::AlreadyUsed { .. })), "{err:?}");
    let err = store.coupons.validate("NOPE", Paise::from_rupees(1999), "carol").await.unwrap_err();
    assert!(matches!(err, OrderEngineError::InvalidCoupon(CouponError::NotFound { .. })), "{err:?}");
    store.tear_down().await;
}

#[tokio::test]
async fn invalid_signatures_leave_the_order_pending() {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let intent =
        store.checkout.create_intent(checkout_request("alice", vec![cart_line("P1", "M", 1)], None)).await.unwrap();
    let mut verification = store.verification(&intent, "pay_004");
    verification.signature = store.gateway.sign_payment(&intent.intent_id, "pay_other");
    let err = store.checkout.verify_payment("alice", verification).await.unwrap_err();
    assert!(matches!(err, OrderEngineError::GatewaySignatureInvalid));

    let err = store.pay("mallory", &intent, "pay_004").await.unwrap_err();
    assert!(matches!(err, OrderEngineError::NotOrderOwner));

    let order = store.order(&intent.order_id).await;
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(stock(&store, "P1", "M").await, 5);
    store.tear_down().await;
}

#[tokio::test]
async fn retries_with_the_same_receipt_reuse_the_intent() {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let mut request = checkout_request("alice", vec![cart_line("P1", "M", 1)], None);
    request.receipt = Some("rcpt_alice_0001".into());
    let first = store.checkout.create_intent(request.clone()).await.unwrap();
    let second = store.checkout.create_intent(request.clone()).await.unwrap();
    assert_eq!(first.order_id.as_str(), "rcpt_alice_0001");
    assert_eq!(first.intent_id, second.intent_id);
    assert!(second.reused);
    assert_eq!(store.gateway.intents().len(), 1);

    request.user_id = "bob".into();
    let err = store.checkout.create_intent(request).await.unwrap_err();
    assert!(matches!(err, OrderEngineError::ValidationError(_)), "{err:?}");
    store.tear_down().await;
}

#[tokio::test]
async fn gateway_timeouts_do_not_create_orders() {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    store.gateway.fail_next_intent(GatewayError::Timeout("no answer after 10s".into()));
    let err = store
        .checkout
        .create_intent(checkout_request("alice", vec![cart_line("P1", "M", 1)], None))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderEngineError::GatewayTimeout(_)), "{err:?}");
    let orders = store.db.search_orders(OrderQueryFilter::default().with_user_id("alice")).await.unwrap();
    assert!(orders.is_empty());
    store.tear_down().await;
}

#[tokio::test]
async fn cod_orders_take_a_token_online() {
    let config = EngineConfig { cod_surcharge: Paise::from_rupees(50), ..Default::default() };
    let store = TestStore::with_config(config, EventProducers::default()).await;
    store.seed_catalog().await;
    let request = checkout_request("dev", vec![cart_line("P2", "M", 1)], None);
    let intent = store.checkout.create_cod_token_intent(request).await.unwrap();
    assert_eq!(intent.amount, Paise::from_rupees(100));
    assert_eq!(intent.order_amount, Paise::from_rupees(2549));
    assert_eq!(intent.payment_method, PaymentMethod::Cod);

    // The online callback cannot be used for a COD order
    let err = store.pay("dev", &intent, "pay_cod").await.unwrap_err();
    assert!(matches!(err, OrderEngineError::ValidationError(_)));

    let confirmed = store.checkout.verify_cod_token("dev", store.verification(&intent, "pay_cod")).await.unwrap();
    let order = confirmed.order;
    assert_eq!(order.status, OrderStatusType::Paid);
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.prepaid_amount, Paise::from_rupees(100));
    assert_eq!(order.cod_surcharge, Paise::from_rupees(50));
    assert!(order.amount_is_consistent());
    assert_eq!(stock(&store, "P2", "M").await, 2);
    store.tear_down().await;
}

#[tokio::test]
async fn stock_sold_out_after_payment_flags_the_order() {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    // P1/L has a single unit, and both shoppers see it as available
    let alice =
        store.checkout.create_intent(checkout_request("alice", vec![cart_line("P1", "L", 1)], None)).await.unwrap();
    let bob = store.checkout.create_intent(checkout_request("bob", vec![cart_line("P1", "L", 1)], None)).await.unwrap();
    let first = store.pay("alice", &alice, "pay_a1").await.unwrap();
    assert!(first.order.stock_committed);
    let second = store.pay("bob", &bob, "pay_b1").await.unwrap();
    assert_eq!(second.order.status, OrderStatusType::Paid);
    assert!(!second.order.stock_committed);
    assert!(second.needs_reconciliation());
    assert!(second.order.reconciliation_note.unwrap().contains("P1/L"));
    assert_eq!(stock(&store, "P1", "L").await, 0);
    store.tear_down().await;
}

#[tokio::test]
async fn orders_are_only_visible_to_their_owner_and_admins() {
    use kk_order_engine::objects::Requester;
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let intent =
        store.checkout.create_intent(checkout_request("alice", vec![cart_line("P1", "M", 1)], None)).await.unwrap();
    let order = store.orders.order_for(&Requester::user("alice"), &intent.order_id).await.unwrap();
    assert_eq!(order.order_id, intent.order_id);
    assert!(store.orders.order_for(&Requester::admin("ops"), &intent.order_id).await.is_ok());
    let err = store.orders.order_for(&Requester::user("bob"), &intent.order_id).await.unwrap_err();
    assert!(matches!(err, OrderEngineError::OrderNotFound(_)));
    assert_eq!(store.orders.orders_for_user("alice").await.unwrap().len(), 1);
    assert!(store.orders.orders_for_user("bob").await.unwrap().is_empty());
    assert!(order.created_at <= Utc::now());
    store.tear_down().await;
}

#[tokio::test]
async fn writes_are_visible_to_the_next_read() {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    for i in 0..20 {
        let intent =
            store.checkout.create_intent(checkout_request("erin", vec![cart_line("P1", "S", 1)], None)).await.unwrap();
        let order = store.db.fetch_order(&intent.order_id).await.unwrap();
        assert!(order.is_some(), "Order {i} ({}) was not visible after it was created", intent.order_id);
        let by_intent = store.db.fetch_order_by_gateway_order_id(&intent.intent_id).await.unwrap();
        assert_eq!(by_intent.map(|o| o.order_id), Some(intent.order_id));

        let code = format!("FLASH{i}");
        store.coupons.upsert_coupon(NewCoupon::fixed(&code, Paise::from_rupees(50))).await.unwrap();
        let quote = store.coupons.validate(&code, Paise::from_rupees(1999), "erin").await.unwrap();
        assert_eq!(quote.discount_amount, Paise::from_rupees(50));
    }
    store.tear_down().await;
}

#[tokio::test]
async fn once_per_account_is_checked_again_when_paying() {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let rules = CouponRules { once_per_account: true, ..CouponRules::default() };
    store.coupons.upsert_coupon(NewCoupon::percentage("ONCE10", 10).with_rules(rules)).await.unwrap();
    let first = store
        .checkout
        .create_intent(checkout_request("dave", vec![cart_line("P1", "M", 1)], Some("ONCE10")))
        .await
        .unwrap();
    let second = store
        .checkout
        .create_intent(checkout_request("dave", vec![cart_line("P1", "S", 1)], Some("ONCE10")))
        .await
        .unwrap();

    let paid = store.pay("dave", &first, "pay_once_a").await.unwrap();
    assert!(!paid.order.needs_reconciliation);
    let late = store.pay("dave", &second, "pay_once_b").await.unwrap();
    assert_eq!(late.order.status, OrderStatusType::Paid);
    assert_eq!(late.order.discount_amount, Paise::from(19_990));
    assert!(late.order.needs_reconciliation);
    assert!(late.order.reconciliation_note.unwrap().contains("ONCE10"));
    assert_eq!(used_count(&store, "ONCE10").await, 1);
    store.tear_down().await;
}

#[tokio::test]
async fn first_purchase_coupons_are_checked_again_when_paying() {
    let store = TestStore::new().await;
    store.seed_catalog().await;
    let rules = CouponRules { first_time_purchase_only: true, ..CouponRules::default() };
    store.coupons.upsert_coupon(NewCoupon::fixed("HELLO150", Paise::from_rupees(150)).with_rules(rules)).await.unwrap();
    let with_coupon = store
        .checkout
        .create_intent(checkout_request("frank", vec![cart_line("P1", "M", 1)], Some("HELLO150")))
        .await
        .unwrap();
    let plain =
        store.checkout.create_intent(checkout_request("frank", vec![cart_line("P2", "M", 1)], None)).await.unwrap();

    store.pay("frank", &plain, "pay_plain").await.unwrap();
    let late = store.pay("frank", &with_coupon, "pay_hello").await.unwrap();
    assert_eq!(late.order.status, OrderStatusType::Paid);
    assert_eq!(late.order.discount_amount, Paise::from_rupees(150));
    assert!(late.order.needs_reconciliation);
    assert!(late.order.reconciliation_note.unwrap().contains("first purchase"));
    assert_eq!(used_count(&store, "HELLO150").await, 0);
    store.tear_down().await;
}

#[tokio::test]
async fn percentage_coupons_are_capped_at_100() {
    let store = TestStore::new().await;
    let err = store.coupons.upsert_coupon(NewCoupon::percentage("TYPO150", 150)).await.unwrap_err();
    assert!(matches!(err, OrderEngineError::ValidationError(_)), "{err:?}");
    assert!(store.coupons.fetch_coupon("TYPO150").await.unwrap().is_none());
    let coupon = store.coupons.upsert_coupon(NewCoupon::percentage("FREEBIE", 100)).await.unwrap();
    assert_eq!(coupon.discount_value, 100);
    store.tear_down().await;
}
