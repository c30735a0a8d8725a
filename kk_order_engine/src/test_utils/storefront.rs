use chrono::{DateTime, Utc};

use crate::{
    db_types::{NewCoupon, Order, OrderId, Paise, TrackingInfo},
    events::EventProducers,
    objects::{CheckoutIntent, ConfirmedPayment, PaymentVerification},
    test_utils::{
        fixtures::seed_product,
        mock_gateway::MockGateway,
        prepare_env::{tear_down, test_database},
    },
    CheckoutApi,
    CouponApi,
    EngineConfig,
    OrderEngineError,
    OrderFlowApi,
    OrdersApi,
    ReconciliationApi,
    RefundApi,
    SqliteDatabase,
};

/// Every engine API wired to one throw-away database and one mock gateway.
pub struct TestStore {
    pub db: SqliteDatabase,
    pub gateway: MockGateway,
    pub checkout: CheckoutApi<SqliteDatabase, MockGateway>,
    pub flow: OrderFlowApi<SqliteDatabase>,
    pub reconciliation: ReconciliationApi<SqliteDatabase, MockGateway>,
    pub refunds: RefundApi<SqliteDatabase, MockGateway>,
    pub coupons: CouponApi<SqliteDatabase>,
    pub orders: OrdersApi<SqliteDatabase>,
}

impl std::fmt::Debug for TestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TestStore({})", self.db.url())
    }
}

impl TestStore {
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::default(), EventProducers::default()).await
    }

    pub async fn with_config(config: EngineConfig, producers: EventProducers) -> Self {
        let db = test_database().await;
        let gateway = MockGateway::new();
        let checkout = CheckoutApi::new(db.clone(), gateway.clone(), producers.clone(), config.clone());
        let flow = OrderFlowApi::new(db.clone(), producers.clone()).with_config(config.clone());
        let reconciliation = ReconciliationApi::new(db.clone(), gateway.clone(), producers.clone(), config.clone());
        let refunds = RefundApi::new(db.clone(), gateway.clone(), producers, config);
        let coupons = CouponApi::new(db.clone());
        let orders = OrdersApi::new(db.clone());
        Self { db, gateway, checkout, flow, reconciliation, refunds, coupons, orders }
    }

    /// Seeds the catalog used throughout the tests: `P1` (₹1999) and `P2` (₹2499), and the `KALLKEYY100` coupon.
    pub async fn seed_catalog(&self) {
        seed_product(&self.db, "P1", "Oversized Tee", Paise::from_rupees(1999), &[("S", 2), ("M", 5), ("L", 1)]).await;
        seed_product(&self.db, "P2", "Cargo Pants", Paise::from_rupees(2499), &[("M", 3), ("XL", 0)]).await;
        self.coupons
            .upsert_coupon(NewCoupon::fixed("KALLKEYY100", Paise::from_rupees(100)).with_usage_limit(100))
            .await
            .expect("Error seeding coupon");
    }

    /// What the client sends back after paying `intent` with `payment_id`.
    pub fn verification(&self, intent: &CheckoutIntent, payment_id: &str) -> PaymentVerification {
        PaymentVerification {
            order_id: intent.order_id.clone(),
            gateway_order_id: intent.intent_id.clone(),
            gateway_payment_id: payment_id.to_string(),
            signature: self.gateway.sign_payment(&intent.intent_id, payment_id),
        }
    }

    /// Pays an online intent through the client callback.
    pub async fn pay(
        &self,
        user_id: &str,
        intent: &CheckoutIntent,
        payment_id: &str,
    ) -> Result<ConfirmedPayment, OrderEngineError> {
        self.checkout.verify_payment(user_id, self.verification(intent, payment_id)).await
    }

    /// Delivers the payment through a signed `payment.captured` webhook.
    pub async fn capture_via_webhook(&self, intent: &CheckoutIntent, payment_id: &str) -> Result<(), OrderEngineError> {
        let body = self.gateway.captured_webhook(&intent.intent_id, payment_id, intent.amount);
        self.reconciliation.handle_payment_webhook(&body).await.map(|_| ())
    }

    /// Takes a paid order all the way to `delivered`.
    pub async fn deliver(&self, order_id: &OrderId, delivered_at: DateTime<Utc>) -> Result<Order, OrderEngineError> {
        self.flow.start_processing(order_id).await?;
        let tracking = TrackingInfo {
            tracking_url: Some(format!("https://track.courier.test/{order_id}")),
            courier_name: Some("Delhivery".into()),
            awb_code: Some("AWB123456".into()),
            estimated_delivery: None,
        };
        self.flow.ship(order_id, tracking).await?;
        self.flow.deliver(order_id, Some(delivered_at)).await
    }

    pub async fn order(&self, order_id: &OrderId) -> Order {
        self.flow.fetch_order(order_id).await.expect("Order should exist")
    }

    pub async fn tear_down(self) {
        tear_down(self.db).await;
    }
}
