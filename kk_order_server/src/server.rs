use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use kk_order_engine::{
    events::EventProducers,
    CheckoutApi,
    CheckoutDatabase,
    CouponApi,
    OrderFlowApi,
    OrdersApi,
    PaymentGateway,
    ReconciliationApi,
    RefundApi,
    RefundManagement,
    SqliteDatabase,
};
use log::*;

use crate::{
    auth::TokenValidator,
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    integrations::razorpay::RazorpayGateway,
    middleware::{HmacMiddlewareFactory, JwtMiddlewareFactory},
    notifications::create_notification_handlers,
    reconciliation_worker::start_reconciliation_worker,
    routes::{
        health,
        json_config,
        query_config,
        CancelOrderRoute,
        CreateCodTokenIntentRoute,
        CreateIntentRoute,
        DecideReturnRoute,
        ManualRefundRoute,
        MyOrdersRoute,
        OrderByIdRoute,
        PaymentWebhookRoute,
        ReconcileOrderRoute,
        RefundCancelRoute,
        RefundLedgerRoute,
        RequestReturnRoute,
        SearchOrdersRoute,
        ShippingWebhookRoute,
        UpdateOrderStatusRoute,
        ValidateCartRoute,
        ValidateCouponRoute,
        VerifyCodTokenRoute,
        VerifyPaymentRoute,
    },
};

pub const PAYMENT_SIGNATURE_HEADER: &str = "X-Razorpay-Signature";
pub const SHIPPING_SIGNATURE_HEADER: &str = "X-Shipping-Signature";

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway = RazorpayGateway::from_config(&config)?;
    let handlers = create_notification_handlers(config.notification_url.clone())?;
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let sweeper = ReconciliationApi::new(db.clone(), gateway.clone(), producers.clone(), config.engine.clone());
    let _worker = start_reconciliation_worker(sweeper, config.reconcile_interval);
    let srv = create_server_instance(config, db, gateway, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: RazorpayGateway,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    if !config.hmac_checks {
        warn!("🚨️ Webhook signature checks are DISABLED. Anyone can mark orders as paid or shipped.");
    }
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("kk::access_log"))
            .configure(|cfg| configure_app(cfg, db.clone(), gateway.clone(), producers.clone(), &config))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// Registers the engine APIs and every route.
///
/// * `/health` and `/cart/validate` are public.
/// * `/webhook/payment` and `/webhook/shipping` are checked by the HMAC middleware, each with its own secret.
/// * Everything else needs a bearer token. `/admin/...` routes also need the `admin` role.
pub fn configure_app<B, G>(
    cfg: &mut web::ServiceConfig,
    db: B,
    gateway: G,
    producers: EventProducers,
    config: &ServerConfig,
) where
    B: CheckoutDatabase + RefundManagement + 'static,
    G: PaymentGateway + 'static,
{
    let engine = config.engine.clone();
    let checkout_api = CheckoutApi::new(db.clone(), gateway.clone(), producers.clone(), engine.clone());
    let reconciliation_api = ReconciliationApi::new(db.clone(), gateway.clone(), producers.clone(), engine.clone());
    let refund_api = RefundApi::new(db.clone(), gateway, producers.clone(), engine.clone());
    let flow_api = OrderFlowApi::new(db.clone(), producers).with_config(engine);
    let coupon_api = CouponApi::new(db.clone());
    let orders_api = OrdersApi::new(db);

    let payment_webhook_scope = web::scope("/webhook/payment")
        .wrap(HmacMiddlewareFactory::new(
            PAYMENT_SIGNATURE_HEADER,
            config.payment_webhook_secret.clone(),
            config.hmac_checks,
        ))
        .service(PaymentWebhookRoute::<B, G>::new());
    let shipping_webhook_scope = web::scope("/webhook/shipping")
        .wrap(HmacMiddlewareFactory::new(
            SHIPPING_SIGNATURE_HEADER,
            config.shipping_webhook_secret.clone(),
            config.hmac_checks,
        ))
        .service(ShippingWebhookRoute::<B>::new());
    // Routes that require authentication
    let auth_scope = web::scope("")
        .wrap(JwtMiddlewareFactory::new(TokenValidator::new(&config.auth)))
        .service(ValidateCouponRoute::<B>::new())
        .service(CreateIntentRoute::<B, G>::new())
        .service(VerifyPaymentRoute::<B, G>::new())
        .service(CreateCodTokenIntentRoute::<B, G>::new())
        .service(VerifyCodTokenRoute::<B, G>::new())
        .service(MyOrdersRoute::<B>::new())
        .service(OrderByIdRoute::<B>::new())
        .service(RequestReturnRoute::<B, G>::new())
        .service(CancelOrderRoute::<B, G>::new())
        .service(RefundCancelRoute::<B, G>::new())
        .service(SearchOrdersRoute::<B>::new())
        .service(UpdateOrderStatusRoute::<B>::new())
        .service(ReconcileOrderRoute::<B, G>::new())
        .service(DecideReturnRoute::<B, G>::new())
        .service(ManualRefundRoute::<B, G>::new())
        .service(RefundLedgerRoute::<B, G>::new());

    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(web::Data::new(ServerOptions::from_config(config)))
        .app_data(web::Data::new(checkout_api))
        .app_data(web::Data::new(reconciliation_api))
        .app_data(web::Data::new(refund_api))
        .app_data(web::Data::new(flow_api))
        .app_data(web::Data::new(coupon_api))
        .app_data(web::Data::new(orders_api))
        .service(health)
        .service(ValidateCartRoute::<B, G>::new())
        .service(payment_webhook_scope)
        .service(shipping_webhook_scope)
        .service(auth_scope);
}
