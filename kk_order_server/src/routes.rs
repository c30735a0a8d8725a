//! Request handler definitions
//!
//! Define each route and its handler here. Handlers only translate between HTTP and the engine APIs; anything more
//! than that belongs in the engine. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every database and gateway call is a future, so always `.await`
//! them rather than blocking.
//!
//! | Route                                   | Access                 |
//! |-----------------------------------------|------------------------|
//! | `GET /health`                           | public                 |
//! | `POST /cart/validate`                   | public                 |
//! | `POST /webhook/payment`                 | HMAC signed            |
//! | `POST /webhook/shipping`                | HMAC signed            |
//! | `POST /coupons/validate`                | user                   |
//! | `POST /checkout/...`                    | user                   |
//! | `GET /orders`, `GET /orders/{id}`       | user (owner) or admin  |
//! | `POST /orders/{id}/return`              | user (owner)           |
//! | `PUT /orders/{id}/cancel`               | user (owner) or admin  |
//! | `POST /refunds/cancel`                  | user (owner) or admin  |
//! | `/admin/...`                            | admin                  |
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use kk_order_engine::{
    db_types::OrderId,
    objects::{ManualRefundRequest, PaymentVerification, ShippingUpdate},
    CheckoutApi,
    CheckoutDatabase,
    CouponApi,
    OrderFlowApi,
    OrderManagement,
    OrdersApi,
    PaymentGateway,
    ReconciliationApi,
    RefundApi,
    RefundManagement,
};
use log::*;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::{
    auth::{JwtClaims, Role},
    config::ServerOptions,
    data_objects::{
        CancelOrderBody,
        CartValidationRequest,
        CheckoutBody,
        CouponValidationRequest,
        OrderSearchQuery,
        RefundCancelRequest,
        RefundLedgerQuery,
        ReturnDecisionRequest,
        ReturnRequestBody,
        StatusUpdateRequest,
        WebhookAck,
    },
    errors::ServerError,
    helpers::get_remote_ip,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro.
// Each bound becomes a generic parameter named `T<Bound>`, in the order given, e.g. `impl CheckoutDatabase,
// PaymentGateway` gives `MyRoute<TCheckoutDatabase, TPaymentGateway>`, which calls `my::<TCheckoutDatabase,
// TPaymentGateway>`.
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:expr),+])  => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

/// Malformed JSON bodies and query strings are reported in the same `{"error": ...}` shape as every other error.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into())
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| ServerError::InvalidRequestPath(err.to_string()).into())
}

/// Parses an optional JSON body. An empty body gives the default value.
fn optional_body<T: DeserializeOwned + Default>(body: &web::Bytes) -> Result<T, ServerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Cart & coupons  ---------------------------------------------
route!(validate_cart => Post "/cart/validate" impl CheckoutDatabase, PaymentGateway);
/// Advisory stock check for a cart. Nothing is reserved: stock is only committed when a payment is verified.
pub async fn validate_cart<B: CheckoutDatabase, G: PaymentGateway>(
    body: web::Json<CartValidationRequest>,
    api: web::Data<CheckoutApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST validate cart with {} line(s)", body.items.len());
    let result = api.validate_cart(&body.items).await?;
    Ok(HttpResponse::Ok().json(result))
}

route!(validate_coupon => Post "/coupons/validate" impl CheckoutDatabase);
/// Quotes a coupon against a cart total for the caller. The quote is advisory; the coupon is checked again, and its
/// usage counted, when the order is paid.
pub async fn validate_coupon<B: CheckoutDatabase>(
    claims: JwtClaims,
    body: web::Json<CouponValidationRequest>,
    api: web::Data<CouponApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST validate coupon {} for {}", body.code, claims.sub);
    let quote = api.validate(&body.code, body.cart_total, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(quote))
}

//----------------------------------------------   Checkout  --------------------------------------------------
route!(create_intent => Post "/checkout/create-intent" impl CheckoutDatabase, PaymentGateway);
/// Starts an online checkout.
///
/// The cart is priced from the catalog, stock and coupon are checked, a `pending` order is stored and a gateway
/// payment intent is opened for the full amount. The response carries what the client needs to open the payment
/// widget. Retrying with the same `receipt` returns the same intent.
pub async fn create_intent<B: CheckoutDatabase, G: PaymentGateway>(
    claims: JwtClaims,
    body: web::Json<CheckoutBody>,
    api: web::Data<CheckoutApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST create intent for {}", claims.sub);
    let intent = api.create_intent(body.into_inner().into_request(&claims.sub)).await?;
    Ok(HttpResponse::Ok().json(intent))
}

route!(verify_payment => Post "/checkout/verify" impl CheckoutDatabase, PaymentGateway);
/// Confirms an online payment using the signed callback the gateway gave the client.
///
/// The payment webhook may already have confirmed the order. In that case the response is a success with
/// `already_paid` set.
pub async fn verify_payment<B: CheckoutDatabase, G: PaymentGateway>(
    claims: JwtClaims,
    body: web::Json<PaymentVerification>,
    api: web::Data<CheckoutApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST verify payment {} for order {}", body.gateway_payment_id, body.order_id);
    let confirmed = api.verify_payment(&claims.sub, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(confirmed))
}

route!(create_cod_token_intent => Post "/checkout/cod/create-token-intent" impl CheckoutDatabase, PaymentGateway);
/// Starts a cash-on-delivery checkout. Only the confirmation token is paid online; the rest is collected on delivery.
pub async fn create_cod_token_intent<B: CheckoutDatabase, G: PaymentGateway>(
    claims: JwtClaims,
    body: web::Json<CheckoutBody>,
    api: web::Data<CheckoutApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST create COD token intent for {}", claims.sub);
    let intent = api.create_cod_token_intent(body.into_inner().into_request(&claims.sub)).await?;
    Ok(HttpResponse::Ok().json(intent))
}

route!(verify_cod_token => Post "/checkout/cod/verify-token" impl CheckoutDatabase, PaymentGateway);
pub async fn verify_cod_token<B: CheckoutDatabase, G: PaymentGateway>(
    claims: JwtClaims,
    body: web::Json<PaymentVerification>,
    api: web::Data<CheckoutApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST verify COD token {} for order {}", body.gateway_payment_id, body.order_id);
    let confirmed = api.verify_cod_token(&claims.sub, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(confirmed))
}

//----------------------------------------------   Webhooks  --------------------------------------------------
route!(payment_webhook => Post "" impl CheckoutDatabase, PaymentGateway);
/// Receives payment events from the gateway.
///
/// The HMAC middleware has already checked the signature against these exact bytes. From here on the gateway always
/// gets a 200: business rejections are reported in the body, since a retry would not change them. Orders whose
/// payment could not be applied are picked up by the reconciliation sweep.
pub async fn payment_webhook<B: CheckoutDatabase, G: PaymentGateway>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<ReconciliationApi<B, G>>,
    options: web::Data<ServerOptions>,
) -> HttpResponse {
    let peer = get_remote_ip(&req, options.use_x_forwarded_for);
    debug!("💻️ Received payment webhook from {peer:?} ({} bytes)", body.len());
    match api.handle_payment_webhook(&body).await {
        Ok(outcome) => {
            info!("💻️ Payment webhook processed: {outcome:?}");
            HttpResponse::Ok().json(WebhookAck::accepted(outcome))
        },
        Err(e) => {
            warn!("💻️ Payment webhook could not be applied. {e}");
            HttpResponse::Ok().json(WebhookAck::rejected(e))
        },
    }
}

route!(shipping_webhook => Post "" impl CheckoutDatabase);
/// Receives courier status reports. Late and repeated reports are acknowledged without changing the order.
pub async fn shipping_webhook<B: CheckoutDatabase>(
    req: HttpRequest,
    body: web::Json<ShippingUpdate>,
    api: web::Data<OrderFlowApi<B>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let peer = get_remote_ip(&req, options.use_x_forwarded_for);
    debug!("💻️ Received {:?} shipping update for {} from {peer:?}", body.event, body.order_id);
    let order = api.apply_shipping_update(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(my_orders => Get "/orders" impl OrderManagement);
/// The caller's orders, newest first.
pub async fn my_orders<B: OrderManagement>(
    claims: JwtClaims,
    api: web::Data<OrdersApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET my_orders for {}", claims.sub);
    let orders = api.orders_for_user(&claims.sub).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(order_by_id => Get "/orders/{order_id}" impl OrderManagement);
/// Fetches one order. Users only see their own orders; any other id is reported as not found, whether it exists or
/// not. Admins can fetch any order.
pub async fn order_by_id<B: OrderManagement>(
    claims: JwtClaims,
    path: web::Path<OrderId>,
    api: web::Data<OrdersApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order {order_id} for {}", claims.sub);
    let order = api.order_for(&claims.requester(), &order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(request_return => Post "/orders/{order_id}/return" impl RefundManagement, PaymentGateway);
/// Asks to return a delivered order. Only the owner can do this, and only within the return window.
pub async fn request_return<B: RefundManagement, G: PaymentGateway>(
    claims: JwtClaims,
    path: web::Path<OrderId>,
    body: web::Json<ReturnRequestBody>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST return request for {order_id} by {}", claims.sub);
    let ReturnRequestBody { reason, comments } = body.into_inner();
    let order = api.request_return(&claims.sub, &order_id, &reason, comments).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(cancel_order => Put "/orders/{order_id}/cancel" impl RefundManagement, PaymentGateway);
/// Cancels an order that has not shipped yet. A captured payment is refunded in full. The body is optional and may
/// carry a `reason`.
pub async fn cancel_order<B: RefundManagement, G: PaymentGateway>(
    claims: JwtClaims,
    path: web::Path<OrderId>,
    body: web::Bytes,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let body = optional_body::<CancelOrderBody>(&body)?;
    debug!("💻️ PUT cancel order {order_id} by {}", claims.sub);
    let annulled = api.process_order_cancellation(&claims.requester(), &order_id, body.reason()).await?;
    Ok(HttpResponse::Ok().json(annulled))
}

route!(refund_cancel => Post "/refunds/cancel" impl RefundManagement, PaymentGateway);
/// Same as `PUT /orders/{order_id}/cancel`, with the order id in the body.
pub async fn refund_cancel<B: RefundManagement, G: PaymentGateway>(
    claims: JwtClaims,
    body: web::Json<RefundCancelRequest>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST cancel with refund for {} by {}", body.order_id, claims.sub);
    let annulled = api.process_order_cancellation(&claims.requester(), &body.order_id, body.reason()).await?;
    Ok(HttpResponse::Ok().json(annulled))
}

//----------------------------------------------   Admin  -----------------------------------------------------
route!(search_orders => Get "/admin/orders" impl OrderManagement where requires [Role::Admin]);
/// Searches all orders, e.g. `?needs_reconciliation=true` for orders waiting on a manual review.
pub async fn search_orders<B: OrderManagement>(
    query: web::Query<OrderSearchQuery>,
    api: web::Data<OrdersApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET order search {query:?}");
    let orders = api.search(query.into_inner().into()).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(update_order_status => Post "/admin/orders/{order_id}/status" impl CheckoutDatabase where requires [Role::Admin]);
/// Moves an order along the fulfilment path: `processing`, `shipped` (with tracking details) or `delivered`.
pub async fn update_order_status<B: CheckoutDatabase>(
    claims: JwtClaims,
    path: web::Path<OrderId>,
    body: web::Json<StatusUpdateRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    info!("💻️ {} is moving order {order_id} to {}", claims.sub, body.status);
    let order = api.update_status(&order_id, body.status, body.tracking()).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(reconcile_order => Post "/admin/reconcile/{order_id}" impl CheckoutDatabase, PaymentGateway where requires [Role::Admin]);
/// Asks the gateway what happened to an order's payment and applies a capture if one is found.
pub async fn reconcile_order<B: CheckoutDatabase, G: PaymentGateway>(
    claims: JwtClaims,
    path: web::Path<OrderId>,
    api: web::Data<ReconciliationApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    info!("💻️ {} requested reconciliation of {order_id}", claims.sub);
    let report = api.reconcile_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(report))
}

route!(decide_return => Post "/admin/returns/{order_id}/decision" impl RefundManagement, PaymentGateway where requires [Role::Admin]);
/// Approves (refund, restock, `returned`) or rejects (back to `delivered`) a return request.
pub async fn decide_return<B: RefundManagement, G: PaymentGateway>(
    claims: JwtClaims,
    path: web::Path<OrderId>,
    body: web::Json<ReturnDecisionRequest>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    info!("💻️ {} decided the return of {order_id}. Approved: {}", claims.sub, body.approve);
    let decision = api.decide_return(&order_id, body.approve).await?;
    Ok(HttpResponse::Ok().json(decision))
}

route!(manual_refund => Post "/admin/refunds/manual" impl RefundManagement, PaymentGateway where requires [Role::Admin]);
/// Refunds part or all of an order's captured amount without changing its status.
pub async fn manual_refund<B: RefundManagement, G: PaymentGateway>(
    claims: JwtClaims,
    body: web::Json<ManualRefundRequest>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ {} is refunding {} on order {}. Reason: {}", claims.sub, body.amount, body.order_id, body.reason);
    let (order, refund) = api.process_manual_refund(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "order": order, "refund": refund })))
}

route!(refund_ledger => Get "/admin/refunds" impl RefundManagement, PaymentGateway where requires [Role::Admin]);
pub async fn refund_ledger<B: RefundManagement, G: PaymentGateway>(
    query: web::Query<RefundLedgerQuery>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET refund ledger {query:?}");
    let refunds = api.refunds(query.into_inner().into()).await?;
    Ok(HttpResponse::Ok().json(refunds))
}
