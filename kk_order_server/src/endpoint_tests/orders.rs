use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use kk_order_engine::{
    db_types::OrderStatusType,
    test_utils::fixtures::paid_order,
    OrdersApi,
};

use super::{
    helpers::{admin_token, bearer, send, test_config, user_token},
    mocks::MockOrderManager,
};
use crate::{
    auth::TokenValidator,
    middleware::JwtMiddlewareFactory,
    routes::{health, query_config, MyOrdersRoute, OrderByIdRoute, SearchOrdersRoute},
};

/// The read-only order routes over a mocked order store.
pub fn orders_app(orders: MockOrderManager) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let auth_scope = web::scope("")
            .wrap(JwtMiddlewareFactory::new(TokenValidator::new(&test_config().auth)))
            .service(MyOrdersRoute::<MockOrderManager>::new())
            .service(OrderByIdRoute::<MockOrderManager>::new())
            .service(SearchOrdersRoute::<MockOrderManager>::new());
        cfg.app_data(query_config())
            .app_data(web::Data::new(OrdersApi::new(orders)))
            .service(health)
            .service(auth_scope);
    }
}

#[actix_web::test]
async fn my_orders_only_lists_the_callers_orders() {
    let _ = env_logger::try_init().ok();
    let mut orders = MockOrderManager::new();
    orders
        .expect_search_orders()
        .withf(|filter| filter.user_id.as_deref() == Some("alice") && filter.statuses.is_empty())
        .times(1)
        .returning(|_| {
            Ok(vec![paid_order("KK-1", OrderStatusType::Paid), paid_order("KK-2", OrderStatusType::Shipped)])
        });
    let req = TestRequest::get().uri("/orders").insert_header(bearer(&user_token("alice")));
    let res = send(orders_app(orders), req).await;
    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    let orders = body.as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["order_id"], "KK-1");
    assert_eq!(orders[0]["amount"], 189_900);
    assert_eq!(orders[1]["status"], "shipped");
}

#[actix_web::test]
async fn owners_can_fetch_their_order() {
    let _ = env_logger::try_init().ok();
    let mut orders = MockOrderManager::new();
    orders
        .expect_fetch_order()
        .withf(|id| id.as_str() == "KK-7")
        .returning(|id| Ok(Some(paid_order(id.as_str(), OrderStatusType::Processing))));
    let req = TestRequest::get().uri("/orders/KK-7").insert_header(bearer(&user_token("alice")));
    let res = send(orders_app(orders), req).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["status"], "processing");
}

#[actix_web::test]
async fn other_users_orders_look_missing() {
    let _ = env_logger::try_init().ok();
    let mut orders = MockOrderManager::new();
    orders.expect_fetch_order().returning(|id| Ok(Some(paid_order(id.as_str(), OrderStatusType::Paid))));
    let req = TestRequest::get().uri("/orders/KK-7").insert_header(bearer(&user_token("mallory")));
    let res = send(orders_app(orders), req).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert!(res.json()["error"].as_str().unwrap().contains("KK-7"), "was: {}", res.body);
}

#[actix_web::test]
async fn missing_orders_are_not_found() {
    let _ = env_logger::try_init().ok();
    let mut orders = MockOrderManager::new();
    orders.expect_fetch_order().returning(|_| Ok(None));
    let req = TestRequest::get().uri("/orders/KK-404").insert_header(bearer(&user_token("alice")));
    let res = send(orders_app(orders), req).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn admins_can_fetch_any_order() {
    let _ = env_logger::try_init().ok();
    let mut orders = MockOrderManager::new();
    orders.expect_fetch_order().returning(|id| Ok(Some(paid_order(id.as_str(), OrderStatusType::Paid))));
    let req = TestRequest::get().uri("/orders/KK-9").insert_header(bearer(&admin_token()));
    let res = send(orders_app(orders), req).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["user_id"], "alice");
}

#[actix_web::test]
async fn admins_search_with_filters() {
    let _ = env_logger::try_init().ok();
    let mut orders = MockOrderManager::new();
    orders
        .expect_search_orders()
        .withf(|f| {
            f.user_id.is_none() &&
                f.statuses == vec![OrderStatusType::Pending] &&
                f.needs_reconciliation == Some(true) &&
                f.limit == Some(20)
        })
        .times(1)
        .returning(|_| Ok(vec![]));
    let req = TestRequest::get()
        .uri("/admin/orders?status=pending&needs_reconciliation=true&limit=20")
        .insert_header(bearer(&admin_token()));
    let res = send(orders_app(orders), req).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, "[]");
}

#[actix_web::test]
async fn users_cannot_search_orders() {
    let _ = env_logger::try_init().ok();
    let mut orders = MockOrderManager::new();
    orders.expect_search_orders().never();
    let req = TestRequest::get().uri("/admin/orders").insert_header(bearer(&user_token("alice")));
    let res = send(orders_app(orders), req).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn unknown_statuses_in_the_query_are_rejected() {
    let _ = env_logger::try_init().ok();
    let mut orders = MockOrderManager::new();
    orders.expect_search_orders().never();
    let req = TestRequest::get().uri("/admin/orders?status=lost_in_the_mail").insert_header(bearer(&admin_token()));
    let res = send(orders_app(orders), req).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.json()["error"].is_string());
}
