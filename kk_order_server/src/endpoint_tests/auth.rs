use actix_web::{http::StatusCode, test::TestRequest};
use kk_order_engine::{db_types::OrderStatusType, test_utils::fixtures::paid_order};

use super::{
    helpers::{bearer, expired_token, send, user_token},
    mocks::MockOrderManager,
    orders::orders_app,
};
use crate::{
    auth::{Role, TokenIssuer},
    config::AuthConfig,
};

fn untouched_store() -> MockOrderManager {
    let mut orders = MockOrderManager::new();
    orders.expect_search_orders().never();
    orders.expect_fetch_order().never();
    orders
}

#[actix_web::test]
async fn health_needs_no_token() {
    let _ = env_logger::try_init().ok();
    let res = send(orders_app(untouched_store()), TestRequest::get().uri("/health")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, "👍️\n");
}

#[actix_web::test]
async fn requests_without_a_token_are_unauthorized() {
    let _ = env_logger::try_init().ok();
    let res = send(orders_app(untouched_store()), TestRequest::get().uri("/orders")).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body, "No bearer token was provided.");
}

#[actix_web::test]
async fn malformed_tokens_are_unauthorized() {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::get().uri("/orders").insert_header(bearer("not.a.jwt"));
    let res = send(orders_app(untouched_store()), req).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    let req = TestRequest::get().uri("/orders").insert_header(("Authorization", user_token("alice")));
    let res = send(orders_app(untouched_store()), req).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED, "A token without the Bearer scheme must be ignored");
}

#[actix_web::test]
async fn expired_tokens_are_unauthorized() {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::get().uri("/orders").insert_header(bearer(&expired_token("alice")));
    let res = send(orders_app(untouched_store()), req).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body, "The access token has expired.");
}

#[actix_web::test]
async fn tokens_from_another_issuer_are_unauthorized() {
    let _ = env_logger::try_init().ok();
    let forger = AuthConfig::new("a-different-secret-that-is-long-enough!!");
    let token = TokenIssuer::new(&forger).issue_token("alice", vec![Role::User, Role::Admin], None).unwrap();
    let req = TestRequest::get().uri("/admin/orders").insert_header(bearer(&token));
    let res = send(orders_app(untouched_store()), req).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn the_token_subject_decides_whose_orders_are_listed() {
    let _ = env_logger::try_init().ok();
    let mut orders = MockOrderManager::new();
    orders
        .expect_search_orders()
        .withf(|f| f.user_id.as_deref() == Some("bob"))
        .times(1)
        .returning(|_| Ok(vec![paid_order("KK-3", OrderStatusType::Delivered)]));
    let req = TestRequest::get().uri("/orders?user_id=alice").insert_header(bearer(&user_token("bob")));
    let res = send(orders_app(orders), req).await;
    assert_eq!(res.status, StatusCode::OK);
}
