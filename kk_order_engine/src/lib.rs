//! Kallkeyy Order Engine
//!
//! The order engine takes a validated cart to a paid order and keeps that order consistent while the client, the
//! payment gateway and the shipping partner report events asynchronously and out of order. It is provider-agnostic:
//! the payment provider is only known through the [`PaymentGateway`] trait.
//!
//! The library is divided into these main sections:
//! 1. Storage ([`mod@traits`] and the SQLite backend). The engine APIs are generic over the storage traits. The data
//!    types stored are defined in [`mod@db_types`] and are public.
//! 2. Pure business rules: the order status state machine in [`mod@order_state`] and coupon pricing in
//!    [`mod@pricing`].
//! 3. The public API ([`mod@engine_api`]): checkout, order flow, reconciliation, refunds, orders and coupons.
//!
//! The engine also emits events when an order is paid, annulled, or a return is decided. See [`mod@events`] for
//! how to hook into them.
pub mod db_types;
pub mod engine_api;
pub mod events;
pub mod helpers;
pub mod order_state;
pub mod pricing;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use engine_api::{
    checkout_api::CheckoutApi,
    config::EngineConfig,
    coupon_api::CouponApi,
    errors::OrderEngineError,
    objects,
    order_flow_api::{OrderFlowApi, PaymentEvidence},
    orders_api::OrdersApi,
    reconciliation_api::ReconciliationApi,
    refund_api::RefundApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{db::new_pool, SqliteDatabase};
pub use traits::{
    CheckoutDatabase,
    CouponManagement,
    OrderManagement,
    PaymentGateway,
    ProductCatalog,
    RefundManagement,
    StockLedger,
};
