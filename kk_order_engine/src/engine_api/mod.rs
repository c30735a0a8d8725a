//! # Order engine public API
//!
//! The `engine_api` module exposes the programmatic API of the order engine. The API is modular, so that clients can
//! pick the parts they need:
//!
//! * [`checkout_api`] validates carts, opens payment intents (online or COD token) and verifies the client callback.
//! * [`order_flow_api`] owns the order lifecycle. Its `confirm_payment` is the join point for every payment
//!   confirmation channel.
//! * [`reconciliation_api`] handles payment webhooks, manual reconciliation and the staleness sweep.
//! * [`refund_api`] handles cancellations, returns and manual refunds.
//! * [`orders_api`] and [`coupon_api`] are read paths with ownership checks and advisory quotes.
//!
//! # API usage
//!
//! Every API is created from a storage backend that implements the traits it needs, plus the payment gateway and the
//! event producers for the APIs that move money:
//!
//! ```rust,ignore
//! use kk_order_engine::{CheckoutApi, EngineConfig, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = CheckoutApi::new(db, gateway, producers, EngineConfig::default());
//! let intent = api.create_intent(request).await?;
//! ```
pub mod checkout_api;
pub mod config;
pub mod coupon_api;
pub mod errors;
pub mod objects;
pub mod order_flow_api;
pub mod orders_api;
pub mod reconciliation_api;
pub mod refund_api;
