//! # Storage and gateway contracts
//!
//! This module defines the interfaces the order engine needs from the outside world. The engine APIs are generic over
//! these traits, so a backend (currently SQLite) or a payment provider can be swapped without touching order logic.
//!
//! * [`StockLedger`] holds per-size inventory and offers atomic conditional decrements.
//! * [`ProductCatalog`] is the read path into the external product catalog (price snapshots, names, images).
//! * [`CouponManagement`] reads coupon definitions and per-account usage.
//! * [`OrderManagement`] stores the order aggregate. Status writes are compare-and-set on the previous status.
//! * [`CheckoutDatabase`] commits a verified payment: order status, stock and coupon usage in one transaction.
//! * [`RefundManagement`] records refunds and annuls orders (cancellation, approved return) atomically.
//! * [`PaymentGateway`] is the payment provider boundary.
mod coupon_management;
mod data_objects;
mod errors;
mod order_management;
mod payment_gateway;
mod product_catalog;
mod refund_management;
mod stock_ledger;

pub use coupon_management::CouponManagement;
pub use data_objects::{
    AnnulledOrder,
    CommitOutcome,
    CommittedPayment,
    OrderAnnulment,
    OrderQueryFilter,
    PaymentCommit,
    PaymentSource,
    RefundQueryFilter,
    ReturnRequest,
    StatusChange,
    StockLine,
    StockShortfall,
};
pub(crate) use errors::is_unique_violation;
pub use errors::StoreError;
pub use order_management::{CheckoutDatabase, OrderManagement};
pub use payment_gateway::{
    GatewayError,
    GatewayEvent,
    GatewayIntent,
    GatewayPayment,
    GatewayPaymentStatus,
    GatewayRefund,
    IntentRequest,
    PaymentGateway,
    RefundRequest,
};
pub use product_catalog::ProductCatalog;
pub use refund_management::RefundManagement;
pub use stock_ledger::StockLedger;
