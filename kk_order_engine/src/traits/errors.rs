use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderStatusType, Paise, ProductId},
    traits::StockShortfall,
};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("An order with id {0} already exists")]
    DuplicateOrder(OrderId),
    #[error("Product {0} does not exist")]
    ProductNotFound(ProductId),
    #[error("Not enough stock for {} line(s)", .0.len())]
    InsufficientStock(Vec<StockShortfall>),
    #[error("Order {order_id} is no longer {expected}. It was changed by another request")]
    StatusConflict { order_id: OrderId, expected: OrderStatusType },
    #[error("Payment {0} has already been applied to another order")]
    DuplicatePayment(String),
    #[error("Refunding {requested} on order {order_id} would exceed the {captured} captured")]
    RefundExceedsCaptured { order_id: OrderId, captured: Paise, requested: Paise },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

/// True if the error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
