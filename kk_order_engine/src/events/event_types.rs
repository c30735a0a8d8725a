use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatusType, Refund};

/// An order moved to `paid`. Emitted once per order, never for a replayed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// An order was cancelled or returned. `refund` is set if money went back to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatusType,
    pub refund: Option<Refund>,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order, refund: Option<Refund>) -> Self {
        let status = order.status;
        Self { order, status, refund }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnDecidedEvent {
    pub order: Order,
    pub approved: bool,
}

impl ReturnDecidedEvent {
    pub fn new(order: Order, approved: bool) -> Self {
        Self { order, approved }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    OrderPaid(OrderPaidEvent),
    OrderAnnulled(OrderAnnulledEvent),
    ReturnDecided(ReturnDecidedEvent),
}
