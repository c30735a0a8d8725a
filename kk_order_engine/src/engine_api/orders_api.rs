use std::fmt::Debug;

use crate::{
    db_types::{Order, OrderId},
    engine_api::{errors::OrderEngineError, objects::Requester},
    traits::{OrderManagement, OrderQueryFilter},
};

/// Read access to orders, with ownership checks.
pub struct OrdersApi<B> {
    db: B,
}

impl<B> Debug for OrdersApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrdersApi")
    }
}

impl<B> OrdersApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> OrdersApi<B>
where B: OrderManagement
{
    /// Fetches an order the requester is allowed to see. Other users' orders are reported as missing rather than
    /// forbidden, so order ids cannot be probed.
    pub async fn order_for(&self, requester: &Requester, order_id: &OrderId) -> Result<Order, OrderEngineError> {
        match self.db.fetch_order(order_id).await? {
            Some(order) if requester.may_access(&order) => Ok(order),
            _ => Err(OrderEngineError::OrderNotFound(order_id.clone())),
        }
    }

    /// The user's orders, newest first.
    pub async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, OrderEngineError> {
        Ok(self.db.search_orders(OrderQueryFilter::default().with_user_id(user_id)).await?)
    }

    pub async fn search(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, OrderEngineError> {
        Ok(self.db.search_orders(filter).await?)
    }
}
