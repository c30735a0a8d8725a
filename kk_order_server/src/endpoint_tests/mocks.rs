use kk_order_engine::{
    db_types::{NewOrder, Order, OrderId, TrackingInfo},
    traits::{OrderManagement, OrderQueryFilter, StatusChange, StoreError},
};
use mockall::mock;

mock! {
    pub OrderManager {}
    impl Clone for OrderManager {
        fn clone(&self) -> Self;
    }
    impl OrderManagement for OrderManager {
        async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError>;
        async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError>;
        async fn fetch_order_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Order>, StoreError>;
        async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, StoreError>;
        async fn count_paid_orders_for_user(&self, user_id: &str) -> Result<i64, StoreError>;
        async fn update_order_status(&self, change: StatusChange) -> Result<Order, StoreError>;
        async fn update_tracking(&self, order_id: &OrderId, tracking: TrackingInfo) -> Result<Order, StoreError>;
        async fn mark_payment_failed(&self, order_id: &OrderId) -> Result<Order, StoreError>;
        async fn flag_for_reconciliation(&self, order_id: &OrderId, note: &str) -> Result<Order, StoreError>;
    }
}
