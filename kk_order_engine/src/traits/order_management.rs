use crate::{
    db_types::{NewOrder, Order, OrderId, TrackingInfo},
    traits::{
        CommitOutcome,
        CouponManagement,
        OrderQueryFilter,
        PaymentCommit,
        ProductCatalog,
        StatusChange,
        StockLedger,
        StoreError,
    },
};

/// Storage for the order aggregate.
///
/// `amount` and the other pricing columns are written once by [`OrderManagement::insert_order`]. No method in this
/// trait can change them afterwards.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// Stores a new `pending` order. Returns [`StoreError::DuplicateOrder`] if the order id is taken.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError>;

    async fn fetch_order_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Order>, StoreError>;

    /// Orders matching the filter, newest first.
    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, StoreError>;

    /// The number of orders this user has that were ever paid for, used by first-purchase coupon rules.
    async fn count_paid_orders_for_user(&self, user_id: &str) -> Result<i64, StoreError>;

    /// Applies a status change as a compare-and-set on `change.from`. If the order is no longer in that status,
    /// [`StoreError::StatusConflict`] is returned and nothing is written.
    ///
    /// Entering `delivered`, `cancelled` or `return_requested` also stamps the matching timestamp column.
    async fn update_order_status(&self, change: StatusChange) -> Result<Order, StoreError>;

    /// Updates courier details without changing the status.
    async fn update_tracking(&self, order_id: &OrderId, tracking: TrackingInfo) -> Result<Order, StoreError>;

    /// Records a failed payment attempt. Only a `pending` order with a `pending` payment is touched; anything else is
    /// returned unchanged.
    async fn mark_payment_failed(&self, order_id: &OrderId) -> Result<Order, StoreError>;

    /// Sets `needs_reconciliation` and appends `note` to the reconciliation note.
    async fn flag_for_reconciliation(&self, order_id: &OrderId, note: &str) -> Result<Order, StoreError>;
}

/// Everything checkout needs, plus the one operation that must touch several aggregates atomically.
#[allow(async_fn_in_trait)]
pub trait CheckoutDatabase: OrderManagement + StockLedger + ProductCatalog + CouponManagement {
    /// Applies a verified payment in a single transaction:
    ///
    /// 1. `pending → paid` as a compare-and-set, storing the gateway payment id (which is unique across orders),
    /// 2. decrements stock for every line inside a savepoint (all lines or none),
    /// 3. increments coupon usage if the coupon's limit still allows it and records the usage for the account.
    ///
    /// A stock or coupon failure in steps 2 or 3 does not undo step 1. Money has been captured, so the order stays paid
    /// and is flagged for reconciliation with an itemised note.
    ///
    /// Replaying the same payment returns [`CommitOutcome::AlreadyPaid`] without side effects.
    async fn commit_payment(&self, commit: PaymentCommit) -> Result<CommitOutcome, StoreError>;
}
