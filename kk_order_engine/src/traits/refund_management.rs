use crate::{
    db_types::{NewRefund, Order, OrderId, Paise, PaymentStatus, Refund},
    traits::{AnnulledOrder, OrderAnnulment, OrderManagement, RefundQueryFilter, StoreError},
};

#[allow(async_fn_in_trait)]
pub trait RefundManagement: OrderManagement {
    /// In one transaction: compare-and-set the status from `annulment.from` to `annulment.to`, put committed stock back,
    /// record the refund (if any) and update the payment status.
    async fn annul_order(&self, annulment: OrderAnnulment) -> Result<AnnulledOrder, StoreError>;

    /// Records a refund that does not change the fulfilment status. Fails with [`StoreError::RefundExceedsCaptured`]
    /// if the order's refunds would add up to more than `captured`.
    async fn record_refund(
        &self,
        refund: NewRefund,
        captured: Paise,
        payment_status: PaymentStatus,
    ) -> Result<(Order, Refund), StoreError>;

    async fn total_refunded(&self, order_id: &OrderId) -> Result<Paise, StoreError>;

    /// Refund records matching the filter, newest first.
    async fn fetch_refunds(&self, filter: RefundQueryFilter) -> Result<Vec<Refund>, StoreError>;
}
