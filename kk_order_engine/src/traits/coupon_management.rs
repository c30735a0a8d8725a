use crate::{
    db_types::{Coupon, NewCoupon},
    traits::StoreError,
};

#[allow(async_fn_in_trait)]
pub trait CouponManagement: Clone {
    /// Looks up a coupon by its (case-insensitive) code.
    async fn fetch_coupon(&self, code: &str) -> Result<Option<Coupon>, StoreError>;

    /// Creates a coupon, or replaces the definition of an existing one. `used_count` is preserved on update.
    async fn upsert_coupon(&self, coupon: NewCoupon) -> Result<Coupon, StoreError>;

    /// Whether this account has already redeemed the coupon on a paid order.
    async fn has_used_coupon(&self, code: &str, user_id: &str) -> Result<bool, StoreError>;
}
