use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{Coupon, DiscountType, NewCoupon, Paise},
    engine_api::errors::OrderEngineError,
    pricing::{check_coupon, normalize_code, CouponContext, CouponError, PriceQuote},
    traits::{CouponManagement, OrderManagement},
};

/// Coupon lookups and quotes. Quotes are advisory: checkout re-validates right before it creates the order, and the
/// usage counter is only incremented, conditionally, when the payment is committed.
pub struct CouponApi<B> {
    db: B,
}

impl<B> Debug for CouponApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CouponApi")
    }
}

impl<B> CouponApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> CouponApi<B>
where B: CouponManagement + OrderManagement
{
    /// Quotes `code` against a cart total for this user.
    pub async fn validate(&self, code: &str, cart_total: Paise, user_id: &str) -> Result<PriceQuote, OrderEngineError> {
        let (_, quote) = self.check_for_cart(code, cart_total, Paise::zero(), user_id).await?;
        Ok(quote)
    }

    /// Runs every coupon rule for a cart. `surcharge` is part of the discountable amount only if the coupon applies
    /// to shipping.
    pub async fn check_for_cart(
        &self,
        code: &str,
        subtotal: Paise,
        surcharge: Paise,
        user_id: &str,
    ) -> Result<(Coupon, PriceQuote), OrderEngineError> {
        let code = normalize_code(code);
        let coupon = self.db.fetch_coupon(&code).await?.ok_or_else(|| CouponError::NotFound { code: code.clone() })?;
        let cart_total = if coupon.rules.apply_to_shipping { subtotal + surcharge } else { subtotal };
        let already_used_by_user =
            coupon.rules.once_per_account && self.db.has_used_coupon(&coupon.code, user_id).await?;
        let prior_paid_orders = if coupon.rules.first_time_purchase_only {
            self.db.count_paid_orders_for_user(user_id).await?
        } else {
            0
        };
        let ctx = CouponContext { now: Utc::now(), cart_total, already_used_by_user, prior_paid_orders };
        let quote = check_coupon(&coupon, &ctx).map_err(|e| {
            debug!("🛒️ Coupon {code} rejected for {user_id}: {e}");
            e
        })?;
        trace!("🛒️ Coupon {code} gives {} off {}", quote.discount_amount, quote.cart_total);
        Ok((coupon, quote))
    }

    pub async fn fetch_coupon(&self, code: &str) -> Result<Option<Coupon>, OrderEngineError> {
        Ok(self.db.fetch_coupon(&normalize_code(code)).await?)
    }

    pub async fn upsert_coupon(&self, mut coupon: NewCoupon) -> Result<Coupon, OrderEngineError> {
        coupon.code = normalize_code(&coupon.code);
        if coupon.code.is_empty() {
            return Err(OrderEngineError::ValidationError("A coupon needs a code".into()));
        }
        if coupon.discount_value <= 0 {
            return Err(OrderEngineError::ValidationError("A coupon must give a positive discount".into()));
        }
        if coupon.discount_type == DiscountType::Percentage && coupon.discount_value > 100 {
            let msg = format!("A percentage coupon cannot give more than 100% off ({}%)", coupon.discount_value);
            return Err(OrderEngineError::ValidationError(msg));
        }
        let coupon = self.db.upsert_coupon(coupon).await?;
        info!("🛒️ Coupon {} saved", coupon.code);
        Ok(coupon)
    }
}
