//! Coupon validation and discount arithmetic. Everything here is pure; the storage lookups that feed
//! [`CouponContext`] are done by [`crate::CouponApi`] and the checkout flow.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Coupon, DiscountType, Paise};

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum CouponError {
    #[error("Coupon {code} does not exist")]
    NotFound { code: String },
    #[error("Coupon {code} is no longer active")]
    Inactive { code: String },
    #[error("Coupon {code} is not valid yet")]
    NotYetValid { code: String },
    #[error("Coupon {code} has expired")]
    Expired { code: String },
    #[error("Coupon {code} needs a minimum purchase of {minimum}")]
    BelowMinimumPurchase { code: String, minimum: Paise },
    #[error("Coupon {code} has reached its usage limit")]
    UsageLimitReached { code: String },
    #[error("Coupon {code} has already been used on this account")]
    AlreadyUsed { code: String },
    #[error("Coupon {code} is only valid on a first purchase")]
    FirstPurchaseOnly { code: String },
}

/// Everything about the shopper and the cart that the coupon rules depend on.
#[derive(Debug, Clone, Copy)]
pub struct CouponContext {
    pub now: DateTime<Utc>,
    /// The discountable amount, i.e. the cart subtotal plus any surcharge the coupon covers.
    pub cart_total: Paise,
    pub already_used_by_user: bool,
    pub prior_paid_orders: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub cart_total: Paise,
    pub discount_amount: Paise,
    pub final_amount: Paise,
}

impl PriceQuote {
    pub fn without_discount(cart_total: Paise) -> Self {
        Self { cart_total, discount_amount: Paise::zero(), final_amount: cart_total }
    }
}

/// Coupon codes are case-insensitive and stored upper-case.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// The discount a coupon gives on `cart_total`. Never more than `cart_total`.
pub fn compute_discount(coupon: &Coupon, cart_total: Paise) -> Paise {
    let discount = match coupon.discount_type {
        DiscountType::Percentage => {
            let raw = cart_total.percentage_half_up(coupon.discount_value);
            match coupon.max_discount_amount {
                Some(cap) if raw > cap => cap,
                _ => raw,
            }
        },
        DiscountType::Fixed => Paise::from(coupon.discount_value),
    };
    discount.clamp(Paise::zero(), cart_total.max(Paise::zero()))
}

/// Applies the coupon rules in a fixed order and returns the first one that fails, or the resulting quote.
///
/// 1. active
/// 2. inside `valid_from`/`valid_until`
/// 3. minimum purchase
/// 4. usage limit
/// 5. once per account
/// 6. first purchase only
pub fn check_coupon(coupon: &Coupon, ctx: &CouponContext) -> Result<PriceQuote, CouponError> {
    let code = coupon.code.clone();
    if !coupon.is_active {
        return Err(CouponError::Inactive { code });
    }
    if coupon.valid_from.map(|from| ctx.now < from).unwrap_or(false) {
        return Err(CouponError::NotYetValid { code });
    }
    if coupon.valid_until.map(|until| ctx.now > until).unwrap_or(false) {
        return Err(CouponError::Expired { code });
    }
    if ctx.cart_total < coupon.min_purchase_amount {
        return Err(CouponError::BelowMinimumPurchase { code, minimum: coupon.min_purchase_amount });
    }
    if coupon.usage_limit.map(|limit| coupon.used_count >= limit).unwrap_or(false) {
        return Err(CouponError::UsageLimitReached { code });
    }
    if coupon.rules.once_per_account && ctx.already_used_by_user {
        return Err(CouponError::AlreadyUsed { code });
    }
    if coupon.rules.first_time_purchase_only && ctx.prior_paid_orders > 0 {
        return Err(CouponError::FirstPurchaseOnly { code });
    }
    let discount_amount = compute_discount(coupon, ctx.cart_total);
    Ok(PriceQuote { cart_total: ctx.cart_total, discount_amount, final_amount: ctx.cart_total - discount_amount })
}
