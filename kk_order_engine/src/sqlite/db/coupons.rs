use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Coupon, NewCoupon, OrderId},
    pricing::normalize_code,
    traits::StoreError,
};

pub async fn fetch_coupon(code: &str, conn: &mut SqliteConnection) -> Result<Option<Coupon>, StoreError> {
    let coupon = sqlx::query_as("SELECT * FROM coupons WHERE code = $1")
        .bind(normalize_code(code))
        .fetch_optional(conn)
        .await?;
    Ok(coupon)
}

pub async fn upsert_coupon(coupon: NewCoupon, conn: &mut SqliteConnection) -> Result<Coupon, StoreError> {
    let code = normalize_code(&coupon.code);
    if code.is_empty() {
        return Err(StoreError::InvalidInput("Coupon code cannot be empty".into()));
    }
    let now = Utc::now();
    let coupon = sqlx::query_as(
        r#"
            INSERT INTO coupons (
                code,
                discount_type,
                discount_value,
                min_purchase_amount,
                max_discount_amount,
                usage_limit,
                valid_from,
                valid_until,
                first_time_purchase_only,
                once_per_account,
                apply_to_shipping,
                is_active,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            ON CONFLICT (code) DO UPDATE SET
                discount_type = excluded.discount_type,
                discount_value = excluded.discount_value,
                min_purchase_amount = excluded.min_purchase_amount,
                max_discount_amount = excluded.max_discount_amount,
                usage_limit = excluded.usage_limit,
                valid_from = excluded.valid_from,
                valid_until = excluded.valid_until,
                first_time_purchase_only = excluded.first_time_purchase_only,
                once_per_account = excluded.once_per_account,
                apply_to_shipping = excluded.apply_to_shipping,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(&code)
    .bind(coupon.discount_type)
    .bind(coupon.discount_value)
    .bind(coupon.min_purchase_amount)
    .bind(coupon.max_discount_amount)
    .bind(coupon.usage_limit)
    .bind(coupon.valid_from)
    .bind(coupon.valid_until)
    .bind(coupon.rules.first_time_purchase_only)
    .bind(coupon.rules.once_per_account)
    .bind(coupon.rules.apply_to_shipping)
    .bind(coupon.is_active)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Coupon {code} saved");
    Ok(coupon)
}

pub async fn has_used_coupon(code: &str, user_id: &str, conn: &mut SqliteConnection) -> Result<bool, StoreError> {
    let used: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM coupon_usages WHERE code = $1 AND user_id = $2)")
            .bind(normalize_code(code))
            .bind(user_id)
            .fetch_one(conn)
            .await?;
    Ok(used)
}

/// Bumps `used_count` only if the usage limit still allows it. Returns `false` if the limit has been reached (or the
/// coupon has disappeared).
pub async fn try_increment_usage(code: &str, conn: &mut SqliteConnection) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
            UPDATE coupons SET used_count = used_count + 1, updated_at = $2
            WHERE code = $1 AND (usage_limit IS NULL OR used_count < usage_limit)
        "#,
    )
    .bind(normalize_code(code))
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn record_usage(
    code: &str,
    user_id: &str,
    order_id: &OrderId,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), StoreError> {
    sqlx::query("INSERT OR IGNORE INTO coupon_usages (code, user_id, order_id, created_at) VALUES ($1, $2, $3, $4)")
        .bind(normalize_code(code))
        .bind(user_id)
        .bind(order_id.as_str())
        .bind(at)
        .execute(conn)
        .await?;
    Ok(())
}
