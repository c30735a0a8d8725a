use chrono::{DateTime, Utc};
use log::*;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewRefund, OrderId, Paise, Refund},
    traits::{RefundQueryFilter, StoreError},
};

pub async fn insert_refund(
    refund: NewRefund,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Refund, StoreError> {
    let refund: Refund = sqlx::query_as(
        r#"
            INSERT INTO refunds (
                order_id,
                gateway_refund_id,
                gateway_payment_id,
                amount,
                reason,
                kind,
                note,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(refund.order_id.as_str())
    .bind(refund.gateway_refund_id)
    .bind(refund.gateway_payment_id)
    .bind(refund.amount)
    .bind(refund.reason)
    .bind(refund.kind)
    .bind(refund.note)
    .bind(at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Refund #{} of {} recorded for order {}", refund.id, refund.amount, refund.order_id);
    Ok(refund)
}

pub async fn total_refunded(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Paise, StoreError> {
    let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM refunds WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_one(conn)
        .await?;
    Ok(Paise::from(total))
}

/// Fetches refunds according to the filter, newest first.
pub async fn fetch_refunds(filter: RefundQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Refund>, StoreError> {
    let mut builder = QueryBuilder::new("SELECT * FROM refunds WHERE 1 = 1");
    if let Some(order_id) = filter.order_id {
        builder.push(" AND order_id = ");
        builder.push_bind(order_id.0);
    }
    if let Some(kind) = filter.kind {
        builder.push(" AND kind = ");
        builder.push_bind(kind.to_string());
    }
    if let Some(since) = filter.since {
        builder.push(" AND created_at >= ");
        builder.push_bind(since);
    }
    if let Some(until) = filter.until {
        builder.push(" AND created_at <= ");
        builder.push_bind(until);
    }
    builder.push(" ORDER BY created_at DESC, id DESC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let refunds = builder.build_query_as::<Refund>().fetch_all(conn).await?;
    Ok(refunds)
}
