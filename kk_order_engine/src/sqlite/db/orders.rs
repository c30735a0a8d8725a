use chrono::{DateTime, Utc};
use log::*;
use sqlx::{types::Json, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusType, PaymentStatus, TrackingInfo},
    traits::{is_unique_violation, OrderQueryFilter, PaymentCommit, StatusChange, StoreError},
};

/// Inserts a new `pending` order. This is not atomic on its own. Embed the call inside a transaction if it has to be,
/// and pass `&mut *tx` as the connection argument.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, StoreError> {
    let order_id = order.order_id.clone();
    let result = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                user_id,
                items,
                subtotal,
                discount_amount,
                coupon_code,
                cod_surcharge,
                amount,
                currency,
                prepaid_amount,
                status,
                payment_method,
                payment_status,
                gateway_order_id,
                gateway_key_id,
                shipping_address,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', $11, 'pending', $12, $13, $14, $15, $15)
            RETURNING *;
        "#,
    )
    .bind(order.order_id.as_str())
    .bind(order.user_id)
    .bind(Json(order.items))
    .bind(order.subtotal)
    .bind(order.discount_amount)
    .bind(order.coupon_code)
    .bind(order.cod_surcharge)
    .bind(order.amount)
    .bind(order.currency)
    .bind(order.prepaid_amount)
    .bind(order.payment_method)
    .bind(order.gateway_order_id)
    .bind(order.gateway_key_id)
    .bind(Json(order.shipping_address))
    .bind(order.created_at)
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => Ok(order),
        Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateOrder(order_id)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, StoreError> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_gateway_order_id(
    gateway_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StoreError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE gateway_order_id = $1")
        .bind(gateway_order_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in descending order.
pub async fn search_orders(filter: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, StoreError> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders WHERE 1 = 1");
    if let Some(user_id) = filter.user_id {
        builder.push(" AND user_id = ");
        builder.push_bind(user_id);
    }
    if !filter.statuses.is_empty() {
        builder.push(" AND status IN (");
        let mut statuses = builder.separated(", ");
        for status in filter.statuses {
            statuses.push_bind(status.to_string());
        }
        statuses.push_unseparated(")");
    }
    if let Some(method) = filter.payment_method {
        builder.push(" AND payment_method = ");
        builder.push_bind(method.to_string());
    }
    if let Some(flagged) = filter.needs_reconciliation {
        builder.push(" AND needs_reconciliation = ");
        builder.push_bind(flagged);
    }
    if let Some(after) = filter.created_after {
        builder.push(" AND created_at >= ");
        builder.push_bind(after);
    }
    if let Some(before) = filter.created_before {
        builder.push(" AND created_at < ");
        builder.push_bind(before);
    }
    builder.push(" ORDER BY created_at DESC, id DESC");
    if let Some(limit) = filter.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {}", orders.len());
    Ok(orders)
}

pub async fn count_paid_orders_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<i64, StoreError> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1 AND paid_at IS NOT NULL")
        .bind(user_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// Paid orders for `user_id` other than `order_id`.
pub async fn count_other_paid_orders(
    user_id: &str,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<i64, StoreError> {
    let count =
        sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1 AND order_id != $2 AND paid_at IS NOT NULL")
            .bind(user_id)
            .bind(order_id.as_str())
            .fetch_one(conn)
            .await?;
    Ok(count)
}

/// Distinguishes "the order does not exist" from "the order is not in the expected status" after a compare-and-set
/// update touched no rows.
async fn missed_update(order_id: &OrderId, expected: OrderStatusType, conn: &mut SqliteConnection) -> StoreError {
    match fetch_order(order_id, conn).await {
        Ok(Some(_)) => StoreError::StatusConflict { order_id: order_id.clone(), expected },
        Ok(None) => StoreError::OrderNotFound(order_id.clone()),
        Err(e) => e,
    }
}

/// Compare-and-set status update. Only writes if the order is still in `change.from`.
pub async fn update_order_status(change: StatusChange, conn: &mut SqliteConnection) -> Result<Order, StoreError> {
    let mut builder = QueryBuilder::new("UPDATE orders SET status = ");
    builder.push_bind(change.to.to_string());
    builder.push(", updated_at = ");
    builder.push_bind(change.at);
    match change.to {
        OrderStatusType::Delivered if change.from == OrderStatusType::Shipped => {
            builder.push(", delivered_at = ");
            builder.push_bind(change.at);
        },
        OrderStatusType::Cancelled => {
            builder.push(", cancelled_at = ");
            builder.push_bind(change.at);
        },
        OrderStatusType::ReturnRequested => {
            builder.push(", return_requested_at = ");
            builder.push_bind(change.at);
        },
        _ => {},
    }
    if let Some(request) = change.return_request {
        builder.push(", return_reason = ");
        builder.push_bind(request.reason);
        builder.push(", return_comments = ");
        builder.push_bind(request.comments);
    }
    if let Some(tracking) = change.tracking {
        push_tracking(&mut builder, tracking);
    }
    builder.push(" WHERE order_id = ");
    builder.push_bind(change.order_id.as_str());
    builder.push(" AND status = ");
    builder.push_bind(change.from.to_string());
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let order: Option<Order> = builder.build_query_as().fetch_optional(&mut *conn).await?;
    match order {
        Some(order) => {
            debug!("🗃️ Order {} moved from {} to {}", order.order_id, change.from, order.status);
            Ok(order)
        },
        None => Err(missed_update(&change.order_id, change.from, conn).await),
    }
}

/// Only fields that are present in `tracking` are overwritten.
fn push_tracking(builder: &mut QueryBuilder<'_, sqlx::Sqlite>, tracking: TrackingInfo) {
    if let Some(url) = tracking.tracking_url {
        builder.push(", tracking_url = ");
        builder.push_bind(url);
    }
    if let Some(courier) = tracking.courier_name {
        builder.push(", courier_name = ");
        builder.push_bind(courier);
    }
    if let Some(awb) = tracking.awb_code {
        builder.push(", awb_code = ");
        builder.push_bind(awb);
    }
    if let Some(eta) = tracking.estimated_delivery {
        builder.push(", estimated_delivery = ");
        builder.push_bind(eta);
    }
}

pub async fn update_tracking(
    order_id: &OrderId,
    tracking: TrackingInfo,
    conn: &mut SqliteConnection,
) -> Result<Order, StoreError> {
    let mut builder = QueryBuilder::new("UPDATE orders SET updated_at = ");
    builder.push_bind(Utc::now());
    push_tracking(&mut builder, tracking);
    builder.push(" WHERE order_id = ");
    builder.push_bind(order_id.as_str());
    builder.push(" RETURNING *");
    let order: Option<Order> = builder.build_query_as().fetch_optional(conn).await?;
    order.ok_or_else(|| StoreError::OrderNotFound(order_id.clone()))
}

/// The `pending → paid` compare-and-set. Returns `None` if the order was not pending.
///
/// A UNIQUE violation on `gateway_payment_id` means the payment was already applied to a different order.
pub async fn mark_paid(commit: &PaymentCommit, conn: &mut SqliteConnection) -> Result<Option<Order>, StoreError> {
    let result = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = 'paid',
                payment_status = 'completed',
                gateway_payment_id = $1,
                gateway_signature = COALESCE($2, gateway_signature),
                paid_at = $3,
                updated_at = $3
            WHERE order_id = $4 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(&commit.gateway_payment_id)
    .bind(&commit.gateway_signature)
    .bind(commit.at)
    .bind(commit.order_id.as_str())
    .fetch_optional(conn)
    .await;
    match result {
        Ok(order) => Ok(order),
        Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicatePayment(commit.gateway_payment_id.clone())),
        Err(e) => Err(e.into()),
    }
}

pub async fn set_stock_committed(
    order_id: &OrderId,
    committed: bool,
    conn: &mut SqliteConnection,
) -> Result<Order, StoreError> {
    let order: Option<Order> =
        sqlx::query_as("UPDATE orders SET stock_committed = $1 WHERE order_id = $2 RETURNING *")
            .bind(committed)
            .bind(order_id.as_str())
            .fetch_optional(conn)
            .await?;
    order.ok_or_else(|| StoreError::OrderNotFound(order_id.clone()))
}

pub async fn set_payment_status(
    order_id: &OrderId,
    status: PaymentStatus,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, StoreError> {
    let order: Option<Order> =
        sqlx::query_as("UPDATE orders SET payment_status = $1, updated_at = $2 WHERE order_id = $3 RETURNING *")
            .bind(status)
            .bind(at)
            .bind(order_id.as_str())
            .fetch_optional(conn)
            .await?;
    order.ok_or_else(|| StoreError::OrderNotFound(order_id.clone()))
}

/// Marks the payment as failed on a still-pending order. Anything else is returned unchanged.
pub async fn mark_payment_failed(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Order, StoreError> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET payment_status = 'failed', updated_at = $1
            WHERE order_id = $2 AND status = 'pending' AND payment_status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(Utc::now())
    .bind(order_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(order) => Ok(order),
        None => fetch_order(order_id, conn).await?.ok_or_else(|| StoreError::OrderNotFound(order_id.clone())),
    }
}

/// Sets the manual-review flag and appends `note` (one line per flagging) to the reconciliation note.
pub async fn flag_for_reconciliation(
    order_id: &OrderId,
    note: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, StoreError> {
    let order: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET
                needs_reconciliation = 1,
                reconciliation_note = CASE
                    WHEN reconciliation_note IS NULL OR reconciliation_note = '' THEN $1
                    ELSE reconciliation_note || char(10) || $1
                END,
                updated_at = $2
            WHERE order_id = $3
            RETURNING *;
        "#,
    )
    .bind(note)
    .bind(Utc::now())
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    warn!("🗃️ Order {order_id} flagged for reconciliation: {note}");
    order.ok_or_else(|| StoreError::OrderNotFound(order_id.clone()))
}
