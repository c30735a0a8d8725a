use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{ProductId, StockLevel},
    traits::{StockLine, StockShortfall, StoreError},
};

pub async fn stock_level(
    product_id: &ProductId,
    size: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, StoreError> {
    let quantity = sqlx::query_scalar("SELECT quantity FROM product_stock WHERE product_id = $1 AND size = $2")
        .bind(product_id.as_str())
        .bind(size)
        .fetch_optional(conn)
        .await?;
    Ok(quantity)
}

pub async fn stock_for_product(
    product_id: &ProductId,
    conn: &mut SqliteConnection,
) -> Result<Vec<StockLevel>, StoreError> {
    let levels = sqlx::query_as(
        "SELECT product_id, size, quantity FROM product_stock WHERE product_id = $1 ORDER BY size ASC",
    )
    .bind(product_id.as_str())
    .fetch_all(conn)
    .await?;
    Ok(levels)
}

/// Conditional decrement. Zero rows affected means the stock was insufficient (or the size does not exist), in
/// which case nothing was written.
pub async fn try_decrement(
    product_id: &ProductId,
    size: &str,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, StoreError> {
    if quantity <= 0 {
        return Err(StoreError::InvalidInput(format!("Cannot decrement stock by {quantity}")));
    }
    let result = sqlx::query(
        r#"
            UPDATE product_stock SET quantity = quantity - $1, updated_at = CURRENT_TIMESTAMP
            WHERE product_id = $2 AND size = $3 AND quantity >= $1
        "#,
    )
    .bind(quantity)
    .bind(product_id.as_str())
    .bind(size)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn decrement(
    product_id: &ProductId,
    size: &str,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), StoreError> {
    if try_decrement(product_id, size, quantity, conn).await? {
        trace!("🗃️ Stock for {product_id}/{size} decremented by {quantity}");
        return Ok(());
    }
    let available = stock_level(product_id, size, conn).await?.unwrap_or(0);
    let shortfall = StockShortfall { product_id: product_id.clone(), size: size.to_string(), requested: quantity, available };
    Err(StoreError::InsufficientStock(vec![shortfall]))
}

/// Decrements every line on `conn`, carrying on past failures so that the error lists every short line. Lines that
/// did succeed are NOT undone here: callers run this inside a transaction or savepoint and roll it back on error.
pub async fn decrement_lines(lines: &[StockLine], conn: &mut SqliteConnection) -> Result<(), StoreError> {
    let mut shortfalls = vec![];
    for line in lines {
        if let Err(e) = decrement(&line.product_id, &line.size, line.quantity, conn).await {
            match e {
                StoreError::InsufficientStock(mut s) => shortfalls.append(&mut s),
                e => return Err(e),
            }
        }
    }
    if shortfalls.is_empty() {
        Ok(())
    } else {
        Err(StoreError::InsufficientStock(shortfalls))
    }
}

pub async fn increment(
    product_id: &ProductId,
    size: &str,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), StoreError> {
    if quantity <= 0 {
        return Err(StoreError::InvalidInput(format!("Cannot increment stock by {quantity}")));
    }
    sqlx::query(
        r#"
            INSERT INTO product_stock (product_id, size, quantity) VALUES ($1, $2, $3)
            ON CONFLICT (product_id, size) DO UPDATE SET
                quantity = quantity + excluded.quantity,
                updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(product_id.as_str())
    .bind(size)
    .bind(quantity)
    .execute(conn)
    .await?;
    trace!("🗃️ Stock for {product_id}/{size} incremented by {quantity}");
    Ok(())
}

pub async fn increment_lines(lines: &[StockLine], conn: &mut SqliteConnection) -> Result<(), StoreError> {
    for line in lines {
        increment(&line.product_id, &line.size, line.quantity, conn).await?;
    }
    Ok(())
}

pub async fn set_stock(
    product_id: &ProductId,
    size: &str,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<StockLevel, StoreError> {
    if quantity < 0 {
        return Err(StoreError::InvalidInput(format!("Stock cannot be negative ({quantity})")));
    }
    let level = sqlx::query_as(
        r#"
            INSERT INTO product_stock (product_id, size, quantity) VALUES ($1, $2, $3)
            ON CONFLICT (product_id, size) DO UPDATE SET
                quantity = excluded.quantity,
                updated_at = CURRENT_TIMESTAMP
            RETURNING product_id, size, quantity;
        "#,
    )
    .bind(product_id.as_str())
    .bind(size)
    .bind(quantity)
    .fetch_one(conn)
    .await?;
    Ok(level)
}
