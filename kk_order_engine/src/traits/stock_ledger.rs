use crate::{
    db_types::{ProductId, StockLevel},
    traits::{StockLine, StoreError},
};

/// Per-size inventory. Quantities never go below zero.
#[allow(async_fn_in_trait)]
pub trait StockLedger: Clone {
    /// Read-only check. Nothing is reserved, so a `true` here is advisory until the decrement at payment commit.
    async fn check_availability(&self, product_id: &ProductId, size: &str, quantity: i64) -> Result<bool, StoreError>;

    /// The current quantity on hand, or `None` if the product/size pair is not stocked at all.
    async fn stock_level(&self, product_id: &ProductId, size: &str) -> Result<Option<i64>, StoreError>;

    /// Removes `quantity` units with a single conditional update. Returns [`StoreError::InsufficientStock`] and leaves
    /// the ledger untouched if fewer than `quantity` units are available.
    async fn decrement_stock(&self, product_id: &ProductId, size: &str, quantity: i64) -> Result<(), StoreError>;

    /// Decrements every line, or none of them. On failure the error lists every line that was short.
    async fn decrement_lines(&self, lines: &[StockLine]) -> Result<(), StoreError>;

    /// Puts units back after a cancellation or a return.
    async fn increment_stock(&self, product_id: &ProductId, size: &str, quantity: i64) -> Result<(), StoreError>;

    async fn stock_for_product(&self, product_id: &ProductId) -> Result<Vec<StockLevel>, StoreError>;

    /// Overwrites the quantity for a product/size pair. Used by inventory tooling and test fixtures.
    async fn set_stock(&self, product_id: &ProductId, size: &str, quantity: i64) -> Result<StockLevel, StoreError>;
}
