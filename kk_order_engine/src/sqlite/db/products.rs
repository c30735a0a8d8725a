use sqlx::SqliteConnection;

use crate::{
    db_types::{CatalogProduct, ProductId},
    traits::StoreError,
};

pub async fn fetch_product(
    product_id: &ProductId,
    conn: &mut SqliteConnection,
) -> Result<Option<CatalogProduct>, StoreError> {
    let product = sqlx::query_as("SELECT product_id, name, price, image, is_active FROM products WHERE product_id = $1")
        .bind(product_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(product)
}

pub async fn upsert_product(product: CatalogProduct, conn: &mut SqliteConnection) -> Result<CatalogProduct, StoreError> {
    let product = sqlx::query_as(
        r#"
            INSERT INTO products (product_id, name, price, image, is_active) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (product_id) DO UPDATE SET
                name = excluded.name,
                price = excluded.price,
                image = excluded.image,
                is_active = excluded.is_active
            RETURNING product_id, name, price, image, is_active;
        "#,
    )
    .bind(product.product_id.as_str())
    .bind(product.name)
    .bind(product.price)
    .bind(product.image)
    .bind(product.is_active)
    .fetch_one(conn)
    .await?;
    Ok(product)
}
