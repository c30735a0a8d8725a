use crate::{
    db_types::{CatalogProduct, ProductId},
    traits::StoreError,
};

/// Read access to the product catalog, which is owned by another service. Checkout only needs prices, names and
/// images to freeze onto an order.
#[allow(async_fn_in_trait)]
pub trait ProductCatalog: Clone {
    async fn fetch_product(&self, product_id: &ProductId) -> Result<Option<CatalogProduct>, StoreError>;

    /// Inserts or replaces a product. The catalog service writes through this when it syncs.
    async fn upsert_product(&self, product: CatalogProduct) -> Result<CatalogProduct, StoreError>;
}
