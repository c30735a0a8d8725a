//! `SqliteDatabase` is a concrete implementation of an order engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{Connection, SqliteConnection, SqlitePool};

use super::db::{coupons, db_url, new_pool, orders, products, refunds, stock};
use crate::{
    db_types::{
        CatalogProduct,
        Coupon,
        NewCoupon,
        NewOrder,
        NewRefund,
        Order,
        OrderId,
        Paise,
        PaymentStatus,
        ProductId,
        Refund,
        StockLevel,
        TrackingInfo,
    },
    pricing::{check_coupon, CouponContext, CouponError},
    traits::{
        AnnulledOrder,
        CheckoutDatabase,
        CommitOutcome,
        CommittedPayment,
        CouponManagement,
        OrderAnnulment,
        OrderManagement,
        OrderQueryFilter,
        PaymentCommit,
        ProductCatalog,
        RefundManagement,
        RefundQueryFilter,
        StatusChange,
        StockLedger,
        StockLine,
        StoreError,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `KK_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date. Safe to call on every start-up.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Migration failed: {e}")))?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }
}

impl StockLedger for SqliteDatabase {
    async fn check_availability(&self, product_id: &ProductId, size: &str, quantity: i64) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let level = stock::stock_level(product_id, size, &mut conn).await?;
        Ok(level.map(|available| available >= quantity).unwrap_or(false))
    }

    async fn stock_level(&self, product_id: &ProductId, size: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        stock::stock_level(product_id, size, &mut conn).await
    }

    async fn decrement_stock(&self, product_id: &ProductId, size: &str, quantity: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        stock::decrement(product_id, size, quantity, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn decrement_lines(&self, lines: &[StockLine]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        stock::decrement_lines(lines, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn increment_stock(&self, product_id: &ProductId, size: &str, quantity: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        stock::increment(product_id, size, quantity, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn stock_for_product(&self, product_id: &ProductId) -> Result<Vec<StockLevel>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        stock::stock_for_product(product_id, &mut conn).await
    }

    async fn set_stock(&self, product_id: &ProductId, size: &str, quantity: i64) -> Result<StockLevel, StoreError> {
        let mut tx = self.pool.begin().await?;
        let level = stock::set_stock(product_id, size, quantity, &mut tx).await?;
        tx.commit().await?;
        Ok(level)
    }
}

impl ProductCatalog for SqliteDatabase {
    async fn fetch_product(&self, product_id: &ProductId) -> Result<Option<CatalogProduct>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        products::fetch_product(product_id, &mut conn).await
    }

    async fn upsert_product(&self, product: CatalogProduct) -> Result<CatalogProduct, StoreError> {
        let mut tx = self.pool.begin().await?;
        let product = products::upsert_product(product, &mut tx).await?;
        tx.commit().await?;
        Ok(product)
    }
}

impl CouponManagement for SqliteDatabase {
    async fn fetch_coupon(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        coupons::fetch_coupon(code, &mut conn).await
    }

    async fn upsert_coupon(&self, coupon: NewCoupon) -> Result<Coupon, StoreError> {
        let mut tx = self.pool.begin().await?;
        let coupon = coupons::upsert_coupon(coupon, &mut tx).await?;
        tx.commit().await?;
        Ok(coupon)
    }

    async fn has_used_coupon(&self, code: &str, user_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        coupons::has_used_coupon(code, user_id, &mut conn).await
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} has been saved in the DB with id {}", order.order_id, order.id);
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(order_id, &mut conn).await
    }

    async fn fetch_order_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_gateway_order_id(gateway_order_id, &mut conn).await
    }

    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::search_orders(filter, &mut conn).await
    }

    async fn count_paid_orders_for_user(&self, user_id: &str) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::count_paid_orders_for_user(user_id, &mut conn).await
    }

    async fn update_order_status(&self, change: StatusChange) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::update_order_status(change, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn update_tracking(&self, order_id: &OrderId, tracking: TrackingInfo) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::update_tracking(order_id, tracking, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn mark_payment_failed(&self, order_id: &OrderId) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::mark_payment_failed(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn flag_for_reconciliation(&self, order_id: &OrderId, note: &str) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::flag_for_reconciliation(order_id, note, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }
}

impl CheckoutDatabase for SqliteDatabase {
    async fn commit_payment(&self, commit: PaymentCommit) -> Result<CommitOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let Some(paid) = orders::mark_paid(&commit, &mut tx).await? else {
            let existing =
                orders::fetch_order(&commit.order_id, &mut tx).await?.ok_or(StoreError::OrderNotFound(commit.order_id))?;
            tx.rollback().await?;
            let outcome = if existing.gateway_payment_id.as_deref() == Some(commit.gateway_payment_id.as_str()) {
                trace!("🗃️ Payment {} was already applied to {}", commit.gateway_payment_id, existing.order_id);
                CommitOutcome::AlreadyPaid(existing)
            } else {
                CommitOutcome::NotPending(existing)
            };
            return Ok(outcome);
        };
        let mut order = paid;
        let mut notes = vec![];

        let amount_mismatch = commit.amount_captured.map(|amount| amount != order.prepaid_amount).unwrap_or(false);
        if let Some(amount) = commit.amount_captured.filter(|_| amount_mismatch) {
            notes.push(format!("Gateway captured {amount} but the order expected {}.", order.prepaid_amount));
        }

        // All lines or none, without losing the paid status if stock has run out
        let lines = order.items().iter().map(StockLine::from).collect::<Vec<_>>();
        let mut savepoint = tx.begin().await?;
        let stock_shortfalls = match stock::decrement_lines(&lines, &mut savepoint).await {
            Ok(()) => {
                savepoint.commit().await?;
                order = orders::set_stock_committed(&order.order_id, true, &mut tx).await?;
                vec![]
            },
            Err(StoreError::InsufficientStock(shortfalls)) => {
                savepoint.rollback().await?;
                let lines = shortfalls.iter().map(|s| s.to_string()).collect::<Vec<_>>().join("; ");
                notes.push(format!("Paid but stock could not be committed: {lines}."));
                shortfalls
            },
            Err(e) => return Err(e),
        };

        let mut coupon_rejected = None;
        if let Some(code) = order.coupon_code.clone() {
            let mut recheck = recheck_coupon(&order, commit.at, &mut tx).await?;
            if recheck.is_ok() && !coupons::try_increment_usage(&code, &mut tx).await? {
                recheck = Err(CouponError::UsageLimitReached { code: code.clone() });
            }
            match recheck {
                Ok(()) => coupons::record_usage(&code, &order.user_id, &order.order_id, commit.at, &mut tx).await?,
                Err(e) => {
                    notes.push(format!("{e} at the time of payment. {} discount was honoured.", order.discount_amount));
                    coupon_rejected = Some(e);
                },
            }
        }

        if !notes.is_empty() {
            order = orders::flag_for_reconciliation(&order.order_id, &notes.join(" "), &mut tx).await?;
        }
        tx.commit().await?;
        debug!(
            "🗃️ Payment {} committed for {} via {}. Stock committed: {}",
            commit.gateway_payment_id, order.order_id, commit.source, order.stock_committed
        );
        Ok(CommitOutcome::Paid(CommittedPayment { order, stock_shortfalls, coupon_rejected, amount_mismatch }))
    }
}

/// Runs every coupon rule again inside the commit transaction. `order` is already marked paid at this point, so it is
/// left out of the user's paid order count.
async fn recheck_coupon(
    order: &Order,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Result<(), CouponError>, StoreError> {
    let Some(code) = order.coupon_code.as_deref() else {
        return Ok(Ok(()));
    };
    let Some(coupon) = coupons::fetch_coupon(code, conn).await? else {
        return Ok(Err(CouponError::NotFound { code: code.to_string() }));
    };
    let cart_total =
        if coupon.rules.apply_to_shipping { order.subtotal + order.cod_surcharge } else { order.subtotal };
    let already_used_by_user = coupons::has_used_coupon(code, &order.user_id, conn).await?;
    let prior_paid_orders = orders::count_other_paid_orders(&order.user_id, &order.order_id, conn).await?;
    let ctx = CouponContext { now: at, cart_total, already_used_by_user, prior_paid_orders };
    Ok(check_coupon(&coupon, &ctx).map(|_| ()))
}

impl RefundManagement for SqliteDatabase {
    async fn annul_order(&self, annulment: OrderAnnulment) -> Result<AnnulledOrder, StoreError> {
        let mut tx = self.pool.begin().await?;
        let change = StatusChange::new(annulment.order_id.clone(), annulment.from, annulment.to).at(annulment.at);
        let mut order = orders::update_order_status(change, &mut tx).await?;
        let stock_restored = order.stock_committed;
        if stock_restored {
            let lines = order.items().iter().map(StockLine::from).collect::<Vec<_>>();
            stock::increment_lines(&lines, &mut tx).await?;
            order = orders::set_stock_committed(&order.order_id, false, &mut tx).await?;
        }
        let refund = match annulment.refund {
            Some(refund) => Some(refunds::insert_refund(refund, annulment.at, &mut tx).await?),
            None => None,
        };
        if let Some(status) = annulment.payment_status {
            order = orders::set_payment_status(&order.order_id, status, annulment.at, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Order {} annulled as {}. Stock restored: {stock_restored}", order.order_id, order.status);
        Ok(AnnulledOrder { order, refund, stock_restored })
    }

    async fn record_refund(
        &self,
        refund: NewRefund,
        captured: Paise,
        payment_status: PaymentStatus,
    ) -> Result<(Order, Refund), StoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let order_id = refund.order_id.clone();
        let requested = refund.amount;
        let refund = refunds::insert_refund(refund, now, &mut tx).await?;
        let total = refunds::total_refunded(&order_id, &mut tx).await?;
        if total > captured {
            tx.rollback().await?;
            return Err(StoreError::RefundExceedsCaptured { order_id, captured, requested });
        }
        let order = orders::set_payment_status(&order_id, payment_status, now, &mut tx).await?;
        tx.commit().await?;
        Ok((order, refund))
    }

    async fn total_refunded(&self, order_id: &OrderId) -> Result<Paise, StoreError> {
        let mut conn = self.pool.acquire().await?;
        refunds::total_refunded(order_id, &mut conn).await
    }

    async fn fetch_refunds(&self, filter: RefundQueryFilter) -> Result<Vec<Refund>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        refunds::fetch_refunds(filter, &mut conn).await
    }
}
