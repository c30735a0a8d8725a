use std::time::Duration;

use chrono::Utc;
use kk_order_engine::{db_types::OrderId, CheckoutDatabase, PaymentGateway, ReconciliationApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

use crate::integrations::razorpay::RazorpayGateway;

/// Starts the reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `interval`, pending orders that have been waiting too long are checked against the gateway. Captured payments
/// are applied, and orders abandoned without a payment are cancelled.
pub fn start_reconciliation_worker(
    api: ReconciliationApi<SqliteDatabase, RazorpayGateway>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        // The first tick completes immediately. Give the server a moment to start before the first sweep.
        timer.tick().await;
        info!("🔁️ Reconciliation worker started. Sweeping every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            run_sweep(&api).await;
        }
    })
}

pub async fn run_sweep<B, G>(api: &ReconciliationApi<B, G>)
where
    B: CheckoutDatabase,
    G: PaymentGateway,
{
    debug!("🔁️ Running stale order sweep");
    match api.sweep_stale_orders(Utc::now()).await {
        Ok(report) => {
            if !report.confirmed.is_empty() {
                debug!("🔁️ Confirmed by sweep: {}", order_list(&report.confirmed));
            }
            if !report.cancelled.is_empty() {
                debug!("🔁️ Cancelled as abandoned: {}", order_list(&report.cancelled));
            }
            if !report.skipped.is_empty() {
                warn!("🔁️ Could not determine the payment state of: {}", order_list(&report.skipped));
            }
        },
        Err(e) => error!("🔁️ Error running stale order sweep: {e}"),
    }
}

fn order_list(orders: &[OrderId]) -> String {
    orders.iter().map(OrderId::as_str).collect::<Vec<&str>>().join(", ")
}
