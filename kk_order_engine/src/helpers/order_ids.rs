use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;

use crate::db_types::OrderId;

static RECEIPT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{5,39}$").unwrap());

/// Generates a human-friendly order id of the form `KK-20240517-7GQ2M4XA`.
pub fn generate_order_id(now: DateTime<Utc>) -> OrderId {
    let suffix = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect::<String>();
    OrderId(format!("KK-{}-{suffix}", now.format("%Y%m%d")))
}

/// Client-supplied receipts double as idempotency keys, so they are restricted to a safe alphabet and length.
pub fn is_valid_receipt(receipt: &str) -> bool {
    RECEIPT_REGEX.is_match(receipt)
}
