//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interaction are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool, or open a transaction when several
//! statements must succeed or fail together, and pass `&mut *tx` through without any other changes.
//!
//! Every write transaction starts with its write statement. SQLite takes the write lock on the first write, so a
//! transaction that reads first and writes later can fail with `SQLITE_BUSY` on the lock upgrade instead of waiting.
//!
//! Single-statement writes go through a transaction too. The connection worker can still be stepping a `RETURNING`
//! statement after its row has been handed back, so only the acknowledged commit makes the write visible to the other
//! connections in the pool.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod coupons;
pub mod orders;
pub mod products;
pub mod refunds;
pub mod stock;

const SQLITE_DB_URL: &str = "sqlite://data/kk_orders.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn db_url() -> String {
    let result = env::var("KK_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ KK_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

/// Opens a pool in WAL mode with a busy timeout, creating the database file if it does not exist.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
