use chrono::Duration;
use kk_common::INR_CURRENCY_CODE;

use crate::db_types::Paise;

/// Business rules shared by the engine APIs. The server fills this in from its environment configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub currency: String,
    /// The amount taken online to confirm a cash-on-delivery order.
    pub cod_token_amount: Paise,
    /// Added to the amount of COD orders.
    pub cod_surcharge: Paise,
    /// The smallest amount a gateway intent can be opened for.
    pub minimum_intent_amount: Paise,
    pub return_window: Duration,
    /// Pending orders older than this are checked against the gateway by the sweep.
    pub stale_after: Duration,
    /// Pending orders older than this with no captured payment are cancelled by the sweep.
    pub abandon_after: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency: INR_CURRENCY_CODE.to_string(),
            cod_token_amount: Paise::from_rupees(100),
            cod_surcharge: Paise::zero(),
            minimum_intent_amount: Paise::from_rupees(1),
            return_window: Duration::days(7),
            stale_after: Duration::minutes(30),
            abandon_after: Duration::hours(24),
        }
    }
}
