use std::{env, fmt::Display, str::FromStr};

use chrono::Duration;
use kk_common::{parse_boolean_flag, Paise, Secret};
use kk_order_engine::EngineConfig;
use log::*;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use razorpay_tools::RazorpayConfig;

use crate::errors::ServerError;

const DEFAULT_KK_HOST: &str = "127.0.0.1";
const DEFAULT_KK_PORT: u16 = 8360;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;
const DEFAULT_COD_TOKEN_RUPEES: i64 = 100;
const DEFAULT_RETURN_WINDOW_DAYS: i64 = 7;
const DEFAULT_STALE_ORDER_MINUTES: i64 = 30;
const DEFAULT_ABANDONED_ORDER_HOURS: i64 = 24;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    pub razorpay: RazorpayConfig,
    /// Signs the body of payment webhooks (`X-Razorpay-Signature`).
    pub payment_webhook_secret: Secret<String>,
    /// Signs the body of shipping partner webhooks (`X-Shipping-Signature`).
    pub shipping_webhook_secret: Secret<String>,
    /// If false, webhook signatures are not checked at all. **DANGER**
    pub hmac_checks: bool,
    pub engine: EngineConfig,
    /// Time between two runs of the reconciliation sweep.
    pub reconcile_interval: std::time::Duration,
    /// If set, order events are POSTed to this URL.
    pub notification_url: Option<String>,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_KK_HOST.to_string(),
            port: DEFAULT_KK_PORT,
            database_url: String::default(),
            auth: AuthConfig::default(),
            razorpay: RazorpayConfig::default(),
            payment_webhook_secret: Secret::default(),
            shipping_webhook_secret: Secret::default(),
            hmac_checks: true,
            engine: EngineConfig::default(),
            reconcile_interval: std::time::Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            notification_url: None,
            use_x_forwarded_for: false,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("KK_HOST").ok().unwrap_or_else(|| DEFAULT_KK_HOST.into());
        let port = parse_or_default("KK_PORT", env::var("KK_PORT").ok(), DEFAULT_KK_PORT);
        let database_url = env::var("KK_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ KK_DATABASE_URL is not set. Please set it to the URL for the order database.");
            String::default()
        });
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to the \
                 default configuration."
            );
            AuthConfig::default()
        });
        let razorpay = RazorpayConfig::new_from_env_or_default();
        let payment_webhook_secret = secret_from_env("KK_RAZORPAY_WEBHOOK_SECRET");
        let shipping_webhook_secret = secret_from_env("KK_SHIPPING_WEBHOOK_SECRET");
        let hmac_checks = parse_boolean_flag(env::var("KK_WEBHOOK_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!("🚨️ Webhook signature checks are DISABLED. Anyone can mark orders as paid or delivered.");
        }
        let engine = engine_config_from_env();
        let interval = parse_or_default(
            "KK_RECONCILE_INTERVAL_SECS",
            env::var("KK_RECONCILE_INTERVAL_SECS").ok(),
            DEFAULT_RECONCILE_INTERVAL_SECS,
        )
        .max(1);
        let notification_url = env::var("KK_NOTIFICATION_URL").ok().filter(|s| !s.trim().is_empty());
        match &notification_url {
            Some(url) => info!("🪛️ Order notifications will be sent to {url}"),
            None => info!("🪛️ KK_NOTIFICATION_URL is not set. Order notifications will only be logged."),
        }
        let use_x_forwarded_for = parse_boolean_flag(env::var("KK_USE_X_FORWARDED_FOR").ok(), false);
        Self {
            host,
            port,
            database_url,
            auth,
            razorpay,
            payment_webhook_secret,
            shipping_webhook_secret,
            hmac_checks,
            engine,
            reconcile_interval: std::time::Duration::from_secs(interval),
            notification_url,
            use_x_forwarded_for,
        }
    }
}

fn secret_from_env(name: &str) -> Secret<String> {
    let value = env::var(name).ok().unwrap_or_else(|| {
        error!("🪛️ {name} is not set. Webhooks signed with this secret will be rejected until it is configured.");
        String::default()
    });
    Secret::new(value)
}

/// Parses an optional configuration value, logging and falling back to `default` if it is missing or invalid.
pub fn parse_or_default<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match value {
        None => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
    }
}

/// Like [`parse_or_default`], for values that must be strictly positive.
fn positive_or_default(name: &str, value: Option<String>, default: i64) -> i64 {
    let v = parse_or_default(name, value, default);
    if v > 0 {
        v
    } else {
        warn!("🪛️ {name} must be positive. Using the default, {default}, instead.");
        default
    }
}

fn amount_or_default(name: &str, value: Option<String>, default: Paise) -> Paise {
    let amount = match value {
        None => return default,
        Some(s) => s.parse::<Paise>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid amount for {name}. {e} Using the default, {default}, instead.");
            default
        }),
    };
    if amount.value() < 0 {
        warn!("🪛️ {name} cannot be negative. Using the default, {default}, instead.");
        return default;
    }
    amount
}

/// Reads the business rules the engine needs. Amounts are given in rupees, e.g. `KK_COD_SURCHARGE=49.50`.
pub fn engine_config_from_env() -> EngineConfig {
    let defaults = EngineConfig::default();
    let cod_token_amount = amount_or_default(
        "KK_COD_TOKEN_AMOUNT",
        env::var("KK_COD_TOKEN_AMOUNT").ok(),
        Paise::from_rupees(DEFAULT_COD_TOKEN_RUPEES),
    );
    let cod_surcharge = amount_or_default("KK_COD_SURCHARGE", env::var("KK_COD_SURCHARGE").ok(), Paise::zero());
    let return_days =
        positive_or_default("KK_RETURN_WINDOW_DAYS", env::var("KK_RETURN_WINDOW_DAYS").ok(), DEFAULT_RETURN_WINDOW_DAYS);
    let stale_minutes = positive_or_default(
        "KK_STALE_ORDER_MINUTES",
        env::var("KK_STALE_ORDER_MINUTES").ok(),
        DEFAULT_STALE_ORDER_MINUTES,
    );
    let abandoned_hours = positive_or_default(
        "KK_ABANDONED_ORDER_HOURS",
        env::var("KK_ABANDONED_ORDER_HOURS").ok(),
        DEFAULT_ABANDONED_ORDER_HOURS,
    );
    let config = EngineConfig {
        cod_token_amount,
        cod_surcharge,
        return_window: Duration::days(return_days),
        stale_after: Duration::minutes(stale_minutes),
        abandon_after: Duration::hours(abandoned_hours),
        ..defaults
    };
    info!(
        "🪛️ COD token {}, COD surcharge {}, return window {return_days} days, stale after {stale_minutes} min, \
         abandoned after {abandoned_hours} h",
        config.cod_token_amount, config.cod_surcharge
    );
    config
}

//-------------------------------------------------  AuthConfig  -------------------------------------------------------
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// The HS256 secret shared with the service that issues access tokens.
    pub jwt_secret: Secret<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        warn!(
            "🚨️🚨️🚨️ The JWT secret has not been set. I'm using a random value for this session. No token issued \
             elsewhere will be accepted. DO NOT operate on production like this. 🚨️🚨️🚨️"
        );
        let secret: String = thread_rng().sample_iter(&Alphanumeric).take(48).map(char::from).collect();
        Self { jwt_secret: Secret::new(secret) }
    }
}

impl AuthConfig {
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self { jwt_secret: Secret::new(secret.into()) }
    }

    pub fn try_from_env() -> Result<Self, ServerError> {
        let secret =
            env::var("KK_JWT_SECRET").map_err(|e| ServerError::ConfigurationError(format!("{e} [KK_JWT_SECRET]")))?;
        if secret.len() < 32 {
            return Err(ServerError::ConfigurationError(
                "KK_JWT_SECRET must be at least 32 characters long".to_string(),
            ));
        }
        Ok(Self::new(secret))
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that route handlers may need. Keep this small and free of secrets.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for }
    }
}
