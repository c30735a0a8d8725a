use std::time::Duration;

use log::*;

use crate::credentials::ApiCredentials;

pub const DEFAULT_RAZORPAY_BASE_URL: &str = "https://api.razorpay.com";
pub const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    /// Base URL of the API, without a trailing slash. Paths such as `/v1/orders` are appended to it.
    pub base_url: String,
    pub credentials: Vec<ApiCredentials>,
    /// Upper bound on every individual HTTP request made to the gateway.
    pub timeout: Duration,
}

impl Default for RazorpayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RAZORPAY_BASE_URL.to_string(),
            credentials: vec![],
            timeout: Duration::from_secs(DEFAULT_GATEWAY_TIMEOUT_SECS),
        }
    }
}

impl RazorpayConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("KK_RAZORPAY_BASE_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| {
                info!("🪛️ KK_RAZORPAY_BASE_URL not set, using {DEFAULT_RAZORPAY_BASE_URL}");
                DEFAULT_RAZORPAY_BASE_URL.to_string()
            });
        let credentials = match std::env::var("KK_RAZORPAY_KEYS") {
            Ok(s) => parse_credentials(&s),
            Err(_) => {
                warn!("🪛️ KK_RAZORPAY_KEYS not set. No online payments can be taken until it is configured.");
                vec![]
            },
        };
        let timeout = std::env::var("KK_GATEWAY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid KK_GATEWAY_TIMEOUT_SECS value '{s}': {e}. Using the default."))
                    .ok()
            })
            .unwrap_or(DEFAULT_GATEWAY_TIMEOUT_SECS);
        Self { base_url, credentials, timeout: Duration::from_secs(timeout) }
    }
}

/// Parses a comma separated list of `key_id:key_secret` pairs. Malformed entries are logged and skipped.
pub fn parse_credentials(s: &str) -> Vec<ApiCredentials> {
    s.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.split_once(':') {
            Some((id, secret)) if !id.trim().is_empty() && !secret.trim().is_empty() => {
                Some(ApiCredentials::new(id.trim(), secret.trim()))
            },
            _ => {
                warn!("🪛️ Ignoring malformed Razorpay credential entry. Expected 'key_id:key_secret'.");
                None
            },
        })
        .collect()
}
