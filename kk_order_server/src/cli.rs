use std::{env, env::VarError};

/// The server takes no arguments. Any argument prints the help text and the current configuration instead.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

// Secrets (JWT secret, API keys, webhook secrets) are deliberately absent from this list
const DISPLAY_ENVS: [&str; 15] = [
    "RUST_LOG",
    "KK_HOST",
    "KK_PORT",
    "KK_DATABASE_URL",
    "KK_RAZORPAY_BASE_URL",
    "KK_WEBHOOK_HMAC_CHECKS",
    "KK_GATEWAY_TIMEOUT_SECS",
    "KK_COD_TOKEN_AMOUNT",
    "KK_COD_SURCHARGE",
    "KK_RETURN_WINDOW_DAYS",
    "KK_STALE_ORDER_MINUTES",
    "KK_ABANDONED_ORDER_HOURS",
    "KK_RECONCILE_INTERVAL_SECS",
    "KK_NOTIFICATION_URL",
    "KK_USE_X_FORWARDED_FOR",
];

fn display_envs() {
    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
