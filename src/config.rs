use std::time::Duration;

use once_cell::sync::Lazy;

use crate::billing::RecurringBillingConfig;

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// When set to a truthy value, allows the application to continue running even
/// if database migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| {
    std::env::var("ALLOW_MIGRATION_FAILURE")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});

/// key: billing-config -> due-payment scan cadence
pub static BILLING_SCAN_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("BILLING_SCAN_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(300)
});

/// key: billing-config -> automatic retries before a payment fails permanently
pub static BILLING_MAX_RETRY_ATTEMPTS: Lazy<u32> = Lazy::new(|| {
    std::env::var("BILLING_MAX_RETRY_ATTEMPTS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(3)
});

/// key: billing-config -> comma-separated retry delays in days, e.g. `1,3,7`
pub static BILLING_RETRY_DELAY_DAYS: Lazy<Vec<i64>> = Lazy::new(|| {
    std::env::var("BILLING_RETRY_DELAY_DAYS")
        .ok()
        .map(|value| {
            value
                .split(',')
                .filter_map(|raw| raw.trim().parse::<i64>().ok())
                .filter(|days| *days > 0)
                .collect::<Vec<_>>()
        })
        .filter(|delays| !delays.is_empty())
        .unwrap_or_else(|| vec![1, 3, 7])
});

/// key: billing-config -> per-charge gateway timeout
pub static GATEWAY_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("GATEWAY_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(30)
});

pub static BILLING_NOTIFY_ON_FAILURE: Lazy<bool> = Lazy::new(|| bool_env("BILLING_NOTIFY_ON_FAILURE", true));

pub static BILLING_NOTIFY_ON_SUCCESS: Lazy<bool> = Lazy::new(|| bool_env("BILLING_NOTIFY_ON_SUCCESS", false));

fn bool_env(key: &str, default_value: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(default_value)
}

/// Resolves the env statics into the explicit config value the engine takes.
/// The engine never reads the statics itself, so tests can build isolated
/// configs without environment leakage.
pub fn billing_config_from_env() -> RecurringBillingConfig {
    RecurringBillingConfig {
        max_retry_attempts: *BILLING_MAX_RETRY_ATTEMPTS,
        retry_delay_days: BILLING_RETRY_DELAY_DAYS.clone(),
        gateway_timeout: Duration::from_secs(*GATEWAY_TIMEOUT_SECS),
        notify_on_failure: *BILLING_NOTIFY_ON_FAILURE,
        notify_on_success: *BILLING_NOTIFY_ON_SUCCESS,
    }
}
