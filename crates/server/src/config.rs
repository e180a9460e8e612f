//! Application configuration loaded from environment variables.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use coordinator::CoordinatorConfig;
use lock::LockConfig;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `0.0.0.0`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `ORDER_PAYMENT_TIMEOUT_MINUTES` (default `30`)
/// - `ORDER_AUTO_CONFIRM_DAYS` (default `7`)
/// - `ORDER_SWEEP_INTERVAL_SECS`: payment-timeout sweep period (default `300`)
/// - `ORDER_NUMBER_PREFIX` (default `ORD`)
/// - `LOCK_WAIT_MILLIS`: bounded wait for per-order locks (default `5000`)
/// - `REDIS_URL`: coordination store, honoured with the `redis` feature
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub payment_timeout_minutes: i64,
    pub auto_confirm_days: i64,
    pub sweep_interval_secs: u64,
    pub order_no_prefix: String,
    pub lock_wait_millis: u64,
    pub redis_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Self {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Builds a config from any key lookup. Unparseable values fall back
    /// to the default for that key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT") {
                Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => defaults.log_format,
            },
            payment_timeout_minutes: parse_var(&lookup, "ORDER_PAYMENT_TIMEOUT_MINUTES")
                .filter(|m: &i64| *m > 0)
                .unwrap_or(defaults.payment_timeout_minutes),
            auto_confirm_days: parse_var(&lookup, "ORDER_AUTO_CONFIRM_DAYS")
                .filter(|d: &i64| *d > 0)
                .unwrap_or(defaults.auto_confirm_days),
            sweep_interval_secs: parse_var(&lookup, "ORDER_SWEEP_INTERVAL_SECS")
                .filter(|s: &u64| *s > 0)
                .unwrap_or(defaults.sweep_interval_secs),
            order_no_prefix: lookup("ORDER_NUMBER_PREFIX")
                .filter(|p| !p.is_empty())
                .unwrap_or(defaults.order_no_prefix),
            lock_wait_millis: parse_var(&lookup, "LOCK_WAIT_MILLIS").unwrap_or(defaults.lock_wait_millis),
            redis_url: lookup("REDIS_URL").filter(|u| !u.is_empty()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let mut config = CoordinatorConfig::default()
            .with_payment_timeout(chrono::Duration::minutes(self.payment_timeout_minutes))
            .with_auto_confirm_after(chrono::Duration::days(self.auto_confirm_days))
            .with_order_no_prefix(self.order_no_prefix.clone());
        config.timeout_sweep_interval = Duration::from_secs(self.sweep_interval_secs);
        config
    }

    pub fn lock_config(&self) -> LockConfig {
        LockConfig::default().with_wait(Duration::from_millis(self.lock_wait_millis))
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            payment_timeout_minutes: 30,
            auto_confirm_days: 7,
            sweep_interval_secs: 300,
            order_no_prefix: "ORD".to_string(),
            lock_wait_millis: 5000,
            redis_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.payment_timeout_minutes, 30);
        assert_eq!(config.auto_confirm_days, 7);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = Config::from_map(&HashMap::new());
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.order_no_prefix, "ORD");
        assert_eq!(config.lock_wait_millis, 5000);
    }

    #[test]
    fn test_values_read_from_map() {
        let config = Config::from_map(&vars(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("RUST_LOG", "debug"),
            ("LOG_FORMAT", "JSON"),
            ("ORDER_PAYMENT_TIMEOUT_MINUTES", "15"),
            ("ORDER_AUTO_CONFIRM_DAYS", "10"),
            ("ORDER_SWEEP_INTERVAL_SECS", "60"),
            ("ORDER_NUMBER_PREFIX", "SHOP"),
            ("LOCK_WAIT_MILLIS", "250"),
            ("REDIS_URL", "redis://localhost:6379"),
        ]));

        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.payment_timeout_minutes, 15);
        assert_eq!(config.auto_confirm_days, 10);
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.order_no_prefix, "SHOP");
        assert_eq!(config.lock_wait_millis, 250);
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = Config::from_map(&vars(&[
            ("PORT", "not-a-port"),
            ("ORDER_PAYMENT_TIMEOUT_MINUTES", "-5"),
            ("ORDER_SWEEP_INTERVAL_SECS", "0"),
            ("REDIS_URL", ""),
        ]));

        assert_eq!(config.port, 3000);
        assert_eq!(config.payment_timeout_minutes, 30);
        assert_eq!(config.sweep_interval_secs, 300);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_coordinator_config_carries_overrides() {
        let config = Config {
            payment_timeout_minutes: 15,
            auto_confirm_days: 3,
            sweep_interval_secs: 42,
            order_no_prefix: "SHOP".to_string(),
            ..Config::default()
        };

        let coordinator = config.coordinator_config();
        assert_eq!(coordinator.payment_timeout, chrono::Duration::minutes(15));
        assert_eq!(coordinator.auto_confirm_after, chrono::Duration::days(3));
        assert_eq!(coordinator.timeout_sweep_interval, Duration::from_secs(42));
        assert_eq!(coordinator.order_no_prefix, "SHOP");
    }

    #[test]
    fn test_lock_config_wait() {
        let config = Config {
            lock_wait_millis: 250,
            ..Config::default()
        };
        assert_eq!(config.lock_config().wait, Duration::from_millis(250));
    }
}
