//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use common::Money;
use domain::CommerceSettings;
use thiserror::Error;

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::Invalid {
                key: "LOG_FORMAT",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: Postgres URL; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `SHIPPING_FLAT_RATE_CENTS`: shipping per order (default: `0`)
/// - `PAYMENT_TTL_MINUTES`: how long a payment stays payable (default: `1440`)
/// - `DEFAULT_PAYMENT_METHOD`: (default: `"bank_transfer"`)
/// - `CACHE_TTL_SECS`: (default: `300`)
/// - `EXPIRY_SWEEP_SECS`: expiry sweep period, `0` disables it (default: `0`)
/// - `SERVICE_NAME`: reported in published events (default: `"order-service"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub shipping_flat_rate_cents: i64,
    pub payment_ttl_minutes: i64,
    pub default_payment_method: String,
    pub cache_ttl_secs: u64,
    pub expiry_sweep_secs: u64,
    pub service_name: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// Numeric values that do not parse fall back to their default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT") {
                Some(value) => value.parse()?,
                None => defaults.log_format,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            shipping_flat_rate_cents: parsed(&lookup, "SHIPPING_FLAT_RATE_CENTS")
                .unwrap_or(defaults.shipping_flat_rate_cents),
            payment_ttl_minutes: parsed(&lookup, "PAYMENT_TTL_MINUTES")
                .unwrap_or(defaults.payment_ttl_minutes),
            default_payment_method: lookup("DEFAULT_PAYMENT_METHOD")
                .unwrap_or(defaults.default_payment_method),
            cache_ttl_secs: parsed(&lookup, "CACHE_TTL_SECS").unwrap_or(defaults.cache_ttl_secs),
            expiry_sweep_secs: parsed(&lookup, "EXPIRY_SWEEP_SECS")
                .unwrap_or(defaults.expiry_sweep_secs),
            service_name: lookup("SERVICE_NAME").unwrap_or(defaults.service_name),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Period of the background expiry sweep, if enabled.
    pub fn expiry_sweep_period(&self) -> Option<Duration> {
        (self.expiry_sweep_secs > 0).then(|| Duration::from_secs(self.expiry_sweep_secs))
    }

    /// Settings handed to the domain services.
    pub fn commerce_settings(&self) -> CommerceSettings {
        CommerceSettings {
            shipping_flat_rate: Money::from_cents(self.shipping_flat_rate_cents),
            payment_ttl: chrono::Duration::minutes(self.payment_ttl_minutes),
            default_payment_method: self.default_payment_method.clone(),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            service_name: self.service_name.clone(),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        let settings = CommerceSettings::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            shipping_flat_rate_cents: settings.shipping_flat_rate.cents(),
            payment_ttl_minutes: settings.payment_ttl.num_minutes(),
            default_payment_method: settings.default_payment_method,
            cache_ttl_secs: settings.cache_ttl.as_secs(),
            expiry_sweep_secs: 0,
            service_name: settings.service_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert_eq!(config.payment_ttl_minutes, 1440);
        assert_eq!(config.default_payment_method, "bank_transfer");
        assert!(config.expiry_sweep_period().is_none());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("SHIPPING_FLAT_RATE_CENTS", "200"),
            ("EXPIRY_SWEEP_SECS", "60"),
        ])
        .unwrap();

        assert_eq!(config.addr(), "0.0.0.0:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/orders")
        );
        assert_eq!(config.expiry_sweep_period(), Some(Duration::from_secs(60)));
        assert_eq!(
            config.commerce_settings().shipping_flat_rate,
            Money::from_cents(200)
        );
    }

    #[test]
    fn test_unparseable_number_falls_back() {
        let config = from_pairs(&[("PORT", "eighty")]).unwrap();
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        assert!(from_pairs(&[("LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn test_blank_database_url_means_in_memory() {
        let config = from_pairs(&[("DATABASE_URL", "  ")]).unwrap();
        assert!(config.database_url.is_none());
    }
}
