//! Environment-driven application configuration.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default)]
    pub dark_pool_enabled: bool,

    #[serde(default = "default_min_order_size")]
    pub min_order_size: String,
    #[serde(default = "default_max_order_size")]
    pub max_order_size: String,
    #[serde(default = "default_min_price")]
    pub min_price: String,
    #[serde(default = "default_max_price")]
    pub max_price: String,
    #[serde(default = "default_price_deviation_pct")]
    pub price_deviation_pct: String,
    #[serde(default = "default_max_order_value")]
    pub max_order_value: String,
    #[serde(default = "default_max_position_qty")]
    pub max_position_qty: String,

    #[serde(default)]
    pub auth_disabled: bool,

    #[serde(default = "default_match_cycle_interval_ms")]
    pub match_cycle_interval_ms: u64,
}

fn default_environment() -> String {
    "development".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_symbols() -> Vec<String> {
    vec!["AAPL".to_string(), "MSFT".to_string(), "GOOG".to_string()]
}
fn default_min_order_size() -> String {
    "1".to_string()
}
fn default_max_order_size() -> String {
    "100000".to_string()
}
fn default_min_price() -> String {
    "0.01".to_string()
}
fn default_max_price() -> String {
    "1000000".to_string()
}
fn default_price_deviation_pct() -> String {
    "5".to_string()
}
fn default_max_order_value() -> String {
    "1000000".to_string()
}
fn default_max_position_qty() -> String {
    "50000".to_string()
}
fn default_match_cycle_interval_ms() -> u64 {
    50
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults. `.env` is applied by the caller before this runs.
    pub fn load() -> Result<Self, config::ConfigError> {
        let raw = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .list_separator(","),
            )
            .build()?;

        match raw.try_deserialize::<Self>() {
            Ok(cfg) => Ok(cfg),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn is_auth_disabled(&self) -> bool {
        self.auth_disabled || self.environment == "development"
    }

    pub fn min_order_size(&self) -> Decimal {
        Decimal::from_str(&self.min_order_size).unwrap_or(Decimal::ONE)
    }

    pub fn max_order_size(&self) -> Decimal {
        Decimal::from_str(&self.max_order_size).unwrap_or(Decimal::new(100_000, 0))
    }

    pub fn min_price(&self) -> Decimal {
        Decimal::from_str(&self.min_price).unwrap_or(Decimal::new(1, 2))
    }

    pub fn max_price(&self) -> Decimal {
        Decimal::from_str(&self.max_price).unwrap_or(Decimal::new(1_000_000, 0))
    }

    pub fn price_deviation_pct(&self) -> Decimal {
        Decimal::from_str(&self.price_deviation_pct).unwrap_or(Decimal::new(5, 0))
    }

    pub fn max_order_value(&self) -> Decimal {
        Decimal::from_str(&self.max_order_value).unwrap_or(Decimal::new(1_000_000, 0))
    }

    pub fn max_position_qty(&self) -> Decimal {
        Decimal::from_str(&self.max_position_qty).unwrap_or(Decimal::new(50_000, 0))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            port: default_port(),
            redis_url: default_redis_url(),
            symbols: default_symbols(),
            dark_pool_enabled: true,
            min_order_size: default_min_order_size(),
            max_order_size: default_max_order_size(),
            min_price: default_min_price(),
            max_price: default_max_price(),
            price_deviation_pct: default_price_deviation_pct(),
            max_order_value: default_max_order_value(),
            max_position_qty: default_max_position_qty(),
            auth_disabled: false,
            match_cycle_interval_ms: default_match_cycle_interval_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.min_order_size(), Decimal::ONE);
        assert!(cfg.max_order_size() > cfg.min_order_size());
        assert!(cfg.dark_pool_enabled);
    }
}
