use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::error::{Result, TrailingError};
use crate::trailing::TrailParameters;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub database: DatabaseConfig,
    pub trailing: TrailingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    pub recv_window_ms: u64,
    pub request_timeout_secs: u64,
    /// Request weight allowed per rolling minute, already below the published limit.
    pub max_weight_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrailingConfig {
    /// Fractional rise over the current sell price required before trailing (0.005 = 0.5%).
    pub step_threshold: Decimal,
    /// Fractional discount from the market price for the new sell price (0.003 = 0.3%).
    pub buffer: Decimal,
    pub poll_interval_secs: u64,
    /// User whose exchange credentials open the trading session.
    pub account_user_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// When set, a daily rotating log file is written here as well as stdout.
    #[serde(default)]
    pub dir: Option<String>,
}

impl Config {
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Layering: defaults, `default.toml`, `<TRAILING_ENV>.toml`, then
    /// `TRAILING__SECTION__KEY` environment variables.
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let config_dir = config_dir.as_ref();
        let env_name = std::env::var("TRAILING_ENV").unwrap_or_else(|_| "development".to_string());

        ConfigBuilder::builder()
            .set_default("exchange.base_url", "https://api.binance.com")?
            .set_default("exchange.recv_window_ms", 5000)?
            .set_default("exchange.request_timeout_secs", 10)?
            .set_default("exchange.max_weight_per_minute", 960)?
            .set_default("database.url", "sqlite://trailing.db?mode=rwc")?
            .set_default("database.max_connections", 5)?
            .set_default("trailing.step_threshold", "0.005")?
            .set_default("trailing.buffer", "0.003")?
            .set_default("trailing.poll_interval_secs", 30)?
            .set_default("trailing.account_user_id", 1)?
            .set_default("logging.level", "info")?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env_name))).required(false))
            .add_source(
                Environment::with_prefix("TRAILING")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.exchange.api_key.trim().is_empty() || self.exchange.api_secret.trim().is_empty() {
            return Err(TrailingError::Configuration(
                "exchange api_key and api_secret must be set".to_string(),
            ));
        }
        if self.exchange.max_weight_per_minute == 0 {
            return Err(TrailingError::Configuration(
                "exchange.max_weight_per_minute must be positive".to_string(),
            ));
        }
        if self.trailing.poll_interval_secs == 0 {
            return Err(TrailingError::Configuration(
                "trailing.poll_interval_secs must be positive".to_string(),
            ));
        }
        self.trailing.parameters()?;
        Ok(())
    }
}

impl ExchangeConfig {
    /// Replace the configured credentials with a user's own, when the user has both.
    pub fn with_credentials(mut self, api_key: Option<&str>, api_secret: Option<&str>) -> Self {
        if let (Some(key), Some(secret)) = (api_key, api_secret) {
            if !key.is_empty() && !secret.is_empty() {
                self.api_key = key.to_string();
                self.api_secret = secret.to_string();
            }
        }
        self
    }
}

impl TrailingConfig {
    pub fn parameters(&self) -> Result<TrailParameters> {
        TrailParameters::new(self.step_threshold, self.buffer)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
