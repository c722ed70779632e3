pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, DatabaseConfig, ExchangeConfig, LoggingConfig, TrailingConfig};
pub use error::{Result, TrailingError};
