pub mod binance;
pub mod rate_limiter;
pub mod types;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

pub use binance::BinanceClient;
pub use rate_limiter::{RateLimitConfig, RateLimiter, RateLimiterStats};
pub use types::*;

/// Outcome of a failed exchange call, split the way callers branch on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// The order no longer exists (filled, cancelled or never known).
    #[error("order not found")]
    NotFound,
    /// Network, timeout, rate limit or server error; safe to retry later.
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_order(&self, symbol: &str, order_id: i64) -> Result<OrderSnapshot, ExchangeError>;

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<(), ExchangeError>;

    async fn place_limit_sell(&self, order: &LimitSellRequest) -> Result<PlacedOrder, ExchangeError>;

    async fn current_price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;
}
