use thiserror::Error;

use crate::api::ExchangeError;

/// Errors raised while reconciling a single position.
///
/// None of these are fatal to the process: the polling loop logs them and
/// moves on to the next position.
#[derive(Debug, Error)]
pub enum TrailingError {
    /// Network failure, timeout or rate limit. Retried on the next poll.
    #[error("transient exchange error: {0}")]
    TransientExchange(String),

    /// The order was already filled or cancelled out-of-band.
    #[error("order {order_id} not found on exchange")]
    OrderNotFound { order_id: i64 },

    /// The exchange refused the request (balance, filters, bad parameters).
    #[error("exchange rejected request: {0}")]
    ExchangeRejected(String),

    /// The old sell order was cancelled but its replacement was not placed.
    /// The position has no live sell order until the next cycle re-places it.
    #[error("cancelled sell order {cancelled_order_id} but replacement failed: {reason}")]
    PartialTransition {
        cancelled_order_id: i64,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl TrailingError {
    /// Translate an exchange outcome for a call that targeted `order_id`.
    pub fn from_exchange(err: ExchangeError, order_id: i64) -> Self {
        match err {
            ExchangeError::NotFound => TrailingError::OrderNotFound { order_id },
            ExchangeError::Transient(reason) => TrailingError::TransientExchange(reason),
            ExchangeError::Rejected(reason) => TrailingError::ExchangeRejected(reason),
        }
    }

    /// Translate an exchange outcome for a call with no order in scope (price lookup).
    pub fn from_market_data(err: ExchangeError, symbol: &str) -> Self {
        match err {
            ExchangeError::NotFound => {
                TrailingError::Configuration(format!("unknown symbol {}", symbol))
            }
            ExchangeError::Transient(reason) => TrailingError::TransientExchange(reason),
            ExchangeError::Rejected(reason) => TrailingError::ExchangeRejected(reason),
        }
    }

    pub fn is_partial_transition(&self) -> bool {
        matches!(self, TrailingError::PartialTransition { .. })
    }
}

pub type Result<T> = std::result::Result<T, TrailingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_keeps_order_id() {
        let err = TrailingError::from_exchange(ExchangeError::NotFound, 42);
        assert!(matches!(err, TrailingError::OrderNotFound { order_id: 42 }));
    }

    #[test]
    fn test_transient_is_not_partial() {
        let err = TrailingError::from_exchange(ExchangeError::Transient("timeout".into()), 1);
        assert!(!err.is_partial_transition());
        assert!(err.to_string().contains("timeout"));
    }
}
