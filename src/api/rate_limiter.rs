// Binance spot REQUEST_WEIGHT limits: 1200 per rolling minute per IP.
// We run below that so a second process on the same host still has headroom.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio::sync::{Mutex, Semaphore};

use super::ExchangeError;

const BINANCE_WEIGHT_PER_MINUTE: u32 = 1200;
const WINDOW_SECONDS: u64 = 60;
const MAX_CONCURRENT_REQUESTS: usize = 5;

/// Endpoint weights as published for /api/v3
pub const WEIGHT_QUERY_ORDER: u32 = 4;
pub const WEIGHT_CANCEL_ORDER: u32 = 1;
pub const WEIGHT_PLACE_ORDER: u32 = 1;
pub const WEIGHT_TICKER_PRICE: u32 = 2;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_weight_per_window: u32,
    pub window_duration: Duration,
    pub max_concurrent: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(BINANCE_WEIGHT_PER_MINUTE * 4 / 5)
    }
}

impl RateLimitConfig {
    pub fn per_minute(max_weight: u32) -> Self {
        Self {
            max_weight_per_window: max_weight.min(BINANCE_WEIGHT_PER_MINUTE),
            window_duration: Duration::from_secs(WINDOW_SECONDS),
            max_concurrent: MAX_CONCURRENT_REQUESTS,
        }
    }
}

#[derive(Debug)]
struct RequestLog {
    timestamp: Instant,
    weight: u32,
}

/// Shared request-weight budget. Every exchange call goes through one
/// instance so concurrent callers never overrun the limit between them.
pub struct RateLimiter {
    config: RateLimitConfig,
    request_history: Mutex<VecDeque<RequestLog>>,
    semaphore: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        tracing::info!(
            "Rate limiter: {} weight per {:?}, {} concurrent requests",
            config.max_weight_per_window,
            config.window_duration,
            config.max_concurrent
        );

        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
            request_history: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until `weight` fits in the current window, then record it.
    pub async fn acquire(&self, endpoint: &str, weight: u32) -> Result<RateLimitGuard, ExchangeError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ExchangeError::Transient(format!("rate limiter closed: {}", e)))?;

        loop {
            let wait = {
                let mut history = self.request_history.lock().await;
                let now = Instant::now();
                while let Some(front) = history.front() {
                    if now.duration_since(front.timestamp) >= self.config.window_duration {
                        history.pop_front();
                    } else {
                        break;
                    }
                }

                let current: u32 = history.iter().map(|r| r.weight).sum();
                if current + weight <= self.config.max_weight_per_window || history.is_empty() {
                    history.push_back(RequestLog {
                        timestamp: now,
                        weight,
                    });
                    tracing::debug!(
                        "Rate limit OK: {} (weight: {}, usage: {}/{})",
                        endpoint,
                        weight,
                        current + weight,
                        self.config.max_weight_per_window
                    );
                    None
                } else {
                    let oldest = history.front().map(|r| r.timestamp).unwrap_or(now);
                    Some(
                        self.config
                            .window_duration
                            .saturating_sub(now.duration_since(oldest))
                            + Duration::from_millis(50),
                    )
                }
            };

            match wait {
                None => return Ok(RateLimitGuard { _permit: permit }),
                Some(wait) => {
                    tracing::warn!("Request weight budget exhausted, waiting {:?} for {}", wait, endpoint);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    pub async fn get_stats(&self) -> RateLimiterStats {
        let history = self.request_history.lock().await;
        let now = Instant::now();
        let live: Vec<&RequestLog> = history
            .iter()
            .filter(|r| now.duration_since(r.timestamp) < self.config.window_duration)
            .collect();

        RateLimiterStats {
            current_weight: live.iter().map(|r| r.weight).sum(),
            max_weight: self.config.max_weight_per_window,
            requests_in_window: live.len(),
        }
    }
}

/// Holds a concurrency slot until dropped.
pub struct RateLimitGuard {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub current_weight: u32,
    pub max_weight: u32,
    pub requests_in_window: usize,
}
