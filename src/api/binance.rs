use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

use super::rate_limiter::{
    RateLimiter, WEIGHT_CANCEL_ORDER, WEIGHT_PLACE_ORDER, WEIGHT_QUERY_ORDER, WEIGHT_TICKER_PRICE,
};
use super::types::*;
use super::{ExchangeClient, ExchangeError};
use crate::core::{ExchangeConfig, Result, TrailingError};

type HmacSha256 = Hmac<Sha256>;

const ORDER_ENDPOINT: &str = "/api/v3/order";
const TICKER_PRICE_ENDPOINT: &str = "/api/v3/ticker/price";

// Binance error codes that mean the order is gone
const CODE_CANCEL_REJECTED: i64 = -2011;
const CODE_NO_SUCH_ORDER: i64 = -2013;

/// Binance spot REST client covering the four calls the trailing loop needs.
pub struct BinanceClient {
    client: Client,
    config: ExchangeConfig,
    limiter: Arc<RateLimiter>,
}

impl BinanceClient {
    pub fn new(config: ExchangeConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TrailingError::Configuration(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            config,
            limiter,
        })
    }

    fn sign(&self, query: &str) -> std::result::Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.as_bytes())
            .map_err(|e| ExchangeError::Rejected(format!("cannot sign request: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        mut params: Vec<(&str, String)>,
        signed: bool,
        weight: u32,
    ) -> std::result::Result<T, ExchangeError> {
        let _guard = self.limiter.acquire(endpoint, weight).await?;

        if signed {
            params.push(("recvWindow", self.config.recv_window_ms.to_string()));
            params.push(("timestamp", chrono::Utc::now().timestamp_millis().to_string()));
        }

        let mut query = encode_query(&params);
        if signed {
            let signature = self.sign(&query)?;
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str("signature=");
            query.push_str(&signature);
        }

        let url = format!("{}{}?{}", self.config.base_url, endpoint, query);
        let mut request = self.client.request(method.clone(), &url);
        if signed {
            request = request.header("X-MBX-APIKEY", &self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExchangeError::Transient(format!("{} {}: {}", method, endpoint, e)))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_failure(status, &body);
            if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
                let stats = self.limiter.get_stats().await;
                tracing::warn!(
                    "Binance throttled {} {} at local weight {}/{} ({} requests in window)",
                    method,
                    endpoint,
                    stats.current_weight,
                    stats.max_weight,
                    stats.requests_in_window
                );
            }
            tracing::debug!("Binance {} {} failed: {} - {}", method, endpoint, status, body);
            return Err(err);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ExchangeError::Transient(format!("malformed {} response: {}", endpoint, e)))
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn get_order(
        &self,
        symbol: &str,
        order_id: i64,
    ) -> std::result::Result<OrderSnapshot, ExchangeError> {
        let params = vec![("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        let order: BinanceOrder = self
            .request(Method::GET, ORDER_ENDPOINT, params, true, WEIGHT_QUERY_ORDER)
            .await?;
        Ok(order.into())
    }

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> std::result::Result<(), ExchangeError> {
        let params = vec![("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        let _: BinanceOrder = self
            .request(Method::DELETE, ORDER_ENDPOINT, params, true, WEIGHT_CANCEL_ORDER)
            .await?;
        Ok(())
    }

    async fn place_limit_sell(
        &self,
        order: &LimitSellRequest,
    ) -> std::result::Result<PlacedOrder, ExchangeError> {
        let params = vec![
            ("symbol", order.symbol.clone()),
            ("side", "SELL".to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", format_decimal(order.quantity)),
            ("price", format_decimal(order.price)),
            ("newClientOrderId", order.client_order_id.clone()),
            ("newOrderRespType", "ACK".to_string()),
        ];
        let ack: BinanceOrderAck = self
            .request(Method::POST, ORDER_ENDPOINT, params, true, WEIGHT_PLACE_ORDER)
            .await?;

        Ok(PlacedOrder {
            order_id: ack.order_id,
            client_order_id: ack.client_order_id,
        })
    }

    async fn current_price(&self, symbol: &str) -> std::result::Result<Decimal, ExchangeError> {
        let params = vec![("symbol", symbol.to_string())];
        let ticker: BinanceTickerPrice = self
            .request(Method::GET, TICKER_PRICE_ENDPOINT, params, false, WEIGHT_TICKER_PRICE)
            .await?;
        Ok(ticker.price)
    }
}

/// Parameters are symbols, integers, decimals and client ids, none of which
/// need percent-encoding.
fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Plain notation without trailing zeros; Binance rejects exponents.
fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

fn classify_failure(status: StatusCode, body: &str) -> ExchangeError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        return ExchangeError::Transient(format!("rate limited ({})", status));
    }
    if status.is_server_error() {
        return ExchangeError::Transient(format!("server error {}: {}", status, body));
    }

    match serde_json::from_str::<BinanceErrorBody>(body) {
        Ok(err) if err.code == CODE_CANCEL_REJECTED || err.code == CODE_NO_SUCH_ORDER => {
            ExchangeError::NotFound
        }
        Ok(err) => ExchangeError::Rejected(format!("{} {}", err.code, err.msg)),
        Err(_) => ExchangeError::Rejected(format!("{}: {}", status, body)),
    }
}
