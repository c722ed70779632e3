use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Live state of an order as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
    Other,
}

impl OrderStatus {
    pub fn from_binance(raw: &str) -> Self {
        match raw {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Canceled,
            "PENDING_CANCEL" => OrderStatus::PendingCancel,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Expired,
            _ => OrderStatus::Other,
        }
    }

    /// Resting on the book with nothing executed yet.
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::New)
    }

    /// Gone from the book without any fill, so nothing protects the position.
    pub fn is_dead(&self) -> bool {
        matches!(
            self,
            OrderStatus::Canceled | OrderStatus::Expired | OrderStatus::Rejected
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    pub order_id: i64,
    pub status: OrderStatus,
    pub price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitSellRequest {
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub client_order_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub order_id: i64,
    pub client_order_id: String,
}

// Wire types

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceOrder {
    pub symbol: String,
    pub order_id: i64,
    pub client_order_id: String,
    pub price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    pub status: String,
}

impl From<BinanceOrder> for OrderSnapshot {
    fn from(order: BinanceOrder) -> Self {
        Self {
            order_id: order.order_id,
            status: OrderStatus::from_binance(&order.status),
            price: order.price,
            orig_qty: order.orig_qty,
            executed_qty: order.executed_qty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceOrderAck {
    pub symbol: String,
    pub order_id: i64,
    pub client_order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceTickerPrice {
    pub symbol: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceErrorBody {
    pub code: i64,
    pub msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_only_new_is_open() {
        assert!(OrderStatus::New.is_open());
        assert!(!OrderStatus::PartiallyFilled.is_open());
        assert!(!OrderStatus::Filled.is_open());
        assert!(!OrderStatus::Canceled.is_open());
    }

    #[test]
    fn test_parse_order_payload() {
        let payload = r#"{
            "symbol": "BTCUSDT",
            "orderId": 28,
            "orderListId": -1,
            "clientOrderId": "6gCrw2kRUAF9CvJDGP16IP",
            "price": "101.69000000",
            "origQty": "0.50000000",
            "executedQty": "0.00000000",
            "status": "NEW",
            "timeInForce": "GTC",
            "type": "LIMIT",
            "side": "SELL"
        }"#;

        let order: BinanceOrder = serde_json::from_str(payload).unwrap();
        let snapshot = OrderSnapshot::from(order);
        assert_eq!(snapshot.order_id, 28);
        assert_eq!(snapshot.status, OrderStatus::New);
        assert_eq!(snapshot.price, dec!(101.69));
        assert_eq!(snapshot.orig_qty, dec!(0.5));
    }

    #[test]
    fn test_unknown_status_maps_to_other() {
        assert_eq!(OrderStatus::from_binance("PENDING_NEW"), OrderStatus::Other);
        assert!(OrderStatus::from_binance("EXPIRED_IN_MATCH").is_dead());
    }
}
