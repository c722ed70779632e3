use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use super::rounding::round_to_tick;
use super::types::{Instrument, OrderId, Position};
use crate::api::{ExchangeClient, LimitSellRequest};
use crate::core::{Result, TrailingError};

const MAX_CLIENT_ORDER_ID_LEN: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewSellOrder {
    pub sell_order_id: OrderId,
    pub sell_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Old order cancelled, new one resting at the rounded price.
    Replaced(NewSellOrder),
    /// Tick rounding ate the whole improvement; nothing was touched.
    NoImprovement { rounded_price: Decimal },
}

/// Cancel-then-replace of a position's resting sell order.
pub struct OrderTransitioner {
    exchange: Arc<dyn ExchangeClient>,
}

impl OrderTransitioner {
    pub fn new(exchange: Arc<dyn ExchangeClient>) -> Self {
        Self { exchange }
    }

    /// Move `position`'s sell order to `candidate_price` floored to the tick.
    ///
    /// The price is rounded before anything is cancelled, so a bad tick size
    /// never leaves the position without an order. Only a failure of the
    /// final placement yields [`TrailingError::PartialTransition`].
    pub async fn transition(
        &self,
        position: &Position,
        instrument: &Instrument,
        candidate_price: Decimal,
    ) -> Result<TransitionOutcome> {
        let rounded_price = round_to_tick(candidate_price, instrument.tick_size)?;
        if rounded_price <= position.sell_price {
            return Ok(TransitionOutcome::NoImprovement { rounded_price });
        }

        self.exchange
            .cancel_order(&instrument.symbol, position.sell_order_id)
            .await
            .map_err(|e| TrailingError::from_exchange(e, position.sell_order_id))?;

        tracing::debug!(
            "Cancelled sell order {} for {}",
            position.sell_order_id,
            instrument.symbol
        );

        let placed = self.place(position, instrument, rounded_price).await?;
        Ok(TransitionOutcome::Replaced(placed))
    }

    /// Place a sell order for a position whose previous order is already gone.
    pub async fn place(
        &self,
        position: &Position,
        instrument: &Instrument,
        price: Decimal,
    ) -> Result<NewSellOrder> {
        let request = LimitSellRequest {
            symbol: instrument.symbol.clone(),
            quantity: position.quantity,
            price,
            client_order_id: client_order_id(position.buy_order_id),
        };

        match self.exchange.place_limit_sell(&request).await {
            Ok(placed) => Ok(NewSellOrder {
                sell_order_id: placed.order_id,
                sell_price: price,
            }),
            Err(e) => {
                tracing::error!(
                    "Position {} ({}) has NO live sell order: sell order {} is gone and placing {} @ {} failed: {}",
                    position.buy_order_id,
                    instrument.symbol,
                    position.sell_order_id,
                    position.quantity,
                    price,
                    e
                );
                Err(TrailingError::PartialTransition {
                    cancelled_order_id: position.sell_order_id,
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// `<buy order id>_sell_<random>`, unique per placement.
fn client_order_id(buy_order_id: OrderId) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let mut id = format!("{}_sell_{}", buy_order_id, &suffix[..8]);
    id.truncate(MAX_CLIENT_ORDER_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ExchangeError, MockExchangeClient, PlacedOrder};
    use crate::trailing::PositionStatus;
    use mockall::predicate::*;
    use rust_decimal_macros::dec;

    fn position() -> Position {
        Position {
            buy_order_id: 500,
            sell_order_id: 900,
            user_id: 1,
            instrument_id: 3,
            quantity: dec!(0.5),
            sell_price: dec!(100),
            status: PositionStatus::AwaitingSale,
            needs_replacement: false,
        }
    }

    fn instrument() -> Instrument {
        Instrument {
            id: 3,
            symbol: "BTCUSDT".to_string(),
            tick_size: dec!(0.01),
        }
    }

    #[tokio::test]
    async fn test_cancel_then_place_at_rounded_price() {
        let mut exchange = MockExchangeClient::new();
        let mut seq = mockall::Sequence::new();
        exchange
            .expect_cancel_order()
            .with(eq("BTCUSDT"), eq(900))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        exchange
            .expect_place_limit_sell()
            .withf(|req| {
                req.symbol == "BTCUSDT"
                    && req.price == dec!(101.69)
                    && req.quantity == dec!(0.5)
                    && req.client_order_id.starts_with("500_sell_")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                Ok(PlacedOrder {
                    order_id: 901,
                    client_order_id: req.client_order_id.clone(),
                })
            });

        let transitioner = OrderTransitioner::new(Arc::new(exchange));
        let outcome = transitioner
            .transition(&position(), &instrument(), dec!(101.694))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TransitionOutcome::Replaced(NewSellOrder {
                sell_order_id: 901,
                sell_price: dec!(101.69),
            })
        );
    }

    #[tokio::test]
    async fn test_cancel_not_found_does_not_place() {
        let mut exchange = MockExchangeClient::new();
        exchange
            .expect_cancel_order()
            .returning(|_, _| Err(ExchangeError::NotFound));
        exchange.expect_place_limit_sell().never();

        let transitioner = OrderTransitioner::new(Arc::new(exchange));
        let err = transitioner
            .transition(&position(), &instrument(), dec!(101.694))
            .await
            .unwrap_err();

        assert!(matches!(err, TrailingError::OrderNotFound { order_id: 900 }));
    }

    #[tokio::test]
    async fn test_cancel_transient_aborts() {
        let mut exchange = MockExchangeClient::new();
        exchange
            .expect_cancel_order()
            .returning(|_, _| Err(ExchangeError::Transient("timeout".into())));
        exchange.expect_place_limit_sell().never();

        let transitioner = OrderTransitioner::new(Arc::new(exchange));
        let err = transitioner
            .transition(&position(), &instrument(), dec!(101.694))
            .await
            .unwrap_err();

        assert!(matches!(err, TrailingError::TransientExchange(_)));
    }

    #[tokio::test]
    async fn test_place_failure_after_cancel_is_partial() {
        let mut exchange = MockExchangeClient::new();
        exchange.expect_cancel_order().returning(|_, _| Ok(()));
        exchange
            .expect_place_limit_sell()
            .returning(|_| Err(ExchangeError::Transient("connection reset".into())));

        let transitioner = OrderTransitioner::new(Arc::new(exchange));
        let err = transitioner
            .transition(&position(), &instrument(), dec!(101.694))
            .await
            .unwrap_err();

        match err {
            TrailingError::PartialTransition {
                cancelled_order_id,
                reason,
            } => {
                assert_eq!(cancelled_order_id, 900);
                assert!(reason.contains("connection reset"));
            }
            other => panic!("expected partial transition, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rounding_to_current_price_touches_nothing() {
        let mut exchange = MockExchangeClient::new();
        exchange.expect_cancel_order().never();
        exchange.expect_place_limit_sell().never();

        let coarse = Instrument {
            tick_size: dec!(1),
            ..instrument()
        };
        let transitioner = OrderTransitioner::new(Arc::new(exchange));
        let outcome = transitioner
            .transition(&position(), &coarse, dec!(100.9))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TransitionOutcome::NoImprovement {
                rounded_price: dec!(100)
            }
        );
    }

    #[tokio::test]
    async fn test_bad_tick_fails_before_cancel() {
        let mut exchange = MockExchangeClient::new();
        exchange.expect_cancel_order().never();

        let broken = Instrument {
            tick_size: Decimal::ZERO,
            ..instrument()
        };
        let transitioner = OrderTransitioner::new(Arc::new(exchange));
        let err = transitioner
            .transition(&position(), &broken, dec!(101.694))
            .await
            .unwrap_err();

        assert!(matches!(err, TrailingError::Configuration(_)));
    }

    #[test]
    fn test_client_order_ids_are_unique_and_bounded() {
        let a = client_order_id(123456789012);
        let b = client_order_id(123456789012);
        assert_ne!(a, b);
        assert!(a.len() <= MAX_CLIENT_ORDER_ID_LEN);
        assert!(a.starts_with("123456789012_sell_"));
    }
}
