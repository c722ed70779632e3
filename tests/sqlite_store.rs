use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use trailing_profit::api::{
    ExchangeClient, ExchangeError, LimitSellRequest, OrderSnapshot, OrderStatus, PlacedOrder,
};
use trailing_profit::core::TrailingConfig;
use trailing_profit::storage::{PositionDatabase, PositionStore};
use trailing_profit::trailing::{Instrument, PollingCoordinator, Position, PositionStatus, TokioSleeper};

/// Every order is open and the market sits at a fixed price.
struct SteadyExchange {
    price: Decimal,
    next_order_id: AtomicI64,
}

#[async_trait]
impl ExchangeClient for SteadyExchange {
    async fn get_order(&self, _symbol: &str, order_id: i64) -> Result<OrderSnapshot, ExchangeError> {
        Ok(OrderSnapshot {
            order_id,
            status: OrderStatus::New,
            price: dec!(100),
            orig_qty: dec!(2),
            executed_qty: Decimal::ZERO,
        })
    }

    async fn cancel_order(&self, _symbol: &str, _order_id: i64) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn place_limit_sell(&self, request: &LimitSellRequest) -> Result<PlacedOrder, ExchangeError> {
        Ok(PlacedOrder {
            order_id: self.next_order_id.fetch_add(1, Ordering::SeqCst),
            client_order_id: request.client_order_id.clone(),
        })
    }

    async fn current_price(&self, _symbol: &str) -> Result<Decimal, ExchangeError> {
        Ok(self.price)
    }
}

async fn stored_position(db: &PositionDatabase, buy_order_id: i64) -> Position {
    db.fetch_pending_positions()
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.buy_order_id == buy_order_id)
        .unwrap()
}

#[tokio::test]
async fn trail_is_persisted_through_sqlite() {
    let db = Arc::new(PositionDatabase::new("sqlite::memory:", 1).await.unwrap());
    db.upsert_instrument(&Instrument {
        id: 4,
        symbol: "SOLUSDT".to_string(),
        tick_size: dec!(0.001),
    })
    .await
    .unwrap();

    let original = Position {
        buy_order_id: 77,
        sell_order_id: 78,
        user_id: 1,
        instrument_id: 4,
        quantity: dec!(2),
        sell_price: dec!(100),
        status: PositionStatus::AwaitingSale,
        needs_replacement: false,
    };
    db.save_position(&original).await.unwrap();

    let exchange = Arc::new(SteadyExchange {
        price: dec!(102),
        next_order_id: AtomicI64::new(5000),
    });
    let config = TrailingConfig {
        step_threshold: dec!(0.005),
        buffer: dec!(0.003),
        poll_interval_secs: 30,
        account_user_id: 1,
    };
    let coordinator =
        PollingCoordinator::new(exchange, db.clone(), &config, Arc::new(TokioSleeper)).unwrap();

    let report = coordinator.run_cycle().await.unwrap();
    assert_eq!(report.trailed(), 1);

    let stored = stored_position(&db, 77).await;
    assert_eq!(stored.sell_order_id, 5000);
    // 102 * 0.997 = 101.694, already on the 0.001 grid
    assert_eq!(stored.sell_price, dec!(101.694));
    assert_eq!(stored.quantity, dec!(2));
    assert_eq!(stored.status, PositionStatus::AwaitingSale);

    // Second pass: 102 is below 101.694 * 1.005, so nothing moves
    let report = coordinator.run_cycle().await.unwrap();
    assert_eq!(report.trailed(), 0);
    assert_eq!(stored_position(&db, 77).await, stored);
}
