use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::Instrument as _;

use super::decision::{candidate_price, decide};
use super::rounding::round_to_tick;
use super::transition::{OrderTransitioner, TransitionOutcome};
use super::types::{Instrument, OrderId, Position, PositionStatus, TrailParameters};
use crate::api::{ExchangeClient, OrderStatus};
use crate::core::{Result, TrailingError};
use crate::storage::PositionStore;

/// What a single reconciliation did.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Not `AwaitingSale`; left alone.
    Ignored { status: PositionStatus },
    /// The sell order is no longer open; a downstream workflow owns it now.
    NotOpen { status: OrderStatus },
    /// Open order, no trail warranted.
    Held {
        market_price: Decimal,
        candidate_price: Decimal,
    },
    /// Trail warranted but tick rounding left no improvement.
    NoImprovement { rounded_price: Decimal },
    Trailed {
        previous_price: Decimal,
        new_price: Decimal,
        new_sell_order_id: OrderId,
    },
    /// A sell order lost in an earlier partial transition was re-placed.
    Replaced {
        new_price: Decimal,
        new_sell_order_id: OrderId,
    },
}

pub struct PositionReconciler {
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn PositionStore>,
    transitioner: OrderTransitioner,
    params: TrailParameters,
    /// Positions whose latest state reached the exchange but not the store,
    /// keyed by buy order id. They take precedence over the stored row.
    unsaved: Mutex<HashMap<OrderId, Position>>,
}

impl PositionReconciler {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn PositionStore>,
        params: TrailParameters,
    ) -> Self {
        Self {
            transitioner: OrderTransitioner::new(exchange.clone()),
            exchange,
            store,
            params,
            unsaved: Mutex::new(HashMap::new()),
        }
    }

    pub async fn reconcile(&self, position: &Position) -> Result<ReconcileOutcome> {
        let span = tracing::info_span!(
            "reconcile",
            buy_order_id = position.buy_order_id,
            sell_order_id = position.sell_order_id,
            symbol = tracing::field::Empty
        );
        self.reconcile_inner(position).instrument(span).await
    }

    async fn reconcile_inner(&self, position: &Position) -> Result<ReconcileOutcome> {
        if position.status != PositionStatus::AwaitingSale {
            return Ok(ReconcileOutcome::Ignored {
                status: position.status,
            });
        }

        let mut position = self.latest_state(position).await;

        let instrument = self.store.fetch_instrument(position.instrument_id).await?;
        tracing::Span::current().record("symbol", instrument.symbol.as_str());

        let order = self
            .exchange
            .get_order(&instrument.symbol, position.sell_order_id)
            .await
            .map_err(|e| TrailingError::from_exchange(e, position.sell_order_id))?;

        if position.needs_replacement {
            if order.status.is_dead() {
                return self.replace_lost_order(&position, &instrument).await;
            }
            if !order.status.is_open() {
                return Ok(ReconcileOutcome::NotOpen {
                    status: order.status,
                });
            }
            // The cancel never took effect; the original order is still live
            tracing::warn!(
                "Sell order {} flagged as lost is still open, clearing flag",
                position.sell_order_id
            );
            position.needs_replacement = false;
            self.persist(&position).await?;
        }

        if !order.status.is_open() {
            tracing::debug!(
                "Sell order {} for {} is {:?}, nothing to trail",
                position.sell_order_id,
                instrument.symbol,
                order.status
            );
            return Ok(ReconcileOutcome::NotOpen {
                status: order.status,
            });
        }

        let market_price = self.market_price(&instrument).await?;
        let decision = decide(position.sell_price, market_price, &self.params)?;

        if !decision.trail {
            tracing::debug!(
                "{} holding: market {} | sell {} | threshold {} | candidate {}",
                instrument.symbol,
                market_price,
                position.sell_price,
                decision.margin_threshold,
                decision.candidate_price
            );
            return Ok(ReconcileOutcome::Held {
                market_price,
                candidate_price: decision.candidate_price,
            });
        }

        let outcome = self
            .transitioner
            .transition(&position, &instrument, decision.candidate_price)
            .await;

        match outcome {
            Ok(TransitionOutcome::Replaced(new_order)) => {
                let updated = position.with_sell_order(new_order.sell_order_id, new_order.sell_price);
                self.persist(&updated).await?;

                tracing::info!(
                    "Trailing profit: {} {} -> {} | buy order {} | new sell order {}",
                    instrument.symbol,
                    position.sell_price,
                    new_order.sell_price,
                    position.buy_order_id,
                    new_order.sell_order_id
                );

                Ok(ReconcileOutcome::Trailed {
                    previous_price: position.sell_price,
                    new_price: new_order.sell_price,
                    new_sell_order_id: new_order.sell_order_id,
                })
            }
            Ok(TransitionOutcome::NoImprovement { rounded_price }) => {
                tracing::debug!(
                    "{} candidate {} rounds to {}, not above {}",
                    instrument.symbol,
                    decision.candidate_price,
                    rounded_price,
                    position.sell_price
                );
                Ok(ReconcileOutcome::NoImprovement { rounded_price })
            }
            Err(err) if err.is_partial_transition() => {
                self.flag_lost_order(&position).await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Re-place the sell order of a position left without one. The price is
    /// recomputed from the market but never drops below the recorded price.
    async fn replace_lost_order(
        &self,
        position: &Position,
        instrument: &Instrument,
    ) -> Result<ReconcileOutcome> {
        let market_price = self.market_price(instrument).await?;
        let rounded = round_to_tick(candidate_price(market_price, &self.params), instrument.tick_size)?;
        let price = rounded.max(position.sell_price);

        tracing::warn!(
            "Re-placing lost sell order for position {} ({}) at {}",
            position.buy_order_id,
            instrument.symbol,
            price
        );

        // On failure the flag is already saved or held in memory, so the next cycle retries
        let placed = self.transitioner.place(position, instrument, price).await?;

        let updated = position.with_sell_order(placed.sell_order_id, placed.sell_price);
        self.persist(&updated).await?;

        tracing::info!(
            "Restored sell order for {} @ {} | buy order {} | new sell order {}",
            instrument.symbol,
            placed.sell_price,
            position.buy_order_id,
            placed.sell_order_id
        );

        Ok(ReconcileOutcome::Replaced {
            new_price: placed.sell_price,
            new_sell_order_id: placed.sell_order_id,
        })
    }

    async fn flag_lost_order(&self, position: &Position) {
        let flagged = position.flagged_for_replacement();
        if let Err(e) = self.persist(&flagged).await {
            tracing::error!(
                "Could not flag position {} for replacement, kept in memory: {}",
                position.buy_order_id,
                e
            );
        }
    }

    /// Save a position. On failure it is remembered so later cycles act on
    /// this state instead of the stale stored row.
    async fn persist(&self, position: &Position) -> Result<()> {
        let result = self.store.save_position(position).await;
        let mut unsaved = self.unsaved.lock().await;
        match result {
            Ok(()) => {
                unsaved.remove(&position.buy_order_id);
                Ok(())
            }
            Err(e) => {
                unsaved.insert(position.buy_order_id, position.clone());
                Err(e)
            }
        }
    }

    /// The state to reconcile from. A position with an unsaved newer state
    /// gets another save attempt; if that fails too the cycle goes on with
    /// the in-memory state.
    async fn latest_state(&self, stored: &Position) -> Position {
        let pending = self.unsaved.lock().await.get(&stored.buy_order_id).cloned();
        let Some(pending) = pending else {
            return stored.clone();
        };

        match self.persist(&pending).await {
            Ok(()) => tracing::info!(
                "Saved state of position {} held since an earlier failure",
                pending.buy_order_id
            ),
            Err(e) => tracing::warn!(
                "Position {} still not saved, continuing from memory: {}",
                pending.buy_order_id,
                e
            ),
        }
        pending
    }

    async fn market_price(&self, instrument: &Instrument) -> Result<Decimal> {
        self.exchange
            .current_price(&instrument.symbol)
            .await
            .map_err(|e| TrailingError::from_market_data(e, &instrument.symbol))
    }
}
