use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::reconciler::{PositionReconciler, ReconcileOutcome};
use super::types::OrderId;
use crate::api::ExchangeClient;
use crate::core::{Result, TrailingConfig, TrailingError};
use crate::storage::PositionStore;

/// Pause between scan cycles. Injected so tests can run many cycles instantly.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug)]
pub struct PositionReport {
    pub buy_order_id: OrderId,
    pub result: Result<ReconcileOutcome>,
}

/// Per-position results of one scan.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub positions: Vec<PositionReport>,
}

impl CycleReport {
    pub fn trailed(&self) -> usize {
        self.positions
            .iter()
            .filter(|p| {
                matches!(
                    p.result,
                    Ok(ReconcileOutcome::Trailed { .. }) | Ok(ReconcileOutcome::Replaced { .. })
                )
            })
            .count()
    }

    pub fn failed(&self) -> usize {
        self.positions.iter().filter(|p| p.result.is_err()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Scan loop: `Scanning -> Sleeping -> Scanning ...` until shutdown.
pub struct PollingCoordinator {
    store: Arc<dyn PositionStore>,
    reconciler: PositionReconciler,
    sleeper: Arc<dyn Sleeper>,
    poll_interval: Duration,
}

impl PollingCoordinator {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn PositionStore>,
        config: &TrailingConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self> {
        let params = config.parameters()?;
        if config.poll_interval_secs == 0 {
            return Err(TrailingError::Configuration(
                "poll interval must be positive".to_string(),
            ));
        }

        Ok(Self {
            reconciler: PositionReconciler::new(exchange, store.clone(), params),
            store,
            sleeper,
            poll_interval: config.poll_interval(),
        })
    }

    /// Reconcile every pending position once. A failing position never
    /// stops the others; only failing to load the list fails the cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let pending = self.store.fetch_pending_positions().await?;

        let mut report = CycleReport {
            positions: Vec::with_capacity(pending.len()),
        };

        for position in &pending {
            let result = self.reconciler.reconcile(position).await;
            if let Err(e) = &result {
                log_position_error(position.buy_order_id, e);
            }
            report.positions.push(PositionReport {
                buy_order_id: position.buy_order_id,
                result,
            });
        }

        if report.is_empty() {
            tracing::debug!("No pending positions");
        } else {
            tracing::info!(
                "Cycle complete: {} positions, {} moved, {} failed",
                report.positions.len(),
                report.trailed(),
                report.failed()
            );
        }

        Ok(report)
    }

    /// Run until `shutdown` turns true (or its sender is dropped). Shutdown
    /// cuts a sleep short but always lets an in-progress cycle finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Trailing profit loop started (polling every {:?})",
            self.poll_interval
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.run_cycle().await {
                tracing::error!("Trailing profit cycle failed: {}", e);
            }

            tokio::select! {
                _ = self.sleeper.sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Trailing profit loop stopped");
    }
}

fn log_position_error(buy_order_id: OrderId, err: &TrailingError) {
    match err {
        TrailingError::PartialTransition { .. } => tracing::error!(
            "Position {} left without a live sell order, will re-place next cycle: {}",
            buy_order_id,
            err
        ),
        TrailingError::Storage(_) | TrailingError::Configuration(_) => {
            tracing::error!("Position {} failed: {}", buy_order_id, err)
        }
        TrailingError::OrderNotFound { .. } => {
            tracing::warn!("Position {}: sell order not found on exchange", buy_order_id)
        }
        TrailingError::TransientExchange(_) | TrailingError::ExchangeRejected(_) => {
            tracing::warn!("Position {} skipped this cycle: {}", buy_order_id, err)
        }
    }
}
