pub mod database;

use async_trait::async_trait;

use crate::core::Result;
use crate::trailing::{Instrument, Position, User};

pub use database::PositionDatabase;

/// Read/write access to positions and the metadata reconciliation needs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Every position in `AwaitingSale`, in no particular order.
    async fn fetch_pending_positions(&self) -> Result<Vec<Position>>;

    /// Full-record upsert keyed by `buy_order_id`.
    async fn save_position(&self, position: &Position) -> Result<()>;

    async fn fetch_instrument(&self, instrument_id: i64) -> Result<Instrument>;

    async fn fetch_user(&self, user_id: i64) -> Result<User>;
}
