//! Trailing take-profit core: decide when a resting sell order should move
//! up, move it with cancel-then-replace, and keep the stored position in
//! step with what is live on the exchange.

pub mod coordinator;
pub mod decision;
pub mod reconciler;
pub mod rounding;
pub mod transition;
pub mod types;

pub use coordinator::{CycleReport, PollingCoordinator, PositionReport, Sleeper, TokioSleeper};
pub use decision::{candidate_price, decide, TrailDecision};
pub use reconciler::{PositionReconciler, ReconcileOutcome};
pub use rounding::round_to_tick;
pub use transition::{NewSellOrder, OrderTransitioner, TransitionOutcome};
pub use types::{Instrument, OrderId, Position, PositionStatus, TrailParameters, User};
