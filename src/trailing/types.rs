use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::core::{Result, TrailingError};

pub type OrderId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    AwaitingSale,
    Filled,
    Cancelled,
    Error,
}

impl PositionStatus {
    /// Integer code used in the `positions.status` column.
    pub fn code(&self) -> i64 {
        match self {
            PositionStatus::AwaitingSale => 1,
            PositionStatus::Filled => 2,
            PositionStatus::Cancelled => 3,
            PositionStatus::Error => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(PositionStatus::AwaitingSale),
            2 => Some(PositionStatus::Filled),
            3 => Some(PositionStatus::Cancelled),
            4 => Some(PositionStatus::Error),
            _ => None,
        }
    }
}

/// One pending sale leg of a completed buy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub user_id: i64,
    pub instrument_id: i64,
    pub quantity: Decimal,
    /// Limit price of the resting sell order. Never decreases.
    pub sell_price: Decimal,
    pub status: PositionStatus,
    /// Set when the sell order was cancelled but its replacement failed.
    pub needs_replacement: bool,
}

impl Position {
    /// Copy of this position pointing at a newly placed sell order.
    pub fn with_sell_order(&self, sell_order_id: OrderId, sell_price: Decimal) -> Self {
        Self {
            sell_order_id,
            sell_price,
            status: PositionStatus::AwaitingSale,
            needs_replacement: false,
            ..self.clone()
        }
    }

    pub fn flagged_for_replacement(&self) -> Self {
        Self {
            needs_replacement: true,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: i64,
    pub symbol: String,
    /// Minimum positive price increment.
    pub tick_size: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailParameters {
    step_threshold: Decimal,
    buffer: Decimal,
}

impl TrailParameters {
    pub fn new(step_threshold: Decimal, buffer: Decimal) -> Result<Self> {
        if step_threshold < Decimal::ZERO {
            return Err(TrailingError::Configuration(format!(
                "step_threshold must not be negative, got {}",
                step_threshold
            )));
        }
        if buffer < Decimal::ZERO || buffer >= Decimal::ONE {
            return Err(TrailingError::Configuration(format!(
                "buffer must be in [0, 1), got {}",
                buffer
            )));
        }
        Ok(Self {
            step_threshold,
            buffer,
        })
    }

    pub fn step_threshold(&self) -> Decimal {
        self.step_threshold
    }

    pub fn buffer(&self) -> Decimal {
        self.buffer
    }
}

impl Default for TrailParameters {
    fn default() -> Self {
        Self {
            step_threshold: dec!(0.005),
            buffer: dec!(0.003),
        }
    }
}
