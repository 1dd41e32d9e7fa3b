//! Signal types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::history::Window;

/// Trading side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy Yes contracts
    Yes,
    /// Buy No contracts
    No,
}

impl Side {
    /// Price of this side's contract given the market's YES price
    pub fn contract_price(&self, yes_price: Decimal) -> Decimal {
        match self {
            Side::Yes => yes_price,
            Side::No => Decimal::ONE - yes_price,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "yes"),
            Side::No => write!(f, "no"),
        }
    }
}

/// Direction of a detected move in the YES price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    None,
}

impl Direction {
    /// Side to trade on a move in this direction
    pub fn side(&self) -> Option<Side> {
        match self {
            Direction::Up => Some(Side::Yes),
            Direction::Down => Some(Side::No),
            Direction::None => None,
        }
    }

    /// Direction of a signed move
    pub fn of(value: Decimal) -> Self {
        if value > Decimal::ZERO {
            Direction::Up
        } else if value < Decimal::ZERO {
            Direction::Down
        } else {
            Direction::None
        }
    }
}

/// Strategy that produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Z-score of the latest price against the rolling window
    Spike,
    /// Rate of change over a fixed lookback
    Momentum,
    /// Volume surge against the rolling average
    VolumeSpike,
    /// Price away from its moving-average fair value
    Mispricing,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Spike => "spike",
            StrategyKind::Momentum => "momentum",
            StrategyKind::VolumeSpike => "volume_spike",
            StrategyKind::Mispricing => "mispricing",
        }
    }
}

/// Extent of the samples a signal was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub len: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

impl From<&Window<'_>> for WindowBounds {
    fn from(window: &Window<'_>) -> Self {
        Self {
            len: window.len(),
            first: window.first().map(|s| s.timestamp),
            last: window.latest().map(|s| s.timestamp),
        }
    }
}

/// Output of a strategy evaluation
///
/// Produced once per evaluation and never mutated. A signal with
/// `Direction::None` means "no trade".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub market_id: String,
    pub strategy: StrategyKind,
    pub direction: Direction,
    /// Z-score, rate of change or volume ratio depending on the strategy
    pub magnitude: Decimal,
    /// YES price of the newest sample in the window
    pub price: Decimal,
    /// Timestamp of the newest sample in the window
    pub timestamp: DateTime<Utc>,
    pub window: WindowBounds,
}

impl Signal {
    /// A no-trade signal over `window`
    pub fn none(market_id: &str, strategy: StrategyKind, window: &Window<'_>) -> Self {
        let latest = window.latest();
        Self {
            market_id: market_id.to_string(),
            strategy,
            direction: Direction::None,
            magnitude: Decimal::ZERO,
            price: latest.map_or(Decimal::ZERO, |s| s.price),
            timestamp: latest.map_or(DateTime::<Utc>::MIN_UTC, |s| s.timestamp),
            window: WindowBounds::from(window),
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.direction != Direction::None
    }

    /// Side a trade on this signal would take
    pub fn side(&self) -> Option<Side> {
        self.direction.side()
    }

    /// Compact reference stored on trade intents
    pub fn reference(&self) -> SignalRef {
        SignalRef {
            strategy: self.strategy,
            direction: self.direction,
            magnitude: self.magnitude,
            timestamp: self.timestamp,
        }
    }
}

/// Link from a trade intent back to the signal that created it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRef {
    pub strategy: StrategyKind,
    pub direction: Direction,
    pub magnitude: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Reasons a strategy could not evaluate a window
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("insufficient window: have {have} samples, need {need}")]
    InsufficientWindow { have: usize, need: usize },
    #[error("zero variance in window")]
    ZeroVariance,
    #[error("no volume data in window")]
    MissingVolume,
    #[error("arithmetic overflow in window")]
    Overflow,
}
