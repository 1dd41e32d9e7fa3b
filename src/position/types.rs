//! Position types

use crate::execution::IntentId;
use crate::signal::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Position identifier, sequential per engine
pub type PositionId = u64;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    HoldingTimeLimit,
    TrailingStop,
    /// Closed outside the engine, e.g. by hand or by market settlement
    External,
    /// Still open when a backtest ran out of data
    EndOfBacktest,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::TakeProfit => "take_profit",
            CloseReason::StopLoss => "stop_loss",
            CloseReason::HoldingTimeLimit => "holding_time_limit",
            CloseReason::TrailingStop => "trailing_stop",
            CloseReason::External => "external",
            CloseReason::EndOfBacktest => "end_of_backtest",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-trade problems recorded against a position
///
/// Anomalies never reverse a trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionAnomaly {
    /// Fill landed further from the intended price than tolerated
    SlippageViolation {
        intent_id: IntentId,
        intended_price: Decimal,
        fill_price: Decimal,
        /// Adverse deviation as a fraction of the intended price
        slippage_pct: Decimal,
        tolerance_pct: Decimal,
    },
    /// Settlement was not confirmed before the deadline
    SettlementTimeout {
        closed_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    },
}

impl ExecutionAnomaly {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionAnomaly::SlippageViolation { .. } => "slippage_violation",
            ExecutionAnomaly::SettlementTimeout { .. } => "settlement_timeout",
        }
    }
}

/// A position, open or closed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    /// Intent whose fill opened the position
    pub intent_id: IntentId,
    pub market_id: String,
    pub side: Side,
    /// YES price of the entry fill
    pub entry_price: Decimal,
    /// Contracts held
    pub size: Decimal,
    pub opened_at: DateTime<Utc>,
    /// YES price at which the position takes profit
    pub take_profit: Decimal,
    /// YES price at which the position stops out
    pub stop_loss: Decimal,
    pub entry_fee: Decimal,
    /// Latest YES price seen for the market
    pub mark_price: Decimal,
    /// Gross P&L at the mark, before fees
    pub unrealized_pnl: Decimal,
    /// Best unrealized P&L seen while open
    pub peak_pnl: Decimal,
    pub status: PositionStatus,
    /// An exit order is outstanding
    pub exit_pending: bool,
    /// Requires operator attention
    pub needs_review: bool,
    pub anomalies: Vec<ExecutionAnomaly>,
}

impl Position {
    /// Capital committed at entry
    pub fn exposure(&self) -> Decimal {
        self.size * self.side.contract_price(self.entry_price)
    }

    /// Gross P&L if closed at the given YES price
    pub fn gross_pnl_at(&self, price: Decimal) -> Decimal {
        match self.side {
            Side::Yes => (price - self.entry_price) * self.size,
            Side::No => (self.entry_price - price) * self.size,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

/// A position with its realized result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_price: Decimal,
    pub closed_at: DateTime<Utc>,
    pub reason: CloseReason,
    pub gross_pnl: Decimal,
    /// Entry and exit fees
    pub fees: Decimal,
    pub realized_pnl: Decimal,
}

impl ClosedPosition {
    pub fn holding_seconds(&self) -> i64 {
        (self.closed_at - self.position.opened_at).num_seconds()
    }

    pub fn is_loss(&self) -> bool {
        self.realized_pnl < Decimal::ZERO
    }

    /// Realized P&L over capital committed
    pub fn return_pct(&self) -> Decimal {
        let exposure = self.position.exposure();
        if exposure.is_zero() {
            Decimal::ZERO
        } else {
            self.realized_pnl / exposure
        }
    }
}

/// Position bookkeeping errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("position {0} is already closed")]
    AlreadyClosed(PositionId),
    #[error("unknown position {0}")]
    UnknownPosition(PositionId),
    #[error("market {0} already has an open position")]
    AlreadyOpen(String),
    #[error("intent {0} does not open a position")]
    NotAnEntry(IntentId),
}

/// Correlation group of a market ticker
///
/// The prefix before the first hyphen, or the first two segments for
/// `KX-` tickers.
pub fn event_group(market_id: &str) -> &str {
    let mut parts = market_id.splitn(3, '-');
    let first = parts.next().unwrap_or(market_id);
    match (parts.next(), parts.next()) {
        (Some(second), Some(_)) if first == "KX" => &market_id[..first.len() + 1 + second.len()],
        (Some(_), _) => first,
        _ => market_id,
    }
}
