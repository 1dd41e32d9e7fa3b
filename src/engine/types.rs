//! Engine types

use crate::execution::{IntentId, IntentKind, TradeIntent};
use crate::position::{ClosedPosition, Position, PositionError};
use crate::risk::{RejectReason, RiskState};
use crate::signal::{Side, StrategyKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine errors
///
/// Integrity violations affecting a single operation; the engine keeps running.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no in-flight intent with id {0}")]
    UnknownIntent(IntentId),

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error("core task is not running")]
    CoreUnavailable,

    #[error("worker for market {0} has stopped")]
    WorkerStopped(String),
}

/// Outcome of the risk review for one intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Accepted,
    Rejected { reason: RejectReason },
}

/// One line of the decision log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub intent_id: IntentId,
    pub market_id: String,
    pub kind: IntentKind,
    pub side: Side,
    /// Size after any risk adjustment
    pub size: Decimal,
    pub reference_price: Decimal,
    pub strategy: Option<StrategyKind>,
    pub outcome: DecisionOutcome,
}

impl DecisionRecord {
    pub fn new(intent: &TradeIntent, outcome: DecisionOutcome) -> Self {
        Self {
            timestamp: intent.created_at,
            intent_id: intent.id,
            market_id: intent.market_id.clone(),
            kind: intent.kind,
            side: intent.side,
            size: intent.size,
            reference_price: intent.reference_price,
            strategy: intent.signal.as_ref().map(|s| s.strategy),
            outcome,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, DecisionOutcome::Accepted)
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match &self.outcome {
            DecisionOutcome::Accepted => None,
            DecisionOutcome::Rejected { reason } => Some(reason),
        }
    }
}

/// What a fill event did to the book
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillApplied {
    Opened(Position),
    Closed(ClosedPosition),
    /// The order failed and will be resubmitted at `at`
    Retrying { intent_id: IntentId, at: DateTime<Utc> },
    /// The order failed with no retries left
    Abandoned(TradeIntent),
}

/// Point-in-time view of the core for readers outside its task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreSnapshot {
    pub risk: RiskState,
    pub open_positions: Vec<Position>,
    pub closed_positions: usize,
    pub in_flight: usize,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_exposure: Decimal,
}
