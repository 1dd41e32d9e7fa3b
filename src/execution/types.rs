//! Execution types

use crate::position::{CloseReason, PositionId};
use crate::signal::{Side, Signal, SignalRef};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade intent identifier, sequential per engine
pub type IntentId = u64;

/// Monotonic id allocator
#[derive(Debug, Clone)]
pub struct IdSequence {
    next: u64,
}

impl IdSequence {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// What an intent does when filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntentKind {
    /// Open a new position
    Entry,
    /// Close an existing position
    Exit {
        position_id: PositionId,
        reason: CloseReason,
    },
}

/// Resubmission bookkeeping for failed orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    pub attempts_remaining: u32,
    /// Earliest time the intent may be resubmitted; `None` while not waiting
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl RetryState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            attempts_remaining: max_retries,
            next_retry_at: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.is_some_and(|at| at <= now)
    }
}

/// A proposed order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub id: IntentId,
    pub market_id: String,
    pub side: Side,
    /// Contracts
    pub size: Decimal,
    /// YES price the decision was made at
    pub reference_price: Decimal,
    pub signal: Option<SignalRef>,
    pub created_at: DateTime<Utc>,
    pub kind: IntentKind,
    pub retry: RetryState,
}

impl TradeIntent {
    /// Entry intent for an actionable signal; `None` for a no-trade signal
    pub fn entry(
        id: IntentId,
        signal: &Signal,
        size: Decimal,
        created_at: DateTime<Utc>,
        max_retries: u32,
    ) -> Option<Self> {
        let side = signal.side()?;
        Some(Self {
            id,
            market_id: signal.market_id.clone(),
            side,
            size,
            reference_price: signal.price,
            signal: Some(signal.reference()),
            created_at,
            kind: IntentKind::Entry,
            retry: RetryState::new(max_retries),
        })
    }

    /// Exit intent for an open position
    #[allow(clippy::too_many_arguments)]
    pub fn exit(
        id: IntentId,
        position_id: PositionId,
        market_id: &str,
        side: Side,
        size: Decimal,
        price: Decimal,
        reason: CloseReason,
        created_at: DateTime<Utc>,
        max_retries: u32,
    ) -> Self {
        Self {
            id,
            market_id: market_id.to_string(),
            side,
            size,
            reference_price: price,
            signal: None,
            created_at,
            kind: IntentKind::Exit {
                position_id,
                reason,
            },
            retry: RetryState::new(max_retries),
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self.kind, IntentKind::Entry)
    }

    /// Capital committed if this intent fills at its reference price
    pub fn notional(&self) -> Decimal {
        self.size * self.side.contract_price(self.reference_price)
    }

    pub fn position_id(&self) -> Option<PositionId> {
        match self.kind {
            IntentKind::Entry => None,
            IntentKind::Exit { position_id, .. } => Some(position_id),
        }
    }
}

/// Result reported by the order executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Filled {
        /// YES price of the fill
        price: Decimal,
        timestamp: DateTime<Utc>,
    },
    Rejected {
        reason: String,
    },
    TimedOut,
}

impl ExecutionOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, ExecutionOutcome::Filled { .. })
    }
}

/// Executor outcome for a submitted intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillEvent {
    pub intent_id: IntentId,
    pub outcome: ExecutionOutcome,
}

impl FillEvent {
    pub fn filled(intent_id: IntentId, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            intent_id,
            outcome: ExecutionOutcome::Filled { price, timestamp },
        }
    }

    pub fn rejected(intent_id: IntentId, reason: impl Into<String>) -> Self {
        Self {
            intent_id,
            outcome: ExecutionOutcome::Rejected {
                reason: reason.into(),
            },
        }
    }

    pub fn timed_out(intent_id: IntentId) -> Self {
        Self {
            intent_id,
            outcome: ExecutionOutcome::TimedOut,
        }
    }
}

/// A position closed outside the engine (manual close, market settlement)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseEvent {
    pub position_id: PositionId,
    pub exit_price: Decimal,
    pub reason: CloseReason,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{PriceSample, Window};
    use crate::signal::{Direction, StrategyKind};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn signal(direction: Direction) -> Signal {
        let at = Utc.with_ymd_and_hms(2025, 1, 6, 14, 0, 0).unwrap();
        let data = vec![PriceSample::new("KXBTC", at, dec!(0.62))];
        let mut signal = Signal::none("KXBTC", StrategyKind::Spike, &Window::from(data.as_slice()));
        signal.direction = direction;
        signal.magnitude = dec!(2.5);
        signal
    }

    #[test]
    fn test_id_sequence() {
        let mut ids = IdSequence::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
    }

    #[test]
    fn test_entry_from_signal() {
        let s = signal(Direction::Down);
        let intent = TradeIntent::entry(7, &s, dec!(10), s.timestamp, 3).unwrap();
        assert_eq!(intent.side, Side::No);
        assert_eq!(intent.reference_price, dec!(0.62));
        assert!(intent.is_entry());
        assert_eq!(intent.retry.attempts_remaining, 3);
        // No contract costs 0.38
        assert_eq!(intent.notional(), dec!(3.8));
        assert_eq!(intent.signal.unwrap().magnitude, dec!(2.5));
    }

    #[test]
    fn test_no_entry_without_direction() {
        let s = signal(Direction::None);
        assert!(TradeIntent::entry(1, &s, dec!(10), s.timestamp, 3).is_none());
    }

    #[test]
    fn test_exit_intent() {
        let at = Utc.with_ymd_and_hms(2025, 1, 6, 14, 0, 0).unwrap();
        let intent = TradeIntent::exit(
            2,
            9,
            "KXBTC",
            Side::Yes,
            dec!(10),
            dec!(0.70),
            CloseReason::TakeProfit,
            at,
            0,
        );
        assert!(!intent.is_entry());
        assert_eq!(intent.position_id(), Some(9));
    }

    #[test]
    fn test_retry_due() {
        let at = Utc.with_ymd_and_hms(2025, 1, 6, 14, 0, 0).unwrap();
        let mut retry = RetryState::new(2);
        assert!(!retry.is_due(at));
        retry.next_retry_at = Some(at);
        assert!(retry.is_due(at));
        assert!(!retry.is_due(at - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_outcome_serde_tag() {
        let json = serde_json::to_string(&ExecutionOutcome::TimedOut).unwrap();
        assert_eq!(json, r#"{"status":"timed_out"}"#);
    }
}
