//! Risk management types

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Engine-wide risk level
///
/// Moves only forward (Normal → Warning → Suspended) until an
/// administrative reset or the daily epoch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Normal,
    /// Losing streak; entries are downsized
    Warning,
    /// No new entries
    Suspended,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Normal => "normal",
            RiskLevel::Warning => "warning",
            RiskLevel::Suspended => "suspended",
        }
    }

    /// Numeric value exported as a gauge
    pub fn as_gauge(&self) -> f64 {
        match self {
            RiskLevel::Normal => 0.0,
            RiskLevel::Warning => 1.0,
            RiskLevel::Suspended => 2.0,
        }
    }
}

/// Why trading is suspended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuspensionReason {
    /// Cleared at the next daily epoch
    DailyLossLimitExceeded { daily_pnl: Decimal, limit: Decimal },
    /// Too many consecutive executor failures; needs an explicit reset
    ExecutorErrors { consecutive: u32 },
    /// Suspended by an operator; needs an explicit reset
    Administrative { note: String },
}

impl SuspensionReason {
    /// Whether the daily epoch roll clears this suspension
    pub fn clears_at_epoch(&self) -> bool {
        matches!(self, SuspensionReason::DailyLossLimitExceeded { .. })
    }
}

impl fmt::Display for SuspensionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspensionReason::DailyLossLimitExceeded { daily_pnl, limit } => {
                write!(f, "daily loss limit exceeded ({daily_pnl} vs -{limit})")
            }
            SuspensionReason::ExecutorErrors { consecutive } => {
                write!(f, "{consecutive} consecutive executor errors")
            }
            SuspensionReason::Administrative { note } => write!(f, "administrative: {note}"),
        }
    }
}

/// Why a trade intent was refused
///
/// Rejections are expected outcomes of the policy, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectReason {
    DailyLossLimitExceeded { daily_pnl: Decimal, limit: Decimal },
    Suspended { reason: String },
    CooldownActive { remaining_secs: i64 },
    RecentlyTraded { remaining_secs: i64 },
    PositionAlreadyOpen,
    MaxPositionsReached { open: usize, max: usize },
    DailyTradeLimitReached { trades: u32, max: u32 },
    ExposureExceeded { projected: Decimal, max: Decimal },
    EventExposureExceeded { group: String, projected: Decimal, max: Decimal },
    InsufficientBalance { required: Decimal, available: Decimal },
    NonPositiveEdge { edge: Decimal },
    InvalidSize,
    PositionNotOpen,
    ExitAlreadyPending,
}

impl RejectReason {
    /// Stable label for logs and metrics
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::DailyLossLimitExceeded { .. } => "daily_loss_limit_exceeded",
            RejectReason::Suspended { .. } => "suspended",
            RejectReason::CooldownActive { .. } => "cooldown_active",
            RejectReason::RecentlyTraded { .. } => "recently_traded",
            RejectReason::PositionAlreadyOpen => "position_already_open",
            RejectReason::MaxPositionsReached { .. } => "max_positions_reached",
            RejectReason::DailyTradeLimitReached { .. } => "daily_trade_limit_reached",
            RejectReason::ExposureExceeded { .. } => "exposure_exceeded",
            RejectReason::EventExposureExceeded { .. } => "event_exposure_exceeded",
            RejectReason::InsufficientBalance { .. } => "insufficient_balance",
            RejectReason::NonPositiveEdge { .. } => "non_positive_edge",
            RejectReason::InvalidSize => "invalid_size",
            RejectReason::PositionNotOpen => "position_not_open",
            RejectReason::ExitAlreadyPending => "exit_already_pending",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::DailyLossLimitExceeded { daily_pnl, limit } => {
                write!(f, "daily P&L {daily_pnl} breaches limit -{limit}")
            }
            RejectReason::Suspended { reason } => write!(f, "trading suspended: {reason}"),
            RejectReason::CooldownActive { remaining_secs } => {
                write!(f, "cooldown active for {remaining_secs}s")
            }
            RejectReason::RecentlyTraded { remaining_secs } => {
                write!(f, "market traded recently, {remaining_secs}s remaining")
            }
            RejectReason::PositionAlreadyOpen => write!(f, "position already open"),
            RejectReason::MaxPositionsReached { open, max } => {
                write!(f, "{open} positions open (max {max})")
            }
            RejectReason::DailyTradeLimitReached { trades, max } => {
                write!(f, "{trades} trades today (max {max})")
            }
            RejectReason::ExposureExceeded { projected, max } => {
                write!(f, "projected exposure {projected} exceeds {max}")
            }
            RejectReason::EventExposureExceeded {
                group,
                projected,
                max,
            } => write!(f, "projected exposure {projected} on {group} exceeds {max}"),
            RejectReason::InsufficientBalance {
                required,
                available,
            } => write!(f, "needs {required}, balance {available}"),
            RejectReason::NonPositiveEdge { edge } => {
                write!(f, "fee-adjusted edge {edge} is not positive")
            }
            RejectReason::InvalidSize => write!(f, "size must be positive"),
            RejectReason::PositionNotOpen => write!(f, "position is not open"),
            RejectReason::ExitAlreadyPending => write!(f, "exit already pending"),
        }
    }
}

/// Process-wide risk counters
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RiskState {
    pub level: RiskLevel,
    /// Realized today plus current unrealized P&L
    pub daily_pnl: Decimal,
    /// P&L realized since the epoch began
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub daily_loss_limit: Decimal,
    /// Daily P&L at the last administrative reset; losses count from here
    pub loss_baseline: Decimal,
    pub consecutive_losses: u32,
    pub consecutive_executor_errors: u32,
    /// Entries accepted since the epoch began
    pub trades_today: u32,
    pub suspended: bool,
    pub suspension_reason: Option<SuspensionReason>,
    /// UTC trading day the counters belong to
    pub epoch: Option<NaiveDate>,
}

impl RiskState {
    /// Loss counted against the daily limit
    pub fn loss_since_baseline(&self) -> Decimal {
        self.daily_pnl - self.loss_baseline
    }
}

/// Shared read-only view of the suspension gate
///
/// Only the risk manager flips it; market workers read it before
/// proposing entries.
#[derive(Debug, Clone, Default)]
pub struct SuspensionFlag(Arc<AtomicBool>);

impl SuspensionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_suspended(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(super) fn set(&self, suspended: bool) {
        self.0.store(suspended, Ordering::Release);
    }
}
