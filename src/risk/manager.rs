//! Three-layer risk manager

use super::slippage::{adverse_slippage, SlippageStats};
use super::{
    RejectReason, RiskLevel, RiskState, SettlementTracker, SuspensionFlag, SuspensionReason,
};
use crate::config::{duration_from_secs, RiskConfig};
use crate::execution::{IntentKind, TradeIntent};
use crate::fees::FeeCalculator;
use crate::position::{event_group, ClosedPosition, ExecutionAnomaly, PositionId, PositionManager};
use crate::telemetry::{self, GaugeMetric};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// What the pre-trade layer needs to know about the book
pub struct PreTradeContext<'a> {
    pub positions: &'a PositionManager,
    /// Intents submitted to the executor and not yet resolved
    pub in_flight: Vec<&'a TradeIntent>,
    /// Spendable balance, when the balance collaborator has reported one
    pub balance: Option<Decimal>,
}

impl<'a> PreTradeContext<'a> {
    pub fn new(positions: &'a PositionManager) -> Self {
        Self {
            positions,
            in_flight: Vec::new(),
            balance: None,
        }
    }

    pub fn with_in_flight(mut self, intents: impl IntoIterator<Item = &'a TradeIntent>) -> Self {
        self.in_flight.extend(intents);
        self
    }

    pub fn with_balance(mut self, balance: Option<Decimal>) -> Self {
        self.balance = balance;
        self
    }

    fn in_flight_entries(&self) -> impl Iterator<Item = &&'a TradeIntent> {
        self.in_flight.iter().filter(|i| i.is_entry())
    }
}

/// Gates every trade intent and tracks the day's risk state
///
/// - pre-trade: entry intents pass an ordered list of checks
/// - active: P&L and losing streaks move the level forward
/// - post-trade: slippage and settlement anomalies
pub struct RiskManager {
    config: RiskConfig,
    fees: FeeCalculator,
    take_profit_pct: Decimal,
    state: RiskState,
    flag: SuspensionFlag,
    last_accepted: HashMap<String, DateTime<Utc>>,
    last_closed: HashMap<String, DateTime<Utc>>,
    settlements: SettlementTracker,
    slippage: SlippageStats,
}

impl RiskManager {
    pub fn new(config: RiskConfig, fees: FeeCalculator, take_profit_pct: Decimal) -> Self {
        let state = RiskState {
            daily_loss_limit: config.daily_loss_limit,
            ..RiskState::default()
        };
        Self {
            settlements: SettlementTracker::new(config.settlement_timeout_seconds),
            config,
            fees,
            take_profit_pct,
            state,
            flag: SuspensionFlag::new(),
            last_accepted: HashMap::new(),
            last_closed: HashMap::new(),
            slippage: SlippageStats::default(),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Shared handle to the suspension gate
    pub fn flag(&self) -> SuspensionFlag {
        self.flag.clone()
    }

    pub fn level(&self) -> RiskLevel {
        self.state.level
    }

    pub fn is_suspended(&self) -> bool {
        self.state.suspended
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn snapshot(&self) -> RiskState {
        self.state.clone()
    }

    pub fn slippage_stats(&self) -> &SlippageStats {
        &self.slippage
    }

    pub fn pending_settlements(&self) -> usize {
        self.settlements.pending_count()
    }

    /// Review an intent; entries may come back resized
    pub fn review(
        &mut self,
        intent: TradeIntent,
        ctx: &PreTradeContext<'_>,
    ) -> Result<TradeIntent, RejectReason> {
        let result = match intent.kind {
            IntentKind::Entry => self.check_entry(intent, ctx),
            IntentKind::Exit { position_id, .. } => {
                Self::check_exit(position_id, ctx).map(|_| intent)
            }
        };

        match &result {
            Ok(accepted) => {
                if accepted.is_entry() {
                    self.last_accepted
                        .insert(accepted.market_id.clone(), accepted.created_at);
                    self.state.trades_today += 1;
                }
                telemetry::increment(telemetry::CounterMetric::IntentsAccepted);
            }
            Err(reason) => {
                telemetry::record_rejection(reason.code());
            }
        }
        result
    }

    fn check_entry(
        &self,
        mut intent: TradeIntent,
        ctx: &PreTradeContext<'_>,
    ) -> Result<TradeIntent, RejectReason> {
        if self.state.suspended {
            return Err(match &self.state.suspension_reason {
                Some(SuspensionReason::DailyLossLimitExceeded { daily_pnl, limit }) => {
                    RejectReason::DailyLossLimitExceeded {
                        daily_pnl: *daily_pnl,
                        limit: *limit,
                    }
                }
                Some(other) => RejectReason::Suspended {
                    reason: other.to_string(),
                },
                None => RejectReason::Suspended {
                    reason: "unspecified".to_string(),
                },
            });
        }

        if self.state.level == RiskLevel::Warning {
            intent.size *= self.config.warning_size_factor;
        }
        if intent.size <= Decimal::ZERO {
            return Err(RejectReason::InvalidSize);
        }

        let now = intent.created_at;
        if let Some(remaining_secs) = self
            .last_accepted
            .get(&intent.market_id)
            .and_then(|at| remaining(*at, self.config.cooldown_seconds, now))
        {
            return Err(RejectReason::CooldownActive { remaining_secs });
        }
        if let Some(remaining_secs) = self
            .last_closed
            .get(&intent.market_id)
            .and_then(|at| remaining(*at, self.config.recent_traded_seconds, now))
        {
            return Err(RejectReason::RecentlyTraded { remaining_secs });
        }

        let positions = ctx.positions;
        if !positions.config().multi_position
            && (positions.has_open(&intent.market_id)
                || ctx
                    .in_flight_entries()
                    .any(|i| i.market_id == intent.market_id))
        {
            return Err(RejectReason::PositionAlreadyOpen);
        }

        let open = positions.open_count() + ctx.in_flight_entries().count();
        if open >= self.config.max_concurrent_positions {
            return Err(RejectReason::MaxPositionsReached {
                open,
                max: self.config.max_concurrent_positions,
            });
        }

        if self.state.trades_today >= self.config.max_daily_trades {
            return Err(RejectReason::DailyTradeLimitReached {
                trades: self.state.trades_today,
                max: self.config.max_daily_trades,
            });
        }

        let notional = intent.notional();
        let in_flight: Decimal = ctx.in_flight_entries().map(|i| i.notional()).sum();
        let projected = positions.total_exposure() + in_flight + notional;
        if projected > self.config.max_exposure {
            return Err(RejectReason::ExposureExceeded {
                projected,
                max: self.config.max_exposure,
            });
        }

        if let Some(max) = self.config.max_event_exposure {
            let group = event_group(&intent.market_id);
            let in_flight: Decimal = ctx
                .in_flight_entries()
                .filter(|i| event_group(&i.market_id) == group)
                .map(|i| i.notional())
                .sum();
            let projected = positions.event_exposure(group) + in_flight + notional;
            if projected > max {
                return Err(RejectReason::EventExposureExceeded {
                    group: group.to_string(),
                    projected,
                    max,
                });
            }
        }

        if let Some(available) = ctx.balance {
            let required =
                notional + self.fees.entry_fee(intent.size, intent.reference_price, intent.side);
            if required > available {
                return Err(RejectReason::InsufficientBalance {
                    required,
                    available,
                });
            }
        }

        let edge = self.fees.expected_edge(
            intent.size,
            intent.reference_price,
            intent.side,
            self.take_profit_pct,
        );
        if edge <= Decimal::ZERO {
            return Err(RejectReason::NonPositiveEdge { edge });
        }

        Ok(intent)
    }

    /// Exits are allowed while suspended
    fn check_exit(position_id: PositionId, ctx: &PreTradeContext<'_>) -> Result<(), RejectReason> {
        if !ctx.positions.get(position_id).is_some_and(|p| p.is_open()) {
            return Err(RejectReason::PositionNotOpen);
        }
        if ctx
            .in_flight
            .iter()
            .any(|i| i.position_id() == Some(position_id))
        {
            return Err(RejectReason::ExitAlreadyPending);
        }
        Ok(())
    }

    /// Measure a fill against its intent
    ///
    /// Returns the anomaly to attach to the position when the adverse
    /// slippage exceeds the tolerance. The trade itself stands.
    pub fn on_fill(&mut self, intent: &TradeIntent, fill_price: Decimal) -> Option<ExecutionAnomaly> {
        self.state.consecutive_executor_errors = 0;

        let slippage = adverse_slippage(intent, fill_price);
        let tolerance = self.config.slippage_tolerance_pct;
        let violation = slippage > tolerance;
        self.slippage.record(slippage, violation);

        if !violation {
            return None;
        }
        tracing::warn!(
            intent_id = intent.id,
            market = %intent.market_id,
            intended = %intent.reference_price,
            filled = %fill_price,
            slippage = %slippage,
            tolerance = %tolerance,
            "Slippage outside tolerance"
        );
        telemetry::record_anomaly("slippage_violation");
        Some(ExecutionAnomaly::SlippageViolation {
            intent_id: intent.id,
            intended_price: intent.reference_price,
            fill_price,
            slippage_pct: slippage,
            tolerance_pct: tolerance,
        })
    }

    /// Count a rejected, timed out or failed submission
    pub fn on_order_failure(&mut self, intent: &TradeIntent) {
        self.state.consecutive_executor_errors += 1;
        let limit = self.config.max_consecutive_executor_errors;
        tracing::debug!(
            intent_id = intent.id,
            consecutive = self.state.consecutive_executor_errors,
            "Order failed"
        );
        if limit > 0 && self.state.consecutive_executor_errors >= limit && !self.state.suspended {
            self.suspend(SuspensionReason::ExecutorErrors {
                consecutive: self.state.consecutive_executor_errors,
            });
        }
    }

    /// Update unrealized P&L after a mark
    pub fn on_mark(&mut self, unrealized: Decimal) {
        self.state.unrealized_pnl = unrealized;
        self.refresh_daily_pnl();
    }

    /// Account for a closed position
    pub fn on_position_closed(&mut self, closed: &ClosedPosition, unrealized: Decimal) {
        let market = &closed.position.market_id;
        self.state.realized_pnl += closed.realized_pnl;
        self.state.unrealized_pnl = unrealized;
        self.last_closed.insert(market.clone(), closed.closed_at);
        self.settlements.register(closed.position.id, closed.closed_at);

        if closed.is_loss() {
            self.state.consecutive_losses += 1;
            if self.state.level == RiskLevel::Normal
                && self.config.consecutive_loss_warning_count > 0
                && self.state.consecutive_losses >= self.config.consecutive_loss_warning_count
            {
                self.state.level = RiskLevel::Warning;
                tracing::warn!(
                    consecutive_losses = self.state.consecutive_losses,
                    size_factor = %self.config.warning_size_factor,
                    "Risk level raised to warning"
                );
            }
        } else {
            self.state.consecutive_losses = 0;
        }

        self.refresh_daily_pnl();
    }

    fn refresh_daily_pnl(&mut self) {
        self.state.daily_pnl = self.state.realized_pnl + self.state.unrealized_pnl;

        if !self.state.suspended
            && self.state.loss_since_baseline() <= -self.config.daily_loss_limit
        {
            self.suspend(SuspensionReason::DailyLossLimitExceeded {
                daily_pnl: self.state.daily_pnl,
                limit: self.config.daily_loss_limit,
            });
        }
        self.publish();
    }

    fn suspend(&mut self, reason: SuspensionReason) {
        tracing::error!(reason = %reason, daily_pnl = %self.state.daily_pnl, "Trading suspended");
        self.state.level = RiskLevel::Suspended;
        self.state.suspended = true;
        self.state.suspension_reason = Some(reason);
        self.flag.set(true);
        self.publish();
    }

    /// Operator-initiated suspension
    pub fn suspend_administratively(&mut self, note: impl Into<String>) {
        self.suspend(SuspensionReason::Administrative { note: note.into() });
    }

    /// Administrative override back to Normal
    ///
    /// Losses are counted afresh from the current daily P&L.
    pub fn reset(&mut self, note: &str) {
        tracing::warn!(
            note,
            previous_level = self.state.level.as_str(),
            reason = ?self.state.suspension_reason,
            daily_pnl = %self.state.daily_pnl,
            "Risk state reset"
        );
        self.state.level = RiskLevel::Normal;
        self.state.suspended = false;
        self.state.suspension_reason = None;
        self.state.consecutive_losses = 0;
        self.state.consecutive_executor_errors = 0;
        self.state.loss_baseline = self.state.daily_pnl.min(Decimal::ZERO);
        self.flag.set(false);
        self.publish();
    }

    /// Start a new trading day when `now` crosses the UTC date boundary
    ///
    /// Returns true when the counters were rolled. Suspensions that need an
    /// operator survive the roll.
    pub fn roll_epoch(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        let Some(epoch) = self.state.epoch else {
            self.state.epoch = Some(today);
            return false;
        };
        if today <= epoch {
            return false;
        }

        tracing::info!(
            previous = %epoch,
            epoch = %today,
            realized_pnl = %self.state.realized_pnl,
            trades = self.state.trades_today,
            "Daily risk epoch rolled"
        );
        self.state.epoch = Some(today);
        self.state.realized_pnl = Decimal::ZERO;
        self.state.trades_today = 0;
        self.state.consecutive_losses = 0;
        self.state.loss_baseline = Decimal::ZERO;

        let keep_suspension = self
            .state
            .suspension_reason
            .as_ref()
            .is_some_and(|r| !r.clears_at_epoch());
        if !keep_suspension {
            self.state.level = RiskLevel::Normal;
            self.state.suspended = false;
            self.state.suspension_reason = None;
            self.flag.set(false);
        }
        self.refresh_daily_pnl();
        true
    }

    /// Returns false when no settlement was pending for the position
    pub fn confirm_settlement(&mut self, position_id: PositionId) -> bool {
        let confirmed = self.settlements.confirm(position_id);
        if confirmed {
            tracing::debug!(position_id, "Settlement confirmed");
        }
        confirmed
    }

    /// Settlements past their deadline; each is reported once
    pub fn sweep_settlements(&mut self, now: DateTime<Utc>) -> Vec<(PositionId, ExecutionAnomaly)> {
        let expired = self.settlements.sweep(now);
        for (position_id, _) in &expired {
            tracing::warn!(position_id, "Settlement not confirmed in time, flagged for review");
            telemetry::record_anomaly("settlement_timeout");
        }
        if !expired.is_empty() {
            self.publish();
        }
        expired
    }

    fn publish(&self) {
        telemetry::set_gauge_decimal(GaugeMetric::DailyPnl, self.state.daily_pnl);
        telemetry::set_gauge_decimal(GaugeMetric::RealizedPnl, self.state.realized_pnl);
        telemetry::set_gauge_decimal(GaugeMetric::UnrealizedPnl, self.state.unrealized_pnl);
        telemetry::set_gauge(GaugeMetric::RiskLevel, self.state.level.as_gauge());
        telemetry::set_gauge(
            GaugeMetric::PendingSettlements,
            self.settlements.pending_count() as f64,
        );
    }
}

/// Whole seconds left in a window opened at `since`, rounded up
fn remaining(since: DateTime<Utc>, window_secs: u64, now: DateTime<Utc>) -> Option<i64> {
    let until = duration_from_secs(window_secs)
        .and_then(|window| since.checked_add_signed(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    if now >= until {
        return None;
    }
    let millis = (until - now).num_milliseconds();
    Some((millis + 999) / 1000)
}
