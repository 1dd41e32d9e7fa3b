//! Trading core
//!
//! The single owner of positions, risk state and in-flight orders. Both the
//! backtest and the live engine drive exactly this type; time is always
//! passed in by the caller.

use super::{CoreSnapshot, DecisionOutcome, DecisionRecord, EngineError, FillApplied};
use crate::config::{duration_from_secs, Config};
use crate::execution::{
    CloseEvent, ExecutionOutcome, FillEvent, IdSequence, IntentId, IntentKind, TradeIntent,
};
use crate::fees::FeeCalculator;
use crate::position::{ClosedPosition, ExecutionAnomaly, PositionId, PositionManager};
use crate::risk::{PreTradeContext, RejectReason, RiskManager, RiskState, SuspensionFlag};
use crate::signal::Signal;
use crate::telemetry::{self, CounterMetric, GaugeMetric};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

pub struct TradingCore {
    positions: PositionManager,
    risk: RiskManager,
    ids: IdSequence,
    in_flight: BTreeMap<IntentId, TradeIntent>,
    decisions: Vec<DecisionRecord>,
    trade_size: Decimal,
    max_order_retries: u32,
    /// `None` when the configured backoff is out of range; such orders are never retried
    retry_backoff: Option<Duration>,
}

impl TradingCore {
    pub fn new(config: &Config) -> Self {
        let fees = FeeCalculator::new(config.fees.clone());
        let positions = PositionManager::new(config.position.clone(), fees.clone())
            .with_exit_retries(config.execution.max_order_retries);
        let risk = RiskManager::new(
            config.risk.clone(),
            fees,
            config.position.take_profit_pct,
        );
        Self {
            positions,
            risk,
            ids: IdSequence::new(),
            in_flight: BTreeMap::new(),
            decisions: Vec::new(),
            trade_size: config.position.trade_size,
            max_order_retries: config.execution.max_order_retries,
            retry_backoff: duration_from_secs(config.execution.retry_backoff_seconds),
        }
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    pub fn flag(&self) -> SuspensionFlag {
        self.risk.flag()
    }

    pub fn decisions(&self) -> &[DecisionRecord] {
        &self.decisions
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &TradeIntent> {
        self.in_flight.values()
    }

    /// Turn a signal into an entry intent and run it through pre-trade checks
    ///
    /// Signals without a direction produce nothing. Every intent that is
    /// created lands in the decision log, accepted or not.
    pub fn propose(
        &mut self,
        signal: &Signal,
        now: DateTime<Utc>,
        balance: Option<Decimal>,
    ) -> Option<Result<TradeIntent, RejectReason>> {
        self.risk.roll_epoch(now);
        let intent = TradeIntent::entry(
            self.ids.next_id(),
            signal,
            self.trade_size,
            now,
            self.max_order_retries,
        )?;
        Some(self.admit(intent, balance))
    }

    fn admit(
        &mut self,
        intent: TradeIntent,
        balance: Option<Decimal>,
    ) -> Result<TradeIntent, RejectReason> {
        let proposed = intent.clone();
        let ctx = PreTradeContext::new(&self.positions)
            .with_in_flight(self.in_flight.values())
            .with_balance(balance);
        let result = self.risk.review(intent, &ctx);

        match &result {
            Ok(accepted) => {
                tracing::info!(
                    intent_id = accepted.id,
                    market = %accepted.market_id,
                    side = %accepted.side,
                    size = %accepted.size,
                    price = %accepted.reference_price,
                    entry = accepted.is_entry(),
                    "Intent accepted"
                );
                self.decisions
                    .push(DecisionRecord::new(accepted, DecisionOutcome::Accepted));
                self.in_flight.insert(accepted.id, accepted.clone());
            }
            Err(reason) => {
                tracing::info!(
                    intent_id = proposed.id,
                    market = %proposed.market_id,
                    reason = reason.code(),
                    detail = %reason,
                    "Intent rejected"
                );
                self.decisions.push(DecisionRecord::new(
                    &proposed,
                    DecisionOutcome::Rejected {
                        reason: reason.clone(),
                    },
                ));
            }
        }
        self.publish();
        result
    }

    /// Revalue a market and return the exit intents that passed review
    ///
    /// Also expires overdue settlements.
    pub fn mark(&mut self, market_id: &str, price: Decimal, now: DateTime<Utc>) -> Vec<TradeIntent> {
        self.risk.roll_epoch(now);
        let candidates = self
            .positions
            .mark_to_market(market_id, price, now, &mut self.ids);
        self.risk.on_mark(self.positions.unrealized_pnl());

        let mut accepted = Vec::new();
        for intent in candidates {
            let position_id = intent.position_id();
            match self.admit(intent, None) {
                Ok(intent) => accepted.push(intent),
                Err(RejectReason::ExitAlreadyPending) => {}
                Err(_) => {
                    if let Some(id) = position_id {
                        self.positions.release_exit(id);
                    }
                }
            }
        }

        self.sweep_settlements(now);
        accepted
    }

    /// Flag closed positions whose settlement deadline passed by `now`
    pub fn sweep_settlements(&mut self, now: DateTime<Utc>) -> Vec<PositionId> {
        let expired = self.risk.sweep_settlements(now);
        let mut flagged = Vec::with_capacity(expired.len());
        for (position_id, anomaly) in expired {
            self.attach_anomaly(position_id, anomaly);
            match self.positions.flag_for_review(position_id) {
                Ok(()) => flagged.push(position_id),
                Err(e) => {
                    tracing::warn!(position_id, error = %e, "Could not flag position for review")
                }
            }
        }
        flagged
    }

    /// Apply an executor outcome to the in-flight intent it answers
    pub fn on_fill(
        &mut self,
        event: FillEvent,
        now: DateTime<Utc>,
    ) -> Result<FillApplied, EngineError> {
        let Some(intent) = self.in_flight.remove(&event.intent_id) else {
            return Err(EngineError::UnknownIntent(event.intent_id));
        };

        let applied = match event.outcome {
            ExecutionOutcome::Filled { price, timestamp } => {
                self.apply_fill(intent, price, timestamp)?
            }
            ExecutionOutcome::Rejected { reason } => {
                tracing::warn!(
                    intent_id = intent.id,
                    market = %intent.market_id,
                    reason = %reason,
                    "Order rejected"
                );
                self.apply_failure(intent, now)
            }
            ExecutionOutcome::TimedOut => {
                tracing::warn!(
                    intent_id = intent.id,
                    market = %intent.market_id,
                    "Order timed out"
                );
                self.apply_failure(intent, now)
            }
        };
        self.publish();
        Ok(applied)
    }

    fn apply_fill(
        &mut self,
        intent: TradeIntent,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<FillApplied, EngineError> {
        telemetry::increment(CounterMetric::Fills);
        let anomaly = self.risk.on_fill(&intent, price);

        match intent.kind {
            IntentKind::Entry => {
                let mut position = self.positions.open(&intent, price, timestamp)?;
                if let Some(anomaly) = anomaly {
                    self.attach_anomaly(position.id, anomaly.clone());
                    position.anomalies.push(anomaly);
                }
                Ok(FillApplied::Opened(position))
            }
            IntentKind::Exit {
                position_id,
                reason,
            } => {
                let mut closed = self.positions.close(position_id, price, reason, timestamp)?;
                if let Some(anomaly) = anomaly {
                    self.attach_anomaly(position_id, anomaly.clone());
                    closed.position.anomalies.push(anomaly);
                }
                self.after_close(&closed);
                Ok(FillApplied::Closed(closed))
            }
        }
    }

    fn apply_failure(&mut self, mut intent: TradeIntent, now: DateTime<Utc>) -> FillApplied {
        telemetry::increment(CounterMetric::OrderFailures);
        self.risk.on_order_failure(&intent);

        let entry_blocked = intent.is_entry() && self.risk.is_suspended();
        let retry_at = self
            .retry_backoff
            .and_then(|backoff| now.checked_add_signed(backoff))
            .filter(|_| intent.retry.attempts_remaining > 0 && !entry_blocked);
        if let Some(at) = retry_at {
            intent.retry.attempts_remaining -= 1;
            intent.retry.next_retry_at = Some(at);
            tracing::info!(
                intent_id = intent.id,
                attempts_remaining = intent.retry.attempts_remaining,
                retry_at = %at,
                "Order scheduled for retry"
            );
            let intent_id = intent.id;
            self.in_flight.insert(intent_id, intent);
            return FillApplied::Retrying { intent_id, at };
        }

        tracing::warn!(intent_id = intent.id, market = %intent.market_id, "Order abandoned");
        if let Some(position_id) = intent.position_id() {
            self.positions.release_exit(position_id);
        }
        FillApplied::Abandoned(intent)
    }

    /// Intents whose retry time has come, ready to resubmit
    pub fn due_retries(&mut self, now: DateTime<Utc>) -> Vec<TradeIntent> {
        let due: Vec<IntentId> = self
            .in_flight
            .values()
            .filter(|i| i.retry.is_due(now))
            .map(|i| i.id)
            .collect();

        let mut ready = Vec::with_capacity(due.len());
        for id in due {
            let suspended = self.risk.is_suspended();
            let Some(intent) = self.in_flight.get_mut(&id) else {
                continue;
            };
            if intent.is_entry() && suspended {
                tracing::info!(intent_id = id, "Dropping entry retry while suspended");
                self.in_flight.remove(&id);
                continue;
            }
            intent.retry.next_retry_at = None;
            ready.push(intent.clone());
        }
        ready
    }

    /// Remove an intent that has not been filled
    pub fn withdraw(&mut self, intent_id: IntentId) -> Result<TradeIntent, EngineError> {
        let intent = self
            .in_flight
            .remove(&intent_id)
            .ok_or(EngineError::UnknownIntent(intent_id))?;
        if let Some(position_id) = intent.position_id() {
            self.positions.release_exit(position_id);
        }
        tracing::info!(intent_id, market = %intent.market_id, "Intent withdrawn");
        self.publish();
        Ok(intent)
    }

    /// Close a position outside the exit-intent flow
    pub fn on_close(&mut self, event: CloseEvent) -> Result<ClosedPosition, EngineError> {
        let closed = self.positions.close(
            event.position_id,
            event.exit_price,
            event.reason,
            event.timestamp,
        )?;
        let stale: Vec<IntentId> = self
            .in_flight
            .values()
            .filter(|i| i.position_id() == Some(event.position_id))
            .map(|i| i.id)
            .collect();
        for id in stale {
            self.in_flight.remove(&id);
        }
        self.after_close(&closed);
        self.publish();
        Ok(closed)
    }

    fn after_close(&mut self, closed: &ClosedPosition) {
        telemetry::increment(CounterMetric::PositionsClosed);
        self.risk
            .on_position_closed(closed, self.positions.unrealized_pnl());
    }

    fn attach_anomaly(&mut self, position_id: PositionId, anomaly: ExecutionAnomaly) {
        if let Err(e) = self.positions.record_anomaly(position_id, anomaly) {
            tracing::warn!(position_id, error = %e, "Could not record anomaly");
        }
    }

    pub fn confirm_settlement(&mut self, position_id: PositionId) -> bool {
        self.risk.confirm_settlement(position_id)
    }

    pub fn reset(&mut self, note: &str) {
        self.risk.reset(note);
    }

    pub fn suspend(&mut self, note: &str) {
        self.risk.suspend_administratively(note);
    }

    pub fn risk_state(&self) -> RiskState {
        self.risk.snapshot()
    }

    pub fn snapshot(&self) -> CoreSnapshot {
        CoreSnapshot {
            risk: self.risk.snapshot(),
            open_positions: self.positions.open_positions().cloned().collect(),
            closed_positions: self.positions.closed_positions().len(),
            in_flight: self.in_flight.len(),
            realized_pnl: self.positions.realized_pnl(),
            unrealized_pnl: self.positions.unrealized_pnl(),
            total_exposure: self.positions.total_exposure(),
        }
    }

    fn publish(&self) {
        telemetry::set_gauge(GaugeMetric::OpenPositions, self.positions.open_count() as f64);
        telemetry::set_gauge(GaugeMetric::InFlightOrders, self.in_flight.len() as f64);
        telemetry::set_gauge_decimal(GaugeMetric::TotalExposure, self.positions.total_exposure());
    }
}
