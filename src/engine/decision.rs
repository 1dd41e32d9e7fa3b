//! Decision engine
//!
//! Price history and strategies in front of a [`TradingCore`]. This is the
//! synchronous surface the backtest replays through.

use super::{EngineError, FillApplied, TradingCore};
use crate::config::Config;
use crate::execution::{CloseEvent, FillEvent, IntentId, TradeIntent};
use crate::history::{PriceHistory, PriceSample};
use crate::position::ClosedPosition;
use crate::signal::StrategySet;
use crate::telemetry::{self, CounterMetric, LatencyMetric};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::time::Instant;

pub struct DecisionEngine {
    history: PriceHistory,
    strategies: StrategySet,
    core: TradingCore,
    /// Newest sample timestamp seen; the engine's notion of now
    clock: Option<DateTime<Utc>>,
    balance: Option<Decimal>,
}

impl DecisionEngine {
    pub fn new(config: &Config) -> Self {
        Self::from_parts(
            PriceHistory::from_config(&config.history),
            StrategySet::from_config(&config.signal),
            TradingCore::new(config),
        )
    }

    pub fn from_parts(history: PriceHistory, strategies: StrategySet, core: TradingCore) -> Self {
        Self {
            history,
            strategies,
            core,
            clock: None,
            balance: None,
        }
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    pub fn strategies(&self) -> &StrategySet {
        &self.strategies
    }

    pub fn core(&self) -> &TradingCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut TradingCore {
        &mut self.core
    }

    pub fn into_core(self) -> TradingCore {
        self.core
    }

    pub fn now(&self) -> Option<DateTime<Utc>> {
        self.clock
    }

    /// Balance used by the pre-trade check; `None` skips it
    pub fn set_balance(&mut self, balance: Option<Decimal>) {
        self.balance = balance;
    }

    /// Record a sample and revalue the market's positions
    ///
    /// Returns the exit intents that passed review. Out-of-order samples are
    /// logged and dropped.
    pub fn submit_price_sample(&mut self, sample: PriceSample) -> Vec<TradeIntent> {
        self.ingest(sample).unwrap_or_default()
    }

    /// `None` when the sample was refused by the history
    fn ingest(&mut self, sample: PriceSample) -> Option<Vec<TradeIntent>> {
        let market_id = sample.market_id.clone();
        let price = sample.price;
        let timestamp = sample.timestamp;

        if let Err(e) = self.history.record(sample) {
            tracing::warn!(error = %e, "Dropping price sample");
            telemetry::increment(CounterMetric::OutOfOrderSamples);
            return None;
        }
        self.clock = Some(self.clock.map_or(timestamp, |c| c.max(timestamp)));

        Some(self.core.mark(&market_id, price, timestamp))
    }

    /// Run the strategies over a market's history and propose an entry
    ///
    /// Returns the entry intent when one was accepted.
    pub fn evaluate_market(&mut self, market_id: &str, now: DateTime<Utc>) -> Option<TradeIntent> {
        let signal = self.strategies.evaluate(market_id, &self.history)?;
        telemetry::increment(CounterMetric::Signals);
        tracing::debug!(
            market = market_id,
            strategy = signal.strategy.as_str(),
            direction = ?signal.direction,
            magnitude = %signal.magnitude,
            price = %signal.price,
            "Signal"
        );
        self.core.propose(&signal, now, self.balance)?.ok()
    }

    /// Submit a sample and evaluate its market
    ///
    /// Exits come first, then any entry.
    pub fn step(&mut self, sample: PriceSample) -> Vec<TradeIntent> {
        let started = Instant::now();
        let market_id = sample.market_id.clone();
        let timestamp = sample.timestamp;

        let Some(mut intents) = self.ingest(sample) else {
            return Vec::new();
        };
        intents.extend(self.evaluate_market(&market_id, timestamp));

        telemetry::record_latency(LatencyMetric::Decision, started.elapsed());
        intents
    }

    /// Apply an executor outcome, using the engine clock for retry timing
    pub fn on_fill_event(&mut self, event: FillEvent) -> Result<FillApplied, EngineError> {
        let now = self.clock.unwrap_or_else(Utc::now);
        self.core.on_fill(event, now)
    }

    pub fn on_close_event(&mut self, event: CloseEvent) -> Result<ClosedPosition, EngineError> {
        self.core.on_close(event)
    }

    pub fn due_retries(&mut self) -> Vec<TradeIntent> {
        match self.clock {
            Some(now) => self.core.due_retries(now),
            None => Vec::new(),
        }
    }

    pub fn withdraw(&mut self, intent_id: IntentId) -> Result<TradeIntent, EngineError> {
        self.core.withdraw(intent_id)
    }
}
