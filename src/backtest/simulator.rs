//! Backtest simulator
//!
//! Drives a [`DecisionEngine`] sample by sample, filling accepted intents
//! through a [`FillModel`] instead of a venue.

use super::{BacktestResult, BacktestSummary, EquityPoint, FillModel, FillTiming};
use crate::config::Config;
use crate::engine::{DecisionEngine, FillApplied};
use crate::execution::{CloseEvent, FillEvent, TradeIntent};
use crate::history::PriceSample;
use crate::position::{CloseReason, PositionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Replay a feed through a fresh engine built from `config`
pub fn run_backtest(feed: impl IntoIterator<Item = PriceSample>, config: &Config) -> BacktestResult {
    BacktestSimulator::new(config.clone()).run(feed)
}

/// Runs backtest simulation
pub struct BacktestSimulator {
    config: Config,
    fill_model: FillModel,
}

impl BacktestSimulator {
    pub fn new(config: Config) -> Self {
        let fill_model = FillModel::from_config(&config.backtest);
        Self { config, fill_model }
    }

    pub fn run(&self, feed: impl IntoIterator<Item = PriceSample>) -> BacktestResult {
        let mut engine = DecisionEngine::new(&self.config);
        let initial_capital = self.config.backtest.initial_capital;
        let mut pending: Vec<TradeIntent> = Vec::new();
        let mut last_prices: HashMap<String, Decimal> = HashMap::new();
        let mut equity_curve = Vec::new();
        let mut samples = 0usize;

        for sample in feed {
            samples += 1;
            let market_id = sample.market_id.clone();
            let price = sample.price;
            let timestamp = sample.timestamp;

            if self.fill_model.timing() == FillTiming::NextSample {
                let (due, waiting): (Vec<_>, Vec<_>) = pending
                    .drain(..)
                    .partition(|i: &TradeIntent| i.market_id == market_id);
                pending = waiting;
                for intent in due {
                    self.fill(&mut engine, &intent, price, timestamp);
                }
            }

            last_prices.insert(market_id, price);
            for intent in engine.step(sample) {
                match self.fill_model.timing() {
                    FillTiming::Immediate => {
                        self.fill(&mut engine, &intent, intent.reference_price, intent.created_at)
                    }
                    FillTiming::NextSample => pending.push(intent),
                }
            }

            equity_curve.push(EquityPoint {
                timestamp,
                equity: equity(&engine, initial_capital),
            });
        }

        if let Some(end) = engine.now() {
            self.wind_down(&mut engine, pending, &last_prices, end);
            equity_curve.push(EquityPoint {
                timestamp: end,
                equity: equity(&engine, initial_capital),
            });
        }

        let core = engine.into_core();
        let trades = core.positions().closed_positions().to_vec();
        let decisions = core.decisions().to_vec();
        let summary = BacktestSummary::compute(
            initial_capital,
            &trades,
            &decisions,
            &equity_curve,
            samples,
        );

        tracing::info!(
            samples,
            trades = summary.total_trades,
            net_pnl = %summary.net_pnl,
            max_drawdown = %summary.max_drawdown,
            "Backtest complete"
        );

        BacktestResult {
            summary,
            trades,
            decisions,
            equity_curve,
            final_risk: core.risk_state(),
        }
    }

    fn fill(
        &self,
        engine: &mut DecisionEngine,
        intent: &TradeIntent,
        market_price: Decimal,
        at: DateTime<Utc>,
    ) {
        let price = self.fill_model.fill_price(intent, market_price);
        match engine.on_fill_event(FillEvent::filled(intent.id, price, at)) {
            Ok(FillApplied::Closed(closed)) => {
                engine.core_mut().confirm_settlement(closed.position.id);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(intent_id = intent.id, error = %e, "Simulated fill not applied"),
        }
    }

    /// Drop unfilled orders and close what is still open at the last price
    fn wind_down(
        &self,
        engine: &mut DecisionEngine,
        pending: Vec<TradeIntent>,
        last_prices: &HashMap<String, Decimal>,
        end: DateTime<Utc>,
    ) {
        for intent in pending {
            if let Err(e) = engine.withdraw(intent.id) {
                tracing::warn!(intent_id = intent.id, error = %e, "Could not withdraw unfilled intent");
            }
        }

        let open: Vec<(PositionId, String)> = engine
            .core()
            .positions()
            .open_positions()
            .map(|p| (p.id, p.market_id.clone()))
            .collect();

        for (position_id, market_id) in open {
            let Some(&exit_price) = last_prices.get(&market_id) else {
                continue;
            };
            let event = CloseEvent {
                position_id,
                exit_price,
                reason: CloseReason::EndOfBacktest,
                timestamp: end,
            };
            match engine.on_close_event(event) {
                Ok(closed) => {
                    engine.core_mut().confirm_settlement(closed.position.id);
                }
                Err(e) => tracing::warn!(position_id, error = %e, "Could not close position at end"),
            }
        }
    }
}

fn equity(engine: &DecisionEngine, initial_capital: Decimal) -> Decimal {
    initial_capital + engine.core().positions().total_pnl()
}
