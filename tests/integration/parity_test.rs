//! Backtest and live-path parity

use spikebot::backtest::{run_backtest, FillTiming, SyntheticFeed};
use spikebot::config::{Config, SyntheticConfig};
use spikebot::engine::{DecisionEngine, FillApplied, LiveEngine};
use spikebot::execution::{FillEvent, OrderExecutor, PaperExecutor};
use spikebot::history::PriceSample;
use spikebot::position::CloseReason;
use std::sync::Arc;

fn feed() -> Vec<PriceSample> {
    SyntheticFeed::new(SyntheticConfig {
        seed: 2025,
        markets: vec!["KXBTC-25JAN01".to_string(), "KXETH-25JAN01".to_string()],
        steps: 400,
        spike_probability: 0.05,
        ..SyntheticConfig::default()
    })
    .generate()
}

fn immediate_config() -> Config {
    let mut config = Config::default();
    config.backtest.fill_timing = FillTiming::Immediate;
    config
}

#[tokio::test]
async fn test_backtest_matches_paper_driven_engine() {
    let config = immediate_config();
    let samples = feed();

    let backtest = run_backtest(samples.clone(), &config);

    let executor = PaperExecutor::new();
    let mut engine = DecisionEngine::new(&config);
    for sample in samples {
        for intent in engine.step(sample) {
            let outcome = executor.submit(&intent).await.unwrap();
            let applied = engine
                .on_fill_event(FillEvent {
                    intent_id: intent.id,
                    outcome,
                })
                .unwrap();
            if let FillApplied::Closed(closed) = applied {
                engine.core_mut().confirm_settlement(closed.position.id);
            }
        }
    }

    let live_decisions = engine.core().decisions();
    assert!(!live_decisions.is_empty());
    assert_eq!(backtest.decisions, live_decisions);

    let live_trades = engine.core().positions().closed_positions();
    assert_eq!(&backtest.trades[..live_trades.len()], live_trades);
    assert!(backtest.trades[live_trades.len()..]
        .iter()
        .all(|t| t.reason == CloseReason::EndOfBacktest));
}

#[tokio::test]
async fn test_backtest_matches_live_engine() {
    let config = immediate_config();
    let samples = SyntheticFeed::new(SyntheticConfig {
        seed: 2025,
        markets: vec!["KXBTC-25JAN01".to_string()],
        steps: 400,
        spike_probability: 0.05,
        ..SyntheticConfig::default()
    })
    .generate();

    let backtest = run_backtest(samples.clone(), &config);

    let executor = Arc::new(PaperExecutor::new());
    let mut engine = LiveEngine::start(&config, executor.clone(), None);
    for sample in samples {
        engine.submit_price_sample(sample).await.unwrap();
    }
    let core = engine.shutdown().await.unwrap();

    assert!(!core.decisions().is_empty());
    assert_eq!(backtest.decisions, core.decisions());
    assert!(core.in_flight().next().is_none());
    let accepted = core.decisions().iter().filter(|d| d.is_accepted()).count();
    assert_eq!(executor.fills().await.len(), accepted);
}

#[test]
fn test_backtest_is_deterministic() {
    let config = Config::default();
    let first = run_backtest(feed(), &config);
    let second = run_backtest(feed(), &config);

    assert_eq!(first.decisions, second.decisions);
    assert_eq!(first.trades, second.trades);
    assert_eq!(first.equity_curve, second.equity_curve);
    assert_eq!(first.summary, second.summary);
}

#[test]
fn test_slippage_never_improves_results() {
    let mut config = immediate_config();
    let clean = run_backtest(feed(), &config);
    config.backtest.slippage_pct = rust_decimal_macros::dec!(0.02);
    let slipped = run_backtest(feed(), &config);

    // Same decisions up to the first trade, worse or equal fill on it
    if let (Some(a), Some(b)) = (clean.trades.first(), slipped.trades.first()) {
        if a.position.intent_id == b.position.intent_id {
            let a_cost = a.position.side.contract_price(a.position.entry_price);
            let b_cost = b.position.side.contract_price(b.position.entry_price);
            assert!(b_cost >= a_cost);
        }
    }
}
