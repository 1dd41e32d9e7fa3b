//! Live engine over paper execution

use crate::t;
use rust_decimal_macros::dec;
use spikebot::config::Config;
use spikebot::engine::LiveEngine;
use spikebot::execution::{CloseEvent, PaperBalance, PaperExecutor};
use spikebot::history::PriceSample;
use spikebot::position::CloseReason;
use spikebot::risk::{RejectReason, RiskLevel};
use std::sync::Arc;

fn config() -> Config {
    let mut config = Config::default();
    config.signal.spike_window_size = 6;
    config
}

fn spike_feed(market: &str) -> Vec<PriceSample> {
    [dec!(0.50), dec!(0.50), dec!(0.50), dec!(0.50), dec!(0.50), dec!(0.56)]
        .iter()
        .enumerate()
        .map(|(i, p)| PriceSample::new(market, t(i as i64 * 15), *p))
        .collect()
}

#[tokio::test]
async fn test_paper_session_opens_and_closes() {
    let executor = Arc::new(PaperExecutor::new());
    let balance = Arc::new(PaperBalance::new(dec!(1000)));
    let mut engine = LiveEngine::start(&config(), executor.clone(), Some(balance));

    for sample in spike_feed("KXBTC-25JAN01") {
        engine.submit_price_sample(sample).await.unwrap();
    }

    // Wait for the asynchronous paper fill
    let mut snapshot = engine.snapshot().await.unwrap();
    for _ in 0..100 {
        if !snapshot.open_positions.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        snapshot = engine.snapshot().await.unwrap();
    }
    assert_eq!(snapshot.open_positions.len(), 1);
    let position = snapshot.open_positions[0].clone();
    assert_eq!(position.entry_price, dec!(0.56));

    let closed = engine
        .close_position(CloseEvent {
            position_id: position.id,
            exit_price: dec!(0.60),
            reason: CloseReason::External,
            timestamp: t(200),
        })
        .await
        .unwrap();
    assert!(closed.gross_pnl > dec!(0));
    assert!(engine.confirm_settlement(position.id).await.unwrap());

    let core = engine.shutdown().await.unwrap();
    assert_eq!(core.positions().closed_positions().len(), 1);
    assert_eq!(core.risk_state().level, RiskLevel::Normal);
}

#[tokio::test]
async fn test_insufficient_balance_rejected_live() {
    let executor = Arc::new(PaperExecutor::new());
    let balance = Arc::new(PaperBalance::new(dec!(1)));
    let mut engine = LiveEngine::start(&config(), executor.clone(), Some(balance));

    for sample in spike_feed("KXBTC-25JAN01") {
        engine.submit_price_sample(sample).await.unwrap();
    }
    let core = engine.shutdown().await.unwrap();

    assert_eq!(core.decisions().len(), 1);
    assert!(matches!(
        core.decisions()[0].reject_reason(),
        Some(RejectReason::InsufficientBalance { .. })
    ));
    assert!(executor.fills().await.is_empty());
}
