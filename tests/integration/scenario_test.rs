//! End-to-end risk and signal scenarios

use crate::t;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use spikebot::config::{FeeConfig, PositionConfig, RiskConfig};
use spikebot::execution::{IntentKind, RetryState, TradeIntent};
use spikebot::fees::FeeCalculator;
use spikebot::history::{PriceHistory, PriceSample};
use spikebot::position::{CloseReason, PositionError, PositionManager};
use spikebot::risk::{PreTradeContext, RejectReason, RiskLevel, RiskManager};
use spikebot::signal::{Direction, Side, SpikeDetector};

fn entry(id: u64, market: &str, size: Decimal, secs: i64) -> TradeIntent {
    TradeIntent {
        id,
        market_id: market.to_string(),
        side: Side::Yes,
        size,
        reference_price: dec!(0.50),
        signal: None,
        created_at: t(secs),
        kind: IntentKind::Entry,
        retry: RetryState::new(0),
    }
}

fn book() -> PositionManager {
    PositionManager::new(PositionConfig::default(), FeeCalculator::new(FeeConfig::free()))
}

fn risk(config: RiskConfig) -> RiskManager {
    RiskManager::new(config, FeeCalculator::new(FeeConfig::free()), dec!(0.10))
}

#[test]
fn test_daily_loss_limit_suspends_trading() {
    let mut rm = risk(RiskConfig {
        daily_loss_limit: dec!(100),
        ..RiskConfig::default()
    });
    let mut positions = book();

    // Three losses of 40 each
    for (i, market) in ["KXA-1", "KXB-1", "KXC-1"].iter().enumerate() {
        let intent = entry(i as u64 + 1, market, dec!(100), i as i64 * 60);
        let position = positions.open(&intent, dec!(0.50), t(i as i64 * 60)).unwrap();
        let closed = positions
            .close(position.id, dec!(0.10), CloseReason::StopLoss, t(i as i64 * 60 + 30))
            .unwrap();
        rm.on_position_closed(&closed, positions.unrealized_pnl());
    }

    assert_eq!(rm.state().realized_pnl, dec!(-120));
    assert_eq!(rm.level(), RiskLevel::Suspended);
    assert!(rm.flag().is_suspended());

    let ctx = PreTradeContext::new(&positions);
    let rejected = rm.review(entry(10, "KXD-1", dec!(10), 600), &ctx).unwrap_err();
    assert!(matches!(rejected, RejectReason::DailyLossLimitExceeded { .. }));
}

#[test]
fn test_cooldown_between_entries() {
    let mut rm = risk(RiskConfig {
        cooldown_seconds: 10,
        ..RiskConfig::default()
    });
    let positions = book();
    let ctx = PreTradeContext::new(&positions);

    assert!(rm.review(entry(1, "KXA-1", dec!(10), 0), &ctx).is_ok());
    let rejected = rm.review(entry(2, "KXA-1", dec!(10), 5), &ctx).unwrap_err();
    assert_eq!(rejected, RejectReason::CooldownActive { remaining_secs: 5 });
}

#[test]
fn test_spike_threshold_scenarios() {
    let detector = SpikeDetector::new(dec!(2.0), 6);

    let mut spiking = PriceHistory::new(6);
    let mut noisy = PriceHistory::new(6);
    let spike = [100, 100, 100, 100, 100, 106];
    let noise = [100, 101, 99, 100, 100, 101];
    for (i, (a, b)) in spike.iter().zip(noise.iter()).enumerate() {
        spiking
            .record(PriceSample::new("M", t(i as i64), Decimal::from(*a)))
            .unwrap();
        noisy
            .record(PriceSample::new("M", t(i as i64), Decimal::from(*b)))
            .unwrap();
    }

    assert_eq!(detector.evaluate("M", spiking.window("M", 6)).direction, Direction::Up);
    assert_eq!(detector.evaluate("M", noisy.window("M", 6)).direction, Direction::None);
}

#[test]
fn test_kalshi_fee_example() {
    let fee = FeeCalculator::new(FeeConfig::default()).compute(dec!(100), dec!(0.65), Side::Yes);
    assert_eq!(fee.taker_fee, dec!(1.60));
}

#[test]
fn test_close_is_idempotent() {
    let mut positions = book();
    let position = positions.open(&entry(1, "KXA-1", dec!(10), 0), dec!(0.50), t(0)).unwrap();
    positions
        .close(position.id, dec!(0.60), CloseReason::TakeProfit, t(30))
        .unwrap();
    let realized = positions.realized_pnl();

    let again = positions.close(position.id, dec!(0.10), CloseReason::StopLoss, t(60));
    assert_eq!(again.unwrap_err(), PositionError::AlreadyClosed(position.id));
    assert_eq!(positions.realized_pnl(), realized);
    assert_eq!(realized, dec!(1.0));
}
