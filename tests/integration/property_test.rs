//! Property tests

use crate::t;
use proptest::prelude::*;
use rust_decimal::Decimal;
use spikebot::config::{FeeConfig, PositionConfig, RiskConfig};
use spikebot::execution::{IntentKind, RetryState, TradeIntent};
use spikebot::fees::FeeCalculator;
use spikebot::history::{PriceHistory, PriceSample};
use spikebot::position::{CloseReason, PositionManager};
use spikebot::risk::{PreTradeContext, RiskManager};
use spikebot::signal::Side;

fn arb_intent() -> impl Strategy<Value = TradeIntent> {
    (
        1u64..10_000,
        prop::sample::select(vec!["KXA-1", "KXB-2", "NBA-LAL", "KX-INFL-DEC"]),
        any::<bool>(),
        0i64..1_000_000,
        1i64..99,
        0i64..10_000,
        any::<bool>(),
    )
        .prop_map(|(id, market, yes, size, cents, secs, is_entry)| TradeIntent {
            id,
            market_id: market.to_string(),
            side: if yes { Side::Yes } else { Side::No },
            size: Decimal::new(size, 2),
            reference_price: Decimal::new(cents, 2),
            signal: None,
            created_at: t(secs),
            kind: if is_entry {
                IntentKind::Entry
            } else {
                IntentKind::Exit {
                    position_id: id,
                    reason: CloseReason::StopLoss,
                }
            },
            retry: RetryState::new(0),
        })
}

proptest! {
    #[test]
    fn prop_window_bounded_and_ordered(
        gaps in prop::collection::vec(0i64..30, 1..200),
        capacity in 1usize..64,
        n in 0usize..100,
    ) {
        let mut history = PriceHistory::new(capacity);
        let mut secs = 0;
        for gap in gaps {
            secs += gap;
            history
                .record(PriceSample::new("M", t(secs), Decimal::new(50, 2)))
                .unwrap();
        }

        let window = history.window("M", n);
        prop_assert!(window.len() <= n);
        prop_assert!(window.len() <= capacity);
        let samples = window.to_vec();
        prop_assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn prop_never_approves_while_suspended(intents in prop::collection::vec(arb_intent(), 1..20)) {
        let mut rm = RiskManager::new(
            RiskConfig::default(),
            FeeCalculator::new(FeeConfig::free()),
            Decimal::new(10, 2),
        );
        rm.suspend_administratively("halt");
        let positions = PositionManager::new(
            PositionConfig::default(),
            FeeCalculator::new(FeeConfig::free()),
        );
        let ctx = PreTradeContext::new(&positions);

        for intent in intents {
            prop_assert!(rm.review(intent, &ctx).is_err());
        }
        prop_assert_eq!(rm.state().trades_today, 0);
    }
}
