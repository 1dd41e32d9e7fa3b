//! Rate-of-change momentum detection

use super::{Direction, Signal, SignalError, StrategyKind};
use crate::config::SignalConfig;
use crate::history::Window;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Prices outside this band are too close to resolution to chase
const MIN_TRADABLE_PRICE: Decimal = dec!(0.08);
const MAX_TRADABLE_PRICE: Decimal = dec!(0.92);

/// Detects sustained moves over a fixed lookback
#[derive(Debug, Clone)]
pub struct MomentumDetector {
    /// Samples between the reference price and the newest price
    lookback: usize,
    threshold: Decimal,
}

impl MomentumDetector {
    pub fn new(lookback: usize, threshold: Decimal) -> Self {
        Self {
            lookback: lookback.max(1),
            threshold: threshold.abs(),
        }
    }

    pub fn from_config(config: &SignalConfig) -> Self {
        Self::new(config.momentum_window, config.momentum_threshold)
    }

    /// Samples needed: the reference sample plus the lookback
    pub fn window_size(&self) -> usize {
        self.lookback + 1
    }

    /// Fractional change from the oldest to the newest sample of the window
    pub fn rate_of_change(&self, window: Window<'_>) -> Result<Decimal, SignalError> {
        let window = window.last_n(self.window_size());
        let need = self.window_size();
        let (Some(first), Some(latest)) = (window.first(), window.latest()) else {
            return Err(SignalError::InsufficientWindow { have: 0, need });
        };
        if window.len() < need {
            return Err(SignalError::InsufficientWindow {
                have: window.len(),
                need,
            });
        }
        if first.price.is_zero() {
            return Err(SignalError::ZeroVariance);
        }
        (latest.price - first.price)
            .checked_div(first.price)
            .ok_or(SignalError::Overflow)
    }

    pub fn evaluate(&self, market_id: &str, window: Window<'_>) -> Signal {
        let window = window.last_n(self.window_size());
        let mut signal = Signal::none(market_id, StrategyKind::Momentum, &window);

        let roc = match self.rate_of_change(window) {
            Ok(roc) => roc,
            Err(e) => {
                tracing::trace!(market = market_id, error = %e, "Momentum skipped window");
                return signal;
            }
        };
        signal.magnitude = roc;

        if signal.price < MIN_TRADABLE_PRICE || signal.price > MAX_TRADABLE_PRICE {
            return signal;
        }
        if roc.abs() >= self.threshold {
            signal.direction = Direction::of(roc);
            tracing::debug!(market = market_id, roc = %roc, "Momentum detected");
        }
        signal
    }
}
