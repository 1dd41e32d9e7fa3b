//! Moving-average mispricing detection

use super::{Direction, Signal, SignalError, StrategyKind};
use crate::config::SignalConfig;
use crate::history::Window;
use rust_decimal::Decimal;

/// Trades a price back toward its moving-average fair value
///
/// Fair value is the mean price of the window, newest sample included. A
/// price below fair value is bought as Yes, a price above it as No.
#[derive(Debug, Clone)]
pub struct MispricingDetector {
    window_size: usize,
    min_edge: Decimal,
}

impl MispricingDetector {
    pub fn new(window_size: usize, min_edge: Decimal) -> Self {
        Self {
            window_size: window_size.max(2),
            min_edge: min_edge.abs(),
        }
    }

    pub fn from_config(config: &SignalConfig) -> Self {
        Self::new(config.mispricing_window, config.mispricing_min_edge)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Mean price over a full window
    pub fn fair_value(&self, window: Window<'_>) -> Result<Decimal, SignalError> {
        let window = window.last_n(self.window_size);
        if window.len() < self.window_size {
            return Err(SignalError::InsufficientWindow {
                have: window.len(),
                need: self.window_size,
            });
        }
        window
            .iter()
            .try_fold(Decimal::ZERO, |acc, s| acc.checked_add(s.price))
            .and_then(|sum| sum.checked_div(Decimal::from(window.len() as u64)))
            .ok_or(SignalError::Overflow)
    }

    /// Signed edge is `fair - price`; the magnitude carries it
    pub fn evaluate(&self, market_id: &str, window: Window<'_>) -> Signal {
        let window = window.last_n(self.window_size);
        let mut signal = Signal::none(market_id, StrategyKind::Mispricing, &window);

        let fair = match self.fair_value(window) {
            Ok(fair) => fair,
            Err(e) => {
                tracing::trace!(market = market_id, error = %e, "Mispricing skipped window");
                return signal;
            }
        };
        let Some(edge) = fair.checked_sub(signal.price) else {
            return signal;
        };
        signal.magnitude = edge;

        if !edge.is_zero() && edge.abs() >= self.min_edge {
            signal.direction = Direction::of(edge);
            tracing::debug!(
                market = market_id,
                fair = %fair,
                price = %signal.price,
                edge = %edge,
                "Mispricing detected"
            );
        }
        signal
    }
}
