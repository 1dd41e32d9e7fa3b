//! Volume surge detection

use super::{Direction, Signal, SignalError, StrategyKind};
use crate::config::SignalConfig;
use crate::history::Window;
use rust_decimal::Decimal;

/// Flags a sample whose volume dwarfs the recent average
///
/// Direction follows the price change into the surging sample.
#[derive(Debug, Clone)]
pub struct VolumeSpikeDetector {
    baseline: usize,
    ratio: Decimal,
    min_volume: Decimal,
}

impl VolumeSpikeDetector {
    pub fn new(baseline: usize, ratio: Decimal, min_volume: Decimal) -> Self {
        Self {
            baseline: baseline.max(1),
            ratio,
            min_volume,
        }
    }

    pub fn from_config(config: &SignalConfig) -> Self {
        Self::new(
            config.volume_window,
            config.volume_spike_ratio,
            config.min_volume,
        )
    }

    pub fn window_size(&self) -> usize {
        self.baseline + 1
    }

    /// Newest volume divided by the mean volume of the preceding samples
    pub fn volume_ratio(&self, window: Window<'_>) -> Result<Decimal, SignalError> {
        let window = window.last_n(self.window_size());
        if window.len() < 2 {
            return Err(SignalError::InsufficientWindow {
                have: window.len(),
                need: self.window_size(),
            });
        }
        let latest = window
            .latest()
            .and_then(|s| s.volume)
            .ok_or(SignalError::MissingVolume)?;

        let previous: Vec<Decimal> = window
            .iter()
            .take(window.len() - 1)
            .filter_map(|s| s.volume)
            .collect();
        if previous.is_empty() {
            return Err(SignalError::MissingVolume);
        }
        let total = previous
            .iter()
            .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
            .ok_or(SignalError::Overflow)?;
        let average = total
            .checked_div(Decimal::from(previous.len() as u64))
            .ok_or(SignalError::Overflow)?;
        if average.is_zero() {
            return Err(SignalError::ZeroVariance);
        }
        latest.checked_div(average).ok_or(SignalError::Overflow)
    }

    pub fn evaluate(&self, market_id: &str, window: Window<'_>) -> Signal {
        let window = window.last_n(self.window_size());
        let mut signal = Signal::none(market_id, StrategyKind::VolumeSpike, &window);

        let ratio = match self.volume_ratio(window) {
            Ok(ratio) => ratio,
            Err(e) => {
                tracing::trace!(market = market_id, error = %e, "Volume detector skipped window");
                return signal;
            }
        };
        signal.magnitude = ratio;

        let latest_volume = window
            .latest()
            .and_then(|s| s.volume)
            .unwrap_or(Decimal::ZERO);
        if ratio < self.ratio || latest_volume < self.min_volume {
            return signal;
        }

        let change = match (window.get(window.len() - 2), window.latest()) {
            (Some(prev), Some(latest)) => latest.price - prev.price,
            _ => Decimal::ZERO,
        };
        signal.direction = Direction::of(change);
        if signal.is_actionable() {
            tracing::debug!(market = market_id, ratio = %ratio, "Volume spike detected");
        }
        signal
    }
}
