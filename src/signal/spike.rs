//! Z-score spike detection
//!
//! The window's population mean and standard deviation are computed over
//! every sample in the window, including the newest one, and the newest
//! price is scored against them. The detector holds no state between calls,
//! so the same window always yields the same signal whether it comes from
//! the live feed or a replay.

use super::{Direction, Signal, SignalError, StrategyKind};
use crate::config::SignalConfig;
use crate::history::Window;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

/// Rolling z-score detector
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    threshold: Decimal,
    window_size: usize,
    min_samples: usize,
}

impl SpikeDetector {
    /// Create a detector that needs a full window before evaluating
    pub fn new(threshold: Decimal, window_size: usize) -> Self {
        Self {
            threshold: threshold.abs(),
            window_size: window_size.max(2),
            min_samples: window_size.max(2),
        }
    }

    pub fn from_config(config: &SignalConfig) -> Self {
        Self::new(config.spike_zscore_threshold, config.spike_window_size)
            .with_min_samples(config.spike_min_samples())
    }

    /// Evaluate once at least `min_samples` are available
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.clamp(2, self.window_size);
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    /// Z-score of the newest sample against the window
    pub fn zscore(&self, window: Window<'_>) -> Result<Decimal, SignalError> {
        let window = window.last_n(self.window_size);
        let n = window.len();
        if n < self.min_samples {
            return Err(SignalError::InsufficientWindow {
                have: n,
                need: self.min_samples,
            });
        }
        let latest = match window.latest() {
            Some(sample) => sample.price,
            None => {
                return Err(SignalError::InsufficientWindow {
                    have: 0,
                    need: self.min_samples,
                })
            }
        };

        let count = Decimal::from(n as u64);
        let mean = window
            .iter()
            .try_fold(Decimal::ZERO, |acc, s| acc.checked_add(s.price))
            .and_then(|sum| sum.checked_div(count))
            .ok_or(SignalError::Overflow)?;
        let variance = window
            .iter()
            .try_fold(Decimal::ZERO, |acc, s| {
                let d = s.price.checked_sub(mean)?;
                acc.checked_add(d.checked_mul(d)?)
            })
            .and_then(|sum| sum.checked_div(count))
            .ok_or(SignalError::Overflow)?;

        if variance <= dec!(0) {
            return Err(SignalError::ZeroVariance);
        }
        let stddev = variance.sqrt().ok_or(SignalError::ZeroVariance)?;
        if stddev.is_zero() {
            return Err(SignalError::ZeroVariance);
        }

        (latest - mean)
            .checked_div(stddev)
            .ok_or(SignalError::ZeroVariance)
    }

    /// Score the window and emit a directional signal when |z| reaches the threshold
    pub fn evaluate(&self, market_id: &str, window: Window<'_>) -> Signal {
        let window = window.last_n(self.window_size);
        let z = match self.zscore(window) {
            Ok(z) => z,
            Err(e) => {
                tracing::trace!(market = market_id, error = %e, "Spike detector skipped window");
                return Signal::none(market_id, StrategyKind::Spike, &window);
            }
        };

        let direction = if z.abs() >= self.threshold {
            Direction::of(z)
        } else {
            Direction::None
        };

        let mut signal = Signal::none(market_id, StrategyKind::Spike, &window);
        signal.direction = direction;
        signal.magnitude = z;

        if signal.is_actionable() {
            tracing::debug!(
                market = market_id,
                zscore = %z,
                price = %signal.price,
                direction = ?direction,
                "Spike detected"
            );
        }
        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::PriceSample;
    use chrono::{Duration, TimeZone, Utc};

    fn samples(prices: &[Decimal]) -> Vec<PriceSample> {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 14, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| PriceSample::new("KXBTC", start + Duration::seconds(i as i64), *p))
            .collect()
    }

    #[test]
    fn test_spike_up_detected() {
        let detector = SpikeDetector::new(dec!(2.0), 6);
        let data = samples(&[dec!(100), dec!(100), dec!(100), dec!(100), dec!(100), dec!(106)]);

        let signal = detector.evaluate("KXBTC", Window::from(data.as_slice()));
        assert_eq!(signal.direction, Direction::Up);
        // mean 101, population stddev sqrt(5)
        assert!(signal.magnitude > dec!(2.23) && signal.magnitude < dec!(2.24));
        assert_eq!(signal.price, dec!(106));
        assert_eq!(signal.window.len, 6);
    }

    #[test]
    fn test_noise_below_threshold() {
        let detector = SpikeDetector::new(dec!(2.0), 6);
        let data = samples(&[dec!(100), dec!(101), dec!(99), dec!(100), dec!(100), dec!(101)]);

        let signal = detector.evaluate("KXBTC", Window::from(data.as_slice()));
        assert_eq!(signal.direction, Direction::None);
        assert!(signal.magnitude > dec!(1.2) && signal.magnitude < dec!(1.22));
    }

    #[test]
    fn test_spike_down_detected() {
        let detector = SpikeDetector::new(dec!(2.0), 6);
        let data = samples(&[dec!(0.60), dec!(0.60), dec!(0.60), dec!(0.60), dec!(0.60), dec!(0.48)]);

        let signal = detector.evaluate("KXBTC", Window::from(data.as_slice()));
        assert_eq!(signal.direction, Direction::Down);
        assert!(signal.magnitude < dec!(-2));
    }

    #[test]
    fn test_insufficient_window() {
        let detector = SpikeDetector::new(dec!(2.0), 6);
        let data = samples(&[dec!(100), dec!(100), dec!(130)]);

        let err = detector.zscore(Window::from(data.as_slice())).unwrap_err();
        assert_eq!(err, SignalError::InsufficientWindow { have: 3, need: 6 });

        let signal = detector.evaluate("KXBTC", Window::from(data.as_slice()));
        assert!(!signal.is_actionable());
    }

    #[test]
    fn test_min_samples_override() {
        let detector = SpikeDetector::new(dec!(1.0), 6).with_min_samples(3);
        let data = samples(&[dec!(100), dec!(100), dec!(130)]);
        assert!(detector.zscore(Window::from(data.as_slice())).is_ok());
    }

    #[test]
    fn test_zero_variance() {
        let detector = SpikeDetector::new(dec!(2.0), 4);
        let data = samples(&[dec!(0.5), dec!(0.5), dec!(0.5), dec!(0.5)]);

        let err = detector.zscore(Window::from(data.as_slice())).unwrap_err();
        assert_eq!(err, SignalError::ZeroVariance);
        let signal = detector.evaluate("KXBTC", Window::from(data.as_slice()));
        assert_eq!(signal.direction, Direction::None);
    }

    #[test]
    fn test_only_newest_window_is_scored() {
        let detector = SpikeDetector::new(dec!(2.0), 6);
        // An old outlier outside the window must not matter
        let data = samples(&[
            dec!(500),
            dec!(100),
            dec!(101),
            dec!(99),
            dec!(100),
            dec!(100),
            dec!(101),
        ]);
        let signal = detector.evaluate("KXBTC", Window::from(data.as_slice()));
        assert_eq!(signal.window.len, 6);
        assert_eq!(signal.direction, Direction::None);
    }

    #[test]
    fn test_extreme_prices_do_not_panic() {
        let detector = SpikeDetector::new(dec!(2.0), 3);
        let data = samples(&[Decimal::MAX, Decimal::MAX, Decimal::MIN]);

        let err = detector.zscore(Window::from(data.as_slice())).unwrap_err();
        assert_eq!(err, SignalError::Overflow);
        let signal = detector.evaluate("KXBTC", Window::from(data.as_slice()));
        assert!(!signal.is_actionable());
    }

    #[test]
    fn test_deterministic() {
        let detector = SpikeDetector::new(dec!(2.0), 6);
        let data = samples(&[dec!(100), dec!(100), dec!(100), dec!(100), dec!(100), dec!(106)]);
        let a = detector.evaluate("KXBTC", Window::from(data.as_slice()));
        let b = detector.evaluate("KXBTC", Window::from(data.as_slice()));
        assert_eq!(a, b);
    }
}
