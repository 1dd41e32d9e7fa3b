//! Synthetic price feeds
//!
//! Each market follows a Gaussian random walk in log-odds space with
//! occasional jumps. The same seed always yields the same feed.

use crate::config::{duration_from_secs, SyntheticConfig};
use crate::history::PriceSample;
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const MIN_PRICE: Decimal = dec!(0.01);
const MAX_PRICE: Decimal = dec!(0.99);
/// Volume multiplier on a jump step
const JUMP_VOLUME_FACTOR: f64 = 5.0;

/// Seeded generator of interleaved multi-market price samples
#[derive(Debug, Clone)]
pub struct SyntheticFeed {
    config: SyntheticConfig,
    start: DateTime<Utc>,
}

impl SyntheticFeed {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            start: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or_default(),
        }
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Generate `steps` samples per market, ordered by timestamp
    pub fn generate(&self) -> Vec<PriceSample> {
        let cfg = &self.config;
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let spike_probability = cfg.spike_probability.clamp(0.0, 1.0);

        let bound = logit(to_f64(MAX_PRICE));
        let start = logit(to_f64(cfg.start_price.clamp(MIN_PRICE, MAX_PRICE)));
        let mut levels = vec![start; cfg.markets.len()];

        let mut samples = Vec::with_capacity(cfg.steps * cfg.markets.len());
        for step in 0..cfg.steps {
            let Some(timestamp) = (step as u64)
                .checked_mul(cfg.interval_seconds)
                .and_then(duration_from_secs)
                .and_then(|offset| self.start.checked_add_signed(offset))
            else {
                tracing::warn!(step, "Synthetic clock out of range, feed truncated");
                break;
            };

            for (market, level) in cfg.markets.iter().zip(levels.iter_mut()) {
                let mut jumped = false;
                if step > 0 {
                    let mut delta = cfg.drift + cfg.volatility * standard_normal(&mut rng);
                    if rng.gen_bool(spike_probability) {
                        jumped = true;
                        delta += if rng.gen_bool(0.5) { cfg.spike_size } else { -cfg.spike_size };
                    }
                    *level = (*level + delta).clamp(-bound, bound);
                }

                let price = Decimal::from_f64(sigmoid(*level))
                    .unwrap_or(cfg.start_price)
                    .clamp(MIN_PRICE, MAX_PRICE)
                    .round_dp(4);
                let mut sample = PriceSample::new(market.clone(), timestamp, price);

                if let Some(base) = cfg.base_volume {
                    let noise = (0.3 * standard_normal(&mut rng)).exp();
                    let factor = if jumped { JUMP_VOLUME_FACTOR } else { 1.0 };
                    if let Some(volume) = Decimal::from_f64((base * noise * factor).max(0.0)) {
                        sample = sample.with_volume(volume.round_dp(0));
                    }
                }
                samples.push(sample);
            }
        }

        tracing::debug!(
            seed = cfg.seed,
            markets = cfg.markets.len(),
            samples = samples.len(),
            "Generated synthetic feed"
        );
        samples
    }
}

/// Box-Muller draw from N(0, 1)
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn to_f64(d: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    d.to_f64().unwrap_or(0.5)
}
