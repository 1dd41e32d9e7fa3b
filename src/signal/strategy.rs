//! Strategy dispatch
//!
//! The set of strategies is closed; the enabled ones are resolved once at
//! startup into a [`StrategySet`] that every evaluation path shares.

use super::{
    MispricingDetector, MomentumDetector, Signal, SpikeDetector, StrategyKind, VolumeSpikeDetector,
};
use crate::config::SignalConfig;
use crate::history::{PriceHistory, Window};

/// One configured signal strategy
#[derive(Debug, Clone)]
pub enum Strategy {
    Spike(SpikeDetector),
    Momentum(MomentumDetector),
    VolumeSpike(VolumeSpikeDetector),
    Mispricing(MispricingDetector),
}

impl Strategy {
    /// Build the strategy for `kind` from configuration
    pub fn from_config(kind: StrategyKind, config: &SignalConfig) -> Self {
        match kind {
            StrategyKind::Spike => Strategy::Spike(SpikeDetector::from_config(config)),
            StrategyKind::Momentum => Strategy::Momentum(MomentumDetector::from_config(config)),
            StrategyKind::VolumeSpike => {
                Strategy::VolumeSpike(VolumeSpikeDetector::from_config(config))
            }
            StrategyKind::Mispricing => {
                Strategy::Mispricing(MispricingDetector::from_config(config))
            }
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Spike(_) => StrategyKind::Spike,
            Strategy::Momentum(_) => StrategyKind::Momentum,
            Strategy::VolumeSpike(_) => StrategyKind::VolumeSpike,
            Strategy::Mispricing(_) => StrategyKind::Mispricing,
        }
    }

    /// Samples the strategy looks at
    pub fn window_size(&self) -> usize {
        match self {
            Strategy::Spike(d) => d.window_size(),
            Strategy::Momentum(d) => d.window_size(),
            Strategy::VolumeSpike(d) => d.window_size(),
            Strategy::Mispricing(d) => d.window_size(),
        }
    }

    pub fn evaluate(&self, market_id: &str, window: Window<'_>) -> Signal {
        match self {
            Strategy::Spike(d) => d.evaluate(market_id, window),
            Strategy::Momentum(d) => d.evaluate(market_id, window),
            Strategy::VolumeSpike(d) => d.evaluate(market_id, window),
            Strategy::Mispricing(d) => d.evaluate(market_id, window),
        }
    }
}

/// Enabled strategies in priority order
#[derive(Debug, Clone)]
pub struct StrategySet {
    strategies: Vec<Strategy>,
}

impl StrategySet {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        let mut unique: Vec<Strategy> = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            if !unique.iter().any(|s| s.kind() == strategy.kind()) {
                unique.push(strategy);
            }
        }
        Self { strategies: unique }
    }

    pub fn from_config(config: &SignalConfig) -> Self {
        Self::new(
            config
                .strategies
                .iter()
                .map(|kind| Strategy::from_config(*kind, config))
                .collect(),
        )
    }

    pub fn get(&self, kind: StrategyKind) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.kind() == kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = StrategyKind> + '_ {
        self.strategies.iter().map(Strategy::kind)
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Largest window any enabled strategy needs
    pub fn max_window(&self) -> usize {
        self.strategies
            .iter()
            .map(Strategy::window_size)
            .max()
            .unwrap_or(0)
    }

    /// First actionable signal in priority order
    pub fn evaluate(&self, market_id: &str, history: &PriceHistory) -> Option<Signal> {
        self.strategies.iter().find_map(|strategy| {
            let window = history.window(market_id, strategy.window_size());
            let signal = strategy.evaluate(market_id, window);
            signal.is_actionable().then_some(signal)
        })
    }
}
