//! Signal generation module
//!
//! Turns price history windows into directional trade signals

mod mispricing;
mod momentum;
mod spike;
mod strategy;
mod types;
mod volume;

pub use mispricing::MispricingDetector;
pub use momentum::MomentumDetector;
pub use spike::SpikeDetector;
pub use strategy::{Strategy, StrategySet};
pub use types::{Direction, Side, Signal, SignalError, SignalRef, StrategyKind, WindowBounds};
pub use volume::VolumeSpikeDetector;
