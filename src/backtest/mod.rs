//! Backtesting module
//!
//! Replays recorded or synthetic price samples through the same decision
//! engine used live, with a simulated executor in place of the venue.

mod analytics;
mod fill_model;
mod replay;
mod simulator;
mod synthetic;

pub use analytics::{BacktestResult, BacktestSummary, EquityPoint};
pub use fill_model::FillModel;
pub use replay::ReplayFeed;
pub use simulator::{run_backtest, BacktestSimulator};
pub use synthetic::SyntheticFeed;

use serde::{Deserialize, Serialize};

/// When a simulated order fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillTiming {
    /// At the next sample of the same market
    #[default]
    NextSample,
    /// At the intent's reference price, before the next sample
    Immediate,
}
