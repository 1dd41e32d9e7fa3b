//! Engine module
//!
//! Wires history, strategies, risk and positions into one decision
//! pipeline. [`TradingCore`] holds all shared state; [`DecisionEngine`]
//! drives it synchronously for backtests and [`LiveEngine`] drives it from
//! tokio tasks.

mod decision;
mod live;
mod trading;
mod types;

pub use decision::DecisionEngine;
pub use live::{spawn_core, CoreCommand, CoreHandle, LiveEngine};
pub use trading::TradingCore;
pub use types::{CoreSnapshot, DecisionOutcome, DecisionRecord, EngineError, FillApplied};
