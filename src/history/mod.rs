//! Price history module
//!
//! Bounded, time-ordered sample buffers per market

mod buffer;
mod types;

pub use buffer::{HistorySnapshot, PriceHistory, Window, WindowIter};
pub use types::{HistoryError, PriceSample};
