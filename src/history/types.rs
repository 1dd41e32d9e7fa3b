//! Price history types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One observation of a market's YES price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Market ticker
    pub market_id: String,
    /// Observation time
    pub timestamp: DateTime<Utc>,
    /// YES price in [0, 1]
    pub price: Decimal,
    /// Traded volume since the previous sample, when the feed reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
}

impl PriceSample {
    /// Create a sample without volume
    pub fn new(market_id: impl Into<String>, timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            market_id: market_id.into(),
            timestamp,
            price,
            volume: None,
        }
    }

    /// Attach a volume reading
    pub fn with_volume(mut self, volume: Decimal) -> Self {
        self.volume = Some(volume);
        self
    }
}

/// Price history errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// Sample is older than the newest one already recorded for its market
    #[error("out-of-order sample for {market_id}: {timestamp} precedes {last}")]
    OutOfOrderSample {
        market_id: String,
        timestamp: DateTime<Utc>,
        last: DateTime<Utc>,
    },
}
