//! Replay of recorded price samples

use crate::history::PriceSample;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::Path;

/// Price samples in replay order
///
/// Samples are ordered by timestamp; samples sharing a timestamp keep the
/// order they were loaded in.
#[derive(Debug, Clone, Default)]
pub struct ReplayFeed {
    samples: Vec<PriceSample>,
}

impl ReplayFeed {
    pub fn new(mut samples: Vec<PriceSample>) -> Self {
        // Stable sort keeps arrival order within a timestamp
        samples.sort_by_key(|s| s.timestamp);
        Self { samples }
    }

    /// Load samples written by [`crate::data::ParquetWriter`]
    pub fn from_parquet(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let samples = crate::data::read_price_samples(path)?;
        Ok(Self::new(samples))
    }

    /// Keep samples within `[start, end]`
    pub fn between(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.samples.retain(|s| {
            start.map_or(true, |t| s.timestamp >= t) && end.map_or(true, |t| s.timestamp <= t)
        });
        self
    }

    /// Keep samples of the given markets
    pub fn markets_only(mut self, markets: &[String]) -> Self {
        if !markets.is_empty() {
            self.samples.retain(|s| markets.contains(&s.market_id));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn markets(&self) -> BTreeSet<&str> {
        self.samples.iter().map(|s| s.market_id.as_str()).collect()
    }

    pub fn samples(&self) -> &[PriceSample] {
        &self.samples
    }
}

impl IntoIterator for ReplayFeed {
    type Item = PriceSample;
    type IntoIter = std::vec::IntoIter<PriceSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.into_iter()
    }
}
