//! Per-market ring buffers of price samples

use super::{HistoryError, PriceSample};
use crate::config::{duration_from_secs, HistoryConfig};
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::iter::Chain;
use std::slice::Iter;
use std::sync::Arc;

/// Iterator over a [`Window`]
pub type WindowIter<'a> = Chain<Iter<'a, PriceSample>, Iter<'a, PriceSample>>;

/// The most recent samples of one market, oldest first
///
/// Borrowed view over at most `n` samples. Iterating never copies samples
/// and a window can be iterated any number of times.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    head: &'a [PriceSample],
    tail: &'a [PriceSample],
}

impl<'a> Window<'a> {
    fn new(head: &'a [PriceSample], tail: &'a [PriceSample], n: usize) -> Self {
        let skip = (head.len() + tail.len()).saturating_sub(n);
        if skip >= head.len() {
            Self {
                head: &[],
                tail: &tail[skip - head.len()..],
            }
        } else {
            Self {
                head: &head[skip..],
                tail,
            }
        }
    }

    /// An empty window
    pub fn empty() -> Self {
        Self {
            head: &[],
            tail: &[],
        }
    }

    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest sample in the window
    pub fn first(&self) -> Option<&'a PriceSample> {
        self.head.first().or_else(|| self.tail.first())
    }

    /// Newest sample in the window
    pub fn latest(&self) -> Option<&'a PriceSample> {
        self.tail.last().or_else(|| self.head.last())
    }

    /// Sample at `index`, counting from the oldest
    pub fn get(&self, index: usize) -> Option<&'a PriceSample> {
        if index < self.head.len() {
            self.head.get(index)
        } else {
            self.tail.get(index - self.head.len())
        }
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> WindowIter<'a> {
        self.head.iter().chain(self.tail.iter())
    }

    /// Narrow to the newest `n` samples of this window
    pub fn last_n(&self, n: usize) -> Self {
        Self::new(self.head, self.tail, n)
    }

    pub fn to_vec(&self) -> Vec<PriceSample> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for Window<'a> {
    type Item = &'a PriceSample;
    type IntoIter = WindowIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.head.iter().chain(self.tail.iter())
    }
}

impl<'a> From<&'a [PriceSample]> for Window<'a> {
    fn from(samples: &'a [PriceSample]) -> Self {
        Self {
            head: samples,
            tail: &[],
        }
    }
}

/// Immutable copy of one market's history, safe to hand across tasks
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    pub market_id: String,
    pub samples: Arc<[PriceSample]>,
}

impl HistorySnapshot {
    /// The newest `n` samples of the snapshot
    pub fn window(&self, n: usize) -> Window<'_> {
        Window::new(&self.samples, &[], n)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Bounded price history for every market seen
#[derive(Debug, Clone)]
pub struct PriceHistory {
    markets: HashMap<String, VecDeque<PriceSample>>,
    capacity: usize,
    max_age: Option<Duration>,
}

impl PriceHistory {
    /// Create a history retaining `capacity` samples per market
    pub fn new(capacity: usize) -> Self {
        Self {
            markets: HashMap::new(),
            capacity: capacity.max(1),
            max_age: None,
        }
    }

    /// Create a history from configuration
    pub fn from_config(config: &HistoryConfig) -> Self {
        let mut history = Self::new(config.capacity);
        history.max_age = config
            .max_age_seconds
            .and_then(duration_from_secs);
        history
    }

    /// Also evict samples older than `max_age` relative to the newest sample
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample, evicting the oldest past capacity or age
    ///
    /// Samples with the same timestamp as the newest one are accepted and
    /// kept in arrival order; older samples are refused.
    pub fn record(&mut self, sample: PriceSample) -> Result<(), HistoryError> {
        let samples = self.markets.entry(sample.market_id.clone()).or_default();

        if let Some(last) = samples.back() {
            if sample.timestamp < last.timestamp {
                return Err(HistoryError::OutOfOrderSample {
                    market_id: sample.market_id,
                    timestamp: sample.timestamp,
                    last: last.timestamp,
                });
            }
        }

        let newest = sample.timestamp;
        samples.push_back(sample);

        while samples.len() > self.capacity {
            samples.pop_front();
        }
        if let Some(max_age) = self.max_age {
            if let Some(cutoff) = newest.checked_sub_signed(max_age) {
                while samples.front().is_some_and(|s| s.timestamp < cutoff) {
                    samples.pop_front();
                }
            }
        }

        Ok(())
    }

    /// The last `n` samples of a market (empty for unknown markets)
    pub fn window(&self, market_id: &str, n: usize) -> Window<'_> {
        match self.markets.get(market_id) {
            Some(samples) => {
                let (head, tail) = samples.as_slices();
                Window::new(head, tail, n)
            }
            None => Window::empty(),
        }
    }

    /// Copy of a market's full retained history
    pub fn snapshot(&self, market_id: &str) -> HistorySnapshot {
        let samples: Arc<[PriceSample]> = match self.markets.get(market_id) {
            Some(samples) => samples.iter().cloned().collect(),
            None => Arc::from(Vec::new()),
        };
        HistorySnapshot {
            market_id: market_id.to_string(),
            samples,
        }
    }

    pub fn latest(&self, market_id: &str) -> Option<&PriceSample> {
        self.markets.get(market_id).and_then(|s| s.back())
    }

    pub fn len(&self, market_id: &str) -> usize {
        self.markets.get(market_id).map_or(0, VecDeque::len)
    }

    /// Markets with at least one recorded sample
    pub fn markets(&self) -> impl Iterator<Item = &str> {
        self.markets.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn sample(market: &str, secs: i64, price: Decimal) -> PriceSample {
        PriceSample::new(
            market,
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            price,
        )
    }

    #[test]
    fn test_record_and_window() {
        let mut history = PriceHistory::new(10);
        for i in 0..5 {
            history
                .record(sample("KXBTC", i, Decimal::from(i)))
                .unwrap();
        }

        let window = history.window("KXBTC", 3);
        assert_eq!(window.len(), 3);
        let prices: Vec<Decimal> = window.iter().map(|s| s.price).collect();
        assert_eq!(prices, vec![dec!(2), dec!(3), dec!(4)]);
        assert_eq!(window.latest().unwrap().price, dec!(4));
        assert_eq!(window.first().unwrap().price, dec!(2));
    }

    #[test]
    fn test_window_larger_than_history() {
        let mut history = PriceHistory::new(10);
        history.record(sample("KXBTC", 0, dec!(0.5))).unwrap();
        assert_eq!(history.window("KXBTC", 50).len(), 1);
        assert!(history.window("OTHER", 5).is_empty());
    }

    #[test]
    fn test_capacity_eviction() {
        let mut history = PriceHistory::new(3);
        for i in 0..6 {
            history
                .record(sample("KXBTC", i, Decimal::from(i)))
                .unwrap();
        }
        assert_eq!(history.len("KXBTC"), 3);
        assert_eq!(history.window("KXBTC", 10).first().unwrap().price, dec!(3));
    }

    #[test]
    fn test_age_eviction() {
        let mut history = PriceHistory::new(100).with_max_age(Duration::seconds(10));
        history.record(sample("KXBTC", 0, dec!(0.50))).unwrap();
        history.record(sample("KXBTC", 5, dec!(0.51))).unwrap();
        history.record(sample("KXBTC", 12, dec!(0.52))).unwrap();

        let window = history.window("KXBTC", 10);
        assert_eq!(window.len(), 2);
        assert_eq!(window.first().unwrap().price, dec!(0.51));
    }

    #[test]
    fn test_out_of_range_max_age_keeps_samples() {
        let mut history = PriceHistory::from_config(&HistoryConfig {
            capacity: 10,
            max_age_seconds: Some(u64::MAX),
        });
        history.record(sample("KXBTC", 0, dec!(0.50))).unwrap();
        history.record(sample("KXBTC", 86_400, dec!(0.51))).unwrap();
        assert_eq!(history.len("KXBTC"), 2);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut history = PriceHistory::new(10);
        history.record(sample("KXBTC", 10, dec!(0.50))).unwrap();

        let err = history.record(sample("KXBTC", 5, dec!(0.60))).unwrap_err();
        assert!(matches!(err, HistoryError::OutOfOrderSample { .. }));
        assert_eq!(history.len("KXBTC"), 1);
        assert_eq!(history.latest("KXBTC").unwrap().price, dec!(0.50));
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let mut history = PriceHistory::new(10);
        history.record(sample("KXBTC", 1, dec!(0.40))).unwrap();
        history.record(sample("KXBTC", 1, dec!(0.41))).unwrap();

        let prices: Vec<Decimal> = history.window("KXBTC", 2).iter().map(|s| s.price).collect();
        assert_eq!(prices, vec![dec!(0.40), dec!(0.41)]);
    }

    #[test]
    fn test_markets_are_independent() {
        let mut history = PriceHistory::new(10);
        history.record(sample("A", 10, dec!(0.50))).unwrap();
        // An older timestamp on another market is fine
        history.record(sample("B", 1, dec!(0.30))).unwrap();
        assert_eq!(history.len("A"), 1);
        assert_eq!(history.len("B"), 1);
        assert_eq!(history.markets().count(), 2);
    }

    #[test]
    fn test_window_across_wrapped_buffer() {
        let mut history = PriceHistory::new(4);
        for i in 0..7 {
            history
                .record(sample("KXBTC", i, Decimal::from(i)))
                .unwrap();
        }
        let window = history.window("KXBTC", 4);
        let prices: Vec<Decimal> = window.into_iter().map(|s| s.price).collect();
        assert_eq!(prices, vec![dec!(3), dec!(4), dec!(5), dec!(6)]);
        assert_eq!(window.get(1).unwrap().price, dec!(4));
        assert_eq!(window.last_n(2).first().unwrap().price, dec!(5));
    }

    #[test]
    fn test_window_is_restartable() {
        let mut history = PriceHistory::new(10);
        for i in 0..4 {
            history
                .record(sample("KXBTC", i, Decimal::from(i)))
                .unwrap();
        }
        let window = history.window("KXBTC", 3);
        let first: Decimal = window.iter().map(|s| s.price).sum();
        let second: Decimal = window.iter().map(|s| s.price).sum();
        assert_eq!(first, second);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut history = PriceHistory::new(10);
        history.record(sample("KXBTC", 0, dec!(0.50))).unwrap();
        let snapshot = history.snapshot("KXBTC");

        history.record(sample("KXBTC", 1, dec!(0.55))).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.window(5).latest().unwrap().price, dec!(0.50));
        assert!(history.snapshot("UNKNOWN").is_empty());
    }
}
