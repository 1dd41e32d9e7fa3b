//! Parquet replay

use spikebot::backtest::{run_backtest, ReplayFeed, SyntheticFeed};
use spikebot::config::{Config, SyntheticConfig};
use spikebot::data::ParquetWriter;
use tempfile::TempDir;

#[test]
fn test_parquet_replay_matches_in_memory() {
    let samples = SyntheticFeed::new(SyntheticConfig {
        steps: 300,
        spike_probability: 0.05,
        ..SyntheticConfig::default()
    })
    .generate();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("feed.parquet");
    ParquetWriter::new().write_price_samples(&path, &samples).unwrap();

    let feed = ReplayFeed::from_parquet(&path).unwrap();
    assert_eq!(feed.samples(), samples.as_slice());

    let config = Config::default();
    let from_disk = run_backtest(feed, &config);
    let in_memory = run_backtest(samples, &config);
    assert_eq!(from_disk.decisions, in_memory.decisions);
    assert_eq!(from_disk.summary, in_memory.summary);
}

#[test]
fn test_trade_log_written() {
    let samples = SyntheticFeed::new(SyntheticConfig {
        steps: 400,
        spike_probability: 0.05,
        ..SyntheticConfig::default()
    })
    .generate();
    let result = run_backtest(samples, &Config::default());

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out").join("trades.parquet");
    ParquetWriter::new().write_trades(&path, &result.trades).unwrap();
    assert_eq!(path.exists(), !result.trades.is_empty());
}
