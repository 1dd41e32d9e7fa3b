//! Configuration loading

use rust_decimal_macros::dec;
use spikebot::backtest::{run_backtest, FillTiming, SyntheticFeed};
use spikebot::config::{Config, SyntheticConfig};
use spikebot::execution::IntentKind;
use std::path::Path;

#[test]
fn test_example_config_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.toml.example");
    let config = Config::load(path).unwrap();

    assert_eq!(config.signal.spike_window_size, 20);
    assert_eq!(config.signal.spike_zscore_threshold, dec!(2.0));
    assert_eq!(config.risk.daily_loss_limit, dec!(100));
    assert_eq!(config.risk.cooldown_seconds, 10);
    assert_eq!(config.risk.max_consecutive_executor_errors, 5);
    assert_eq!(config.backtest.fill_timing, FillTiming::NextSample);
}

#[test]
fn test_partial_config_uses_defaults() {
    let config: Config = toml::from_str(
        r#"
        [risk]
        daily_loss_limit = 50.0

        [backtest]
        fill_timing = "immediate"
        "#,
    )
    .unwrap();

    assert_eq!(config.risk.daily_loss_limit, dec!(50));
    assert_eq!(config.risk.cooldown_seconds, 10);
    assert_eq!(config.backtest.fill_timing, FillTiming::Immediate);
    assert_eq!(config.position.take_profit_pct, dec!(0.10));
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(Config::load("/nonexistent/spikebot.toml").is_err());
}

#[test]
fn test_out_of_range_durations_run_as_unbounded() {
    let config: Config = toml::from_str(
        r#"
        [risk]
        cooldown_seconds = 9223372036854775807
        settlement_timeout_seconds = 9223372036854775807

        [position]
        max_holding_seconds = 9223372036854775807

        [execution]
        retry_backoff_seconds = 9223372036854775807

        [history]
        max_age_seconds = 9223372036854775807
    "#,
    )
    .unwrap();

    let markets = vec!["KXBTC-25JAN01".to_string(), "KXETH-25JAN01".to_string()];
    let feed = SyntheticFeed::new(SyntheticConfig {
        seed: 7,
        markets: markets.clone(),
        steps: 300,
        spike_probability: 0.05,
        ..SyntheticConfig::default()
    })
    .generate();

    let result = run_backtest(feed, &config);
    for market in &markets {
        let entries = result
            .decisions
            .iter()
            .filter(|d| &d.market_id == market && d.kind == IntentKind::Entry && d.is_accepted())
            .count();
        assert!(entries <= 1, "{market} entered {entries} times");
    }
    assert_eq!(result.summary.initial_capital, config.backtest.initial_capital);
}
