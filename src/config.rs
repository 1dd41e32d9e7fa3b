//! Configuration types for spikebot
//!
//! Every section and field is defaulted, so an empty file (or a missing
//! section) yields the stock parameters.

use crate::backtest::FillTiming;
use crate::fees::{FeeModel, Liquidity};
use crate::signal::StrategyKind;
use crate::telemetry::LogFormat;
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub position: PositionConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub synthetic: SyntheticConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Signal generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Strategies evaluated per sample, in priority order
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyKind>,

    /// |z| at or above which the spike detector fires
    #[serde(default = "default_zscore_threshold")]
    pub spike_zscore_threshold: Decimal,

    /// Number of samples in the spike detector window
    #[serde(default = "default_spike_window")]
    pub spike_window_size: usize,

    /// Minimum samples before the detector evaluates (defaults to the window size)
    #[serde(default)]
    pub spike_min_samples: Option<usize>,

    /// Lookback (in samples) for the momentum rate of change
    #[serde(default = "default_momentum_window")]
    pub momentum_window: usize,

    /// Minimum |rate of change| for a momentum signal
    #[serde(default = "default_momentum_threshold")]
    pub momentum_threshold: Decimal,

    /// Window (in samples) for the average volume baseline
    #[serde(default = "default_volume_window")]
    pub volume_window: usize,

    /// Latest volume must be at least this multiple of the baseline
    #[serde(default = "default_volume_ratio")]
    pub volume_spike_ratio: Decimal,

    /// Ignore volume spikes below this absolute volume
    #[serde(default)]
    pub min_volume: Decimal,

    /// Samples averaged into the mispricing fair value
    #[serde(default = "default_mispricing_window")]
    pub mispricing_window: usize,

    /// Minimum |fair value - price| for a mispricing signal
    #[serde(default = "default_mispricing_min_edge")]
    pub mispricing_min_edge: Decimal,
}

fn default_strategies() -> Vec<StrategyKind> {
    vec![StrategyKind::Spike]
}
fn default_zscore_threshold() -> Decimal {
    dec!(2.0)
}
fn default_spike_window() -> usize {
    20
}
fn default_momentum_window() -> usize {
    10
}
fn default_momentum_threshold() -> Decimal {
    dec!(0.04)
}
fn default_volume_window() -> usize {
    20
}
fn default_volume_ratio() -> Decimal {
    dec!(3)
}
fn default_mispricing_window() -> usize {
    20
}
fn default_mispricing_min_edge() -> Decimal {
    dec!(0.08)
}

impl SignalConfig {
    /// Samples required before the spike detector evaluates
    pub fn spike_min_samples(&self) -> usize {
        self.spike_min_samples.unwrap_or(self.spike_window_size)
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            spike_zscore_threshold: default_zscore_threshold(),
            spike_window_size: default_spike_window(),
            spike_min_samples: None,
            momentum_window: default_momentum_window(),
            momentum_threshold: default_momentum_threshold(),
            volume_window: default_volume_window(),
            volume_spike_ratio: default_volume_ratio(),
            min_volume: Decimal::ZERO,
            mispricing_window: default_mispricing_window(),
            mispricing_min_edge: default_mispricing_min_edge(),
        }
    }
}

/// Risk management configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Minimum seconds between accepted entries on the same market
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,

    /// Seconds after a close during which the market cannot be re-entered
    #[serde(default = "default_recent_traded")]
    pub recent_traded_seconds: u64,

    /// Ceiling on total notional exposure across open and in-flight positions
    #[serde(default = "default_max_exposure")]
    pub max_exposure: Decimal,

    /// Ceiling on exposure within one event group (ticker prefix)
    #[serde(default)]
    pub max_event_exposure: Option<Decimal>,

    /// Realized plus unrealized loss for the day that suspends trading
    #[serde(default = "default_daily_loss_limit")]
    pub daily_loss_limit: Decimal,

    /// Consecutive losing closes that move the engine into Warning
    #[serde(default = "default_consecutive_losses")]
    pub consecutive_loss_warning_count: u32,

    /// Entry size multiplier applied while in Warning
    #[serde(default = "default_warning_size_factor")]
    pub warning_size_factor: Decimal,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_positions: usize,

    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,

    /// Adverse fill deviation tolerated, as a fraction of the intended price
    #[serde(default = "default_slippage_tolerance")]
    pub slippage_tolerance_pct: Decimal,

    /// Seconds after close before an unconfirmed settlement is flagged
    #[serde(default = "default_settlement_timeout")]
    pub settlement_timeout_seconds: u64,

    /// Consecutive failed order submissions that suspend trading
    #[serde(default = "default_max_executor_errors")]
    pub max_consecutive_executor_errors: u32,
}

fn default_cooldown() -> u64 {
    10
}
fn default_recent_traded() -> u64 {
    120
}
fn default_max_exposure() -> Decimal {
    dec!(200)
}
fn default_daily_loss_limit() -> Decimal {
    dec!(100)
}
fn default_consecutive_losses() -> u32 {
    3
}
fn default_warning_size_factor() -> Decimal {
    dec!(0.5)
}
fn default_max_concurrent() -> usize {
    3
}
fn default_max_daily_trades() -> u32 {
    20
}
fn default_slippage_tolerance() -> Decimal {
    dec!(0.025)
}
fn default_settlement_timeout() -> u64 {
    300
}
fn default_max_executor_errors() -> u32 {
    5
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: default_cooldown(),
            recent_traded_seconds: default_recent_traded(),
            max_exposure: default_max_exposure(),
            max_event_exposure: None,
            daily_loss_limit: default_daily_loss_limit(),
            consecutive_loss_warning_count: default_consecutive_losses(),
            warning_size_factor: default_warning_size_factor(),
            max_concurrent_positions: default_max_concurrent(),
            max_daily_trades: default_max_daily_trades(),
            slippage_tolerance_pct: default_slippage_tolerance(),
            settlement_timeout_seconds: default_settlement_timeout(),
            max_consecutive_executor_errors: default_max_executor_errors(),
        }
    }
}

/// Position sizing and exit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionConfig {
    /// Contracts per entry
    #[serde(default = "default_trade_size")]
    pub trade_size: Decimal,

    /// Gain on the held contract's price that triggers take-profit
    #[serde(default = "default_take_profit")]
    pub take_profit_pct: Decimal,

    /// Loss on the held contract's price that triggers stop-loss
    #[serde(default = "default_stop_loss")]
    pub stop_loss_pct: Decimal,

    /// Allow more than one open position per market
    #[serde(default)]
    pub multi_position: bool,

    /// Force an exit after this many seconds
    #[serde(default = "default_max_holding")]
    pub max_holding_seconds: Option<u64>,

    /// Unrealized P&L at which the trailing stop arms (disabled when unset)
    #[serde(default)]
    pub trailing_stop_activation: Option<Decimal>,

    /// Giveback from peak unrealized P&L that triggers the trailing stop
    #[serde(default = "default_trailing_distance")]
    pub trailing_stop_distance: Decimal,
}

fn default_trade_size() -> Decimal {
    dec!(10)
}
fn default_take_profit() -> Decimal {
    dec!(0.10)
}
fn default_stop_loss() -> Decimal {
    dec!(0.05)
}
fn default_max_holding() -> Option<u64> {
    Some(3600)
}
fn default_trailing_distance() -> Decimal {
    dec!(2.50)
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            trade_size: default_trade_size(),
            take_profit_pct: default_take_profit(),
            stop_loss_pct: default_stop_loss(),
            multi_position: false,
            max_holding_seconds: default_max_holding(),
            trailing_stop_activation: None,
            trailing_stop_distance: default_trailing_distance(),
        }
    }
}

/// Order execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Resubmissions allowed after a rejected or timed-out order
    #[serde(default = "default_max_retries")]
    pub max_order_retries: u32,

    /// Delay before a failed order is resubmitted
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_seconds: u64,

    /// Executor calls slower than this resolve as timed out
    #[serde(default = "default_order_timeout")]
    pub order_timeout_seconds: u64,

    /// Starting balance of the paper account
    #[serde(default = "default_paper_balance")]
    pub paper_balance: Decimal,
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    5
}
fn default_order_timeout() -> u64 {
    30
}
fn default_paper_balance() -> Decimal {
    dec!(1000)
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_order_retries: default_max_retries(),
            retry_backoff_seconds: default_retry_backoff(),
            order_timeout_seconds: default_order_timeout(),
            paper_balance: default_paper_balance(),
        }
    }
}

/// Fee schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    #[serde(default)]
    pub model: FeeModel,

    /// Taker rate (multiplier for the quadratic model, fraction of notional for flat)
    #[serde(default = "default_taker_rate")]
    pub taker_rate: Decimal,

    /// Maker rate, same units as `taker_rate`
    #[serde(default = "default_maker_rate")]
    pub maker_rate: Decimal,

    /// Fraction of notional charged at settlement
    #[serde(default)]
    pub settlement_rate: Decimal,

    /// Liquidity role assumed for our orders
    #[serde(default)]
    pub liquidity: Liquidity,
}

fn default_taker_rate() -> Decimal {
    dec!(0.07)
}
fn default_maker_rate() -> Decimal {
    dec!(0.0175)
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            model: FeeModel::default(),
            taker_rate: default_taker_rate(),
            maker_rate: default_maker_rate(),
            settlement_rate: Decimal::ZERO,
            liquidity: Liquidity::default(),
        }
    }
}

impl FeeConfig {
    /// A schedule that charges nothing
    pub fn free() -> Self {
        Self {
            model: FeeModel::None,
            ..Self::default()
        }
    }
}

/// Price history retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Samples retained per market
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,

    /// Samples older than this (relative to the newest) are evicted
    #[serde(default)]
    pub max_age_seconds: Option<u64>,
}

fn default_history_capacity() -> usize {
    100
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
            max_age_seconds: None,
        }
    }
}

/// Backtest simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,

    /// Adverse slippage applied to simulated fills, as a fraction of price
    #[serde(default)]
    pub slippage_pct: Decimal,

    #[serde(default)]
    pub fill_timing: FillTiming,
}

fn default_initial_capital() -> Decimal {
    dec!(1000)
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            slippage_pct: Decimal::ZERO,
            fill_timing: FillTiming::default(),
        }
    }
}

/// Synthetic feed generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_markets")]
    pub markets: Vec<String>,

    /// Samples generated per market
    #[serde(default = "default_steps")]
    pub steps: usize,

    #[serde(default = "default_interval")]
    pub interval_seconds: u64,

    #[serde(default = "default_start_price")]
    pub start_price: Decimal,

    /// Per-step mean of the log-odds walk
    #[serde(default)]
    pub drift: f64,

    /// Per-step standard deviation of the log-odds walk
    #[serde(default = "default_volatility")]
    pub volatility: f64,

    /// Probability per step of injecting a jump
    #[serde(default = "default_spike_probability")]
    pub spike_probability: f64,

    /// Jump size in log-odds
    #[serde(default = "default_spike_size")]
    pub spike_size: f64,

    /// Typical contracts traded per step; samples carry no volume when unset
    #[serde(default = "default_base_volume")]
    pub base_volume: Option<f64>,
}

fn default_seed() -> u64 {
    42
}
fn default_markets() -> Vec<String> {
    vec![
        "KXBTC-25JAN01".to_string(),
        "KXETH-25JAN01".to_string(),
        "INXD-25JAN01".to_string(),
    ]
}
fn default_steps() -> usize {
    2000
}
fn default_interval() -> u64 {
    15
}
fn default_start_price() -> Decimal {
    dec!(0.50)
}
fn default_volatility() -> f64 {
    0.02
}
fn default_spike_probability() -> f64 {
    0.01
}
fn default_spike_size() -> f64 {
    0.35
}
fn default_base_volume() -> Option<f64> {
    Some(100.0)
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            markets: default_markets(),
            steps: default_steps(),
            interval_seconds: default_interval(),
            start_price: default_start_price(),
            drift: 0.0,
            volatility: default_volatility(),
            spike_probability: default_spike_probability(),
            spike_size: default_spike_size(),
            base_volume: default_base_volume(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Prometheus scrape port; no exporter is started when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// A configured number of seconds as a `Duration`
///
/// `None` when the value is beyond what `Duration` can represent; callers
/// treat that as an unbounded window.
pub fn duration_from_secs(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}
