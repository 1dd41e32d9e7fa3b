//! Backtest command implementation

use super::FeedArgs;
use crate::backtest::{run_backtest, FillTiming};
use crate::config::Config;
use crate::data::ParquetWriter;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Args, Debug)]
pub struct BacktestArgs {
    #[command(flatten)]
    pub feed: FeedArgs,

    /// Initial capital
    #[arg(long)]
    pub capital: Option<Decimal>,

    /// Adverse slippage on simulated fills, as a fraction of price
    #[arg(long)]
    pub slippage: Option<Decimal>,

    /// Fill at the intent's reference price instead of the next sample
    #[arg(long)]
    pub immediate: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Write the closed trade log to this Parquet file
    #[arg(long)]
    pub trades_out: Option<PathBuf>,
}

impl BacktestArgs {
    fn effective_config(&self, base: &Config) -> Config {
        let mut config = base.clone();
        if let Some(capital) = self.capital {
            config.backtest.initial_capital = capital;
        }
        if let Some(slippage) = self.slippage {
            config.backtest.slippage_pct = slippage;
        }
        if self.immediate {
            config.backtest.fill_timing = FillTiming::Immediate;
        }
        config
    }

    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let config = self.effective_config(config);
        let feed = self.feed.load(&config)?;
        if feed.is_empty() {
            anyhow::bail!("no price samples to replay");
        }

        tracing::info!(
            samples = feed.len(),
            markets = feed.markets().len(),
            fill_timing = ?config.backtest.fill_timing,
            "Running backtest"
        );
        let result = run_backtest(feed, &config);

        if let Some(path) = &self.trades_out {
            ParquetWriter::new().write_trades(path, &result.trades)?;
            tracing::info!(path = ?path, trades = result.trades.len(), "Trade log written");
        }

        match self.format {
            OutputFormat::Table => println!("{}", result.summary.format_table()),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        }
        Ok(())
    }
}
