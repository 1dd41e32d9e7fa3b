//! CLI interface for spikebot
//!
//! Provides subcommands for:
//! - `backtest`: Replay a recorded or synthetic feed through the decision engine
//! - `paper`: Stream a feed through the live engine with paper fills
//! - `synth`: Write a synthetic feed to Parquet
//! - `config`: Print the effective configuration

mod backtest;
mod feed;
mod paper;
mod synth;

pub use backtest::{BacktestArgs, OutputFormat};
pub use feed::{FeedArgs, SyntheticArgs};
pub use paper::PaperArgs;
pub use synth::SynthArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "spikebot")]
#[command(about = "Risk and decision engine for prediction-market spike trading")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a backtest
    Backtest(BacktestArgs),
    /// Paper trade a feed through the live engine
    Paper(PaperArgs),
    /// Generate a synthetic feed
    Synth(SynthArgs),
    /// Print the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backtest() {
        let cli = Cli::try_parse_from([
            "spikebot",
            "backtest",
            "--markets",
            "KXA,KXB",
            "--immediate",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Backtest(args) => {
                assert!(args.immediate);
                assert_eq!(args.format, OutputFormat::Json);
                assert_eq!(args.feed.synthetic.markets, vec!["KXA", "KXB"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.config, "config.toml");
    }

    #[test]
    fn test_parse_synth_requires_output() {
        assert!(Cli::try_parse_from(["spikebot", "synth"]).is_err());
        assert!(Cli::try_parse_from(["spikebot", "synth", "-o", "feed.parquet", "--seed", "3"]).is_ok());
    }
}
