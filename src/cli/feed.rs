//! Price feed selection shared by the replay commands

use crate::backtest::{ReplayFeed, SyntheticFeed};
use crate::config::{Config, SyntheticConfig};
use chrono::{DateTime, Utc};
use clap::Args;
use std::path::PathBuf;

/// Overrides for the `[synthetic]` config section
#[derive(Args, Debug, Clone, Default)]
pub struct SyntheticArgs {
    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Samples per market
    #[arg(long)]
    pub steps: Option<usize>,

    /// Markets to generate or replay (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub markets: Vec<String>,
}

impl SyntheticArgs {
    pub fn apply(&self, base: &SyntheticConfig) -> SyntheticConfig {
        let mut config = base.clone();
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(steps) = self.steps {
            config.steps = steps;
        }
        if !self.markets.is_empty() {
            config.markets = self.markets.clone();
        }
        config
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct FeedArgs {
    /// Parquet file of price samples; a synthetic feed is generated when omitted
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Start time filter (RFC 3339)
    #[arg(long)]
    pub start: Option<DateTime<Utc>>,

    /// End time filter (RFC 3339)
    #[arg(long)]
    pub end: Option<DateTime<Utc>>,

    #[command(flatten)]
    pub synthetic: SyntheticArgs,
}

impl FeedArgs {
    pub fn load(&self, config: &Config) -> anyhow::Result<ReplayFeed> {
        let feed = match &self.input {
            Some(path) => {
                tracing::info!(path = ?path, "Loading price samples");
                ReplayFeed::from_parquet(path)?.markets_only(&self.synthetic.markets)
            }
            None => {
                let synthetic = self.synthetic.apply(&config.synthetic);
                tracing::info!(seed = synthetic.seed, steps = synthetic.steps, "Generating synthetic feed");
                ReplayFeed::new(SyntheticFeed::new(synthetic).generate())
            }
        };
        Ok(feed.between(self.start, self.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_overrides() {
        let args = SyntheticArgs {
            seed: Some(9),
            steps: None,
            markets: vec!["KXA".to_string()],
        };
        let config = args.apply(&SyntheticConfig::default());
        assert_eq!(config.seed, 9);
        assert_eq!(config.steps, SyntheticConfig::default().steps);
        assert_eq!(config.markets, vec!["KXA".to_string()]);
    }

    #[test]
    fn test_load_synthetic_feed() {
        let args = FeedArgs {
            synthetic: SyntheticArgs {
                steps: Some(10),
                ..SyntheticArgs::default()
            },
            ..FeedArgs::default()
        };
        let config = Config::default();
        let feed = args.load(&config).unwrap();
        assert_eq!(feed.len(), 10 * config.synthetic.markets.len());
    }
}
