//! Paper trading command implementation
//!
//! Streams a feed through the live engine with simulated fills.

use super::FeedArgs;
use crate::config::Config;
use crate::engine::LiveEngine;
use crate::execution::{PaperBalance, PaperExecutor};
use clap::Args;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct PaperArgs {
    #[command(flatten)]
    pub feed: FeedArgs,

    /// Starting paper balance
    #[arg(long)]
    pub balance: Option<Decimal>,
}

impl PaperArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let feed = self.feed.load(config)?;
        let executor = PaperExecutor::new();
        let balance = PaperBalance::new(self.balance.unwrap_or(config.execution.paper_balance));

        let mut engine = LiveEngine::start(config, Arc::new(executor.clone()), Some(Arc::new(balance)));
        for sample in feed {
            engine.submit_price_sample(sample).await?;
        }
        let core = engine.shutdown().await?;

        tracing::info!(
            fills = executor.fills().await.len(),
            decisions = core.decisions().len(),
            "Paper session finished"
        );
        println!("{}", serde_json::to_string_pretty(&core.snapshot())?);
        Ok(())
    }
}
