//! Synthetic feed command implementation

use super::SyntheticArgs;
use crate::backtest::SyntheticFeed;
use crate::config::Config;
use crate::data::ParquetWriter;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Parquet file to write
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub synthetic: SyntheticArgs,
}

impl SynthArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let synthetic = self.synthetic.apply(&config.synthetic);
        let samples = SyntheticFeed::new(synthetic.clone()).generate();
        ParquetWriter::new().write_price_samples(&self.output, &samples)?;

        tracing::info!(
            path = ?self.output,
            seed = synthetic.seed,
            markets = synthetic.markets.len(),
            samples = samples.len(),
            "Synthetic feed written"
        );
        Ok(())
    }
}
