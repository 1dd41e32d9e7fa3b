use clap::Parser;
use spikebot::cli::{Cli, Commands};
use spikebot::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            toml::from_str(include_str!("../config.toml.example"))?
        }
    };

    let _telemetry = spikebot::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Backtest(args) => args.execute(&config).await?,
        Commands::Paper(args) => {
            tracing::info!("Starting paper trading");
            args.execute(&config).await?;
        }
        Commands::Synth(args) => args.execute(&config).await?,
        Commands::Config => print!("{}", toml::to_string_pretty(&config)?),
    }

    Ok(())
}
