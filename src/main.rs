use anyhow::Context;
use clap::Parser;
use parity_hft::cli::{Cli, Commands};
use parity_hft::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Could not load config from {}", cli.config))?;
    config.apply_env();

    // Initialize telemetry
    let _telemetry = parity_hft::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            match config.validate() {
                Ok(()) => println!("# configuration is valid"),
                Err(e) => println!("# configuration is invalid: {}", e),
            }
        }
    }

    Ok(())
}
