//! Run command implementation

use crate::config::Config;
use crate::session::{self, TracingSink};
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Draw outcomes locally instead of placing orders
    #[arg(long)]
    pub simulate: bool,
}

impl RunArgs {
    pub async fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        if self.simulate {
            config.simulation.enabled = true;
        }
        tracing::info!(
            symbols = ?config.trading.symbols,
            threshold = config.trading.digit_threshold,
            simulated = config.simulation.enabled,
            "Starting session"
        );

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        };

        let summary = session::run_session(config, Arc::new(TracingSink), shutdown).await?;
        tracing::info!(reason = %summary.reason, "Session finished");
        Ok(())
    }
}
