//! Session orchestration
//!
//! Startup, the event loop, safety limits, simulation and shutdown.

mod events;
mod orchestrator;
mod safety;
mod simulator;
mod stats;
mod types;

pub use events::{ChannelSink, EventSink, SessionEvent, TracingSink};
pub use orchestrator::Session;
pub use safety::{HaltReason, SafetyLimits};
pub use simulator::{SimulatedExecutor, SimulatedFill};
pub use stats::{InstrumentStats, SessionStats};
pub use types::{SessionError, ShutdownReason, ShutdownSummary};

use crate::config::Config;
use crate::transport::RpcClient;
use std::future::Future;
use std::sync::Arc;

/// Validate, connect and run a session against the configured venue
pub async fn run_session<F>(
    config: Config,
    sink: Arc<dyn EventSink>,
    shutdown: F,
) -> Result<ShutdownSummary, SessionError>
where
    F: Future<Output = ()>,
{
    config.validate()?;

    let (client, events) = RpcClient::connect(config.transport_config()).await?;
    tracing::info!(url = %client.url(), "Connected");

    let session = Session::new(config, Arc::new(client), sink)?;
    session.run(events, shutdown).await
}
