//! Session types

use super::safety::HaltReason;
use super::stats::InstrumentStats;
use crate::config::ValidationError;
use crate::transport::TransportError;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Fatal session failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Startup failed: {0}")]
    Startup(String),
}

/// Why the session stopped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ShutdownReason {
    /// Operator requested shutdown
    Signal,
    /// A safety limit was breached
    SafetyLimit(HaltReason),
    /// Connection could not be kept alive
    TransportLost(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal => write!(f, "shutdown signal"),
            ShutdownReason::SafetyLimit(reason) => write!(f, "safety limit: {}", reason),
            ShutdownReason::TransportLost(why) => write!(f, "transport lost: {}", why),
        }
    }
}

/// End-of-session report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShutdownSummary {
    pub reason: ShutdownReason,
    pub initial_balance: Option<Decimal>,
    pub final_balance: Option<Decimal>,
    pub total_profit: Decimal,
    pub total_trades: u32,
    pub won: u32,
    pub lost: u32,
    pub win_rate: f64,
    pub instruments: BTreeMap<String, InstrumentStats>,
    pub simulated: bool,
}
