//! parity-hft: digit-parity reversal trading client
//!
//! This library provides the core components for:
//! - A pipelined WebSocket RPC client with reconnect and re-authorization
//! - Push classification and routing
//! - Per-instrument streak counting, Martingale staking and early prediction
//! - Session orchestration with safety limits and simulation mode
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod protocol;
pub mod session;
pub mod strategy;
pub mod telemetry;
pub mod transport;
