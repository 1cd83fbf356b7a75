//! Configuration types for parity-hft

use crate::strategy::MartingaleTable;
use crate::telemetry::LogFormat;
use crate::transport::TransportConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `connection.api_token`
pub const TOKEN_ENV: &str = "PARITY_HFT_API_TOKEN";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub transport: TransportSettings,
    pub trading: TradingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Venue connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub app_id: String,
    #[serde(default, skip_serializing)]
    pub api_token: String,
    /// Account queried for balances
    #[serde(default = "default_account")]
    pub account: String,
}

fn default_endpoint() -> String {
    "wss://ws.derivws.com/websockets/v3".to_string()
}
fn default_account() -> String {
    "current".to_string()
}

/// Request and reconnect tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportSettings {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_reconnect_base_ms() -> u64 {
    1000
}
fn default_reconnect_cap_ms() -> u64 {
    30_000
}
fn default_ping_interval_secs() -> u64 {
    30
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_reconnect_attempts: 5,
            reconnect_base_ms: 1000,
            reconnect_cap_ms: 30_000,
            ping_interval_secs: 30,
        }
    }
}

/// Strategy parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradingConfig {
    /// Instruments to trade
    pub symbols: Vec<String>,
    /// Instruments the venue offers digit contracts on
    #[serde(default = "default_allowed_symbols")]
    pub allowed_symbols: Vec<String>,
    /// Stake per consecutive loss
    #[serde(default)]
    pub martingale: MartingaleTable,
    /// Consecutive same-parity digits before betting on a reversal
    pub digit_threshold: i64,
    #[serde(default = "default_duration_ticks")]
    pub duration_ticks: u32,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_allowed_symbols() -> Vec<String> {
    [
        "R_10", "R_25", "R_50", "R_75", "R_100", "1HZ10V", "1HZ25V", "1HZ50V", "1HZ75V",
        "1HZ100V",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_duration_ticks() -> u32 {
    1
}
fn default_currency() -> String {
    "USD".to_string()
}

/// Session safety limits
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RiskConfig {
    /// Stop once any instrument reaches this many consecutive losses
    #[serde(default)]
    pub max_consecutive_losses: Option<u32>,
    /// Stop once cumulative profit falls below this (negative) amount
    #[serde(default)]
    pub max_daily_loss: Option<Decimal>,
}

/// Paper trading with drawn outcomes
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_win_probability")]
    pub win_probability: f64,
    /// Profit per unit stake on a win
    #[serde(default = "default_payout_rate")]
    pub payout_rate: Decimal,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_win_probability() -> f64 {
    0.5
}
fn default_payout_rate() -> Decimal {
    Decimal::new(95, 2) // 0.95
}
fn default_settle_delay_ms() -> u64 {
    1000
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            win_probability: 0.5,
            payout_rate: Decimal::new(95, 2),
            settle_delay_ms: 1000,
            seed: None,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Serve Prometheus metrics on this port
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

/// Startup validation failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("No symbols configured")]
    EmptySymbols,
    #[error("Symbol {0} is not in the allowed set")]
    DisallowedSymbol(String),
    #[error("Symbol {0} is configured twice")]
    DuplicateSymbol(String),
    #[error("Digit threshold must be a positive integer, got {0}")]
    InvalidThreshold(i64),
    #[error("Martingale table is empty")]
    EmptyMartingale,
    #[error("Martingale stake #{index} must be positive, got {stake}")]
    NonPositiveStake { index: usize, stake: Decimal },
    #[error("Contract duration must be at least one tick")]
    ZeroDuration,
    #[error("Missing app_id")]
    MissingAppId,
    #[error("Missing API token (set connection.api_token or PARITY_HFT_API_TOKEN)")]
    MissingToken,
    #[error("Request timeout must be positive")]
    InvalidTimeout,
    #[error("max_daily_loss must be negative, got {0}")]
    NonNegativeDailyLoss(Decimal),
    #[error("max_consecutive_losses must be positive")]
    ZeroConsecutiveLosses,
    #[error("Win probability must be within [0, 1], got {0}")]
    InvalidWinProbability(f64),
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Take the credential from the environment when set
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.is_empty() {
                self.connection.api_token = token;
            }
        }
    }

    /// Check everything that must hold before connecting
    pub fn validate(&self) -> Result<(), ValidationError> {
        let trading = &self.trading;
        if trading.symbols.is_empty() {
            return Err(ValidationError::EmptySymbols);
        }

        let allowed: HashSet<&str> = trading.allowed_symbols.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        for symbol in &trading.symbols {
            if !allowed.contains(symbol.as_str()) {
                return Err(ValidationError::DisallowedSymbol(symbol.clone()));
            }
            if !seen.insert(symbol.as_str()) {
                return Err(ValidationError::DuplicateSymbol(symbol.clone()));
            }
        }

        if trading.digit_threshold <= 0 || trading.digit_threshold > i64::from(u32::MAX) {
            return Err(ValidationError::InvalidThreshold(trading.digit_threshold));
        }
        if trading.martingale.is_empty() {
            return Err(ValidationError::EmptyMartingale);
        }
        if let Some(index) = trading.martingale.first_non_positive() {
            return Err(ValidationError::NonPositiveStake {
                index,
                stake: trading.martingale.stakes()[index],
            });
        }
        if trading.duration_ticks == 0 {
            return Err(ValidationError::ZeroDuration);
        }

        if self.connection.app_id.trim().is_empty() {
            return Err(ValidationError::MissingAppId);
        }
        if self.connection.api_token.trim().is_empty() {
            return Err(ValidationError::MissingToken);
        }
        if self.transport.request_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        if let Some(limit) = self.risk.max_daily_loss {
            if limit >= Decimal::ZERO {
                return Err(ValidationError::NonNegativeDailyLoss(limit));
            }
        }
        if self.risk.max_consecutive_losses == Some(0) {
            return Err(ValidationError::ZeroConsecutiveLosses);
        }

        let p = self.simulation.win_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ValidationError::InvalidWinProbability(p));
        }

        Ok(())
    }

    /// Threshold as a count; only meaningful after `validate`
    pub fn threshold(&self) -> u32 {
        u32::try_from(self.trading.digit_threshold).unwrap_or(u32::MAX)
    }

    /// Endpoint with the application id attached
    pub fn endpoint_url(&self) -> String {
        let sep = if self.connection.endpoint.contains('?') {
            '&'
        } else {
            '?'
        };
        format!("{}{}app_id={}", self.connection.endpoint, sep, self.connection.app_id)
    }

    pub fn transport_config(&self) -> TransportConfig {
        let t = &self.transport;
        TransportConfig::new(self.endpoint_url())
            .request_timeout(Duration::from_secs(t.request_timeout_secs))
            .max_reconnects(t.max_reconnect_attempts)
            .backoff(
                Duration::from_millis(t.reconnect_base_ms),
                Duration::from_millis(t.reconnect_cap_ms),
            )
            .ping_interval(Duration::from_secs(t.ping_interval_secs))
    }
}
