//! Session safety limits

use crate::config::RiskConfig;
use crate::strategy::InstrumentStore;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Limits that end the session when breached
#[derive(Debug, Clone, Default)]
pub struct SafetyLimits {
    /// Consecutive losses on any single instrument
    pub max_consecutive_losses: Option<u32>,
    /// Negative floor for cumulative profit
    pub max_daily_loss: Option<Decimal>,
}

impl From<&RiskConfig> for SafetyLimits {
    fn from(config: &RiskConfig) -> Self {
        Self {
            max_consecutive_losses: config.max_consecutive_losses,
            max_daily_loss: config.max_daily_loss,
        }
    }
}

/// Reason for trading halt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum HaltReason {
    /// An instrument reached the consecutive-loss cap
    MaxConsecutiveLosses { symbol: String, losses: usize },
    /// Cumulative profit reached the daily-loss floor
    MaxDailyLoss { profit: Decimal, limit: Decimal },
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::MaxConsecutiveLosses { symbol, losses } => {
                write!(f, "{} consecutive losses on {}", losses, symbol)
            }
            HaltReason::MaxDailyLoss { profit, limit } => {
                write!(f, "cumulative profit {} at or below {}", profit, limit)
            }
        }
    }
}

impl SafetyLimits {
    pub fn check_losses(&self, symbol: &str, loss_count: usize) -> Option<HaltReason> {
        let max = self.max_consecutive_losses?;
        (loss_count >= max as usize).then(|| HaltReason::MaxConsecutiveLosses {
            symbol: symbol.to_string(),
            losses: loss_count,
        })
    }

    pub fn check_profit(&self, cumulative_profit: Decimal) -> Option<HaltReason> {
        let limit = self.max_daily_loss?;
        (cumulative_profit <= limit).then_some(HaltReason::MaxDailyLoss {
            profit: cumulative_profit,
            limit,
        })
    }

    /// Run every check across all instruments
    pub fn check(&self, store: &InstrumentStore, cumulative_profit: Decimal) -> Option<HaltReason> {
        store
            .iter()
            .find_map(|e| self.check_losses(e.symbol(), e.loss_count()))
            .or_else(|| self.check_profit(cumulative_profit))
    }
}
