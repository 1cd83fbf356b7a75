//! Paper trading with drawn outcomes
//!
//! Stands in for order placement when trading is disabled. Outcomes are drawn
//! at placement and delivered after a delay as a synthesized settlement
//! update, so the session handles them exactly like a live settlement.

use crate::config::SimulationConfig;
use crate::protocol::{ContractId, ContractUpdate};
use crate::strategy::{Outcome, TradeIntent};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::time::Duration;

/// An accepted paper order awaiting delivery of its outcome
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedFill {
    pub contract_id: ContractId,
    pub stake: Decimal,
    pub outcome: Outcome,
}

/// Simulated execution with a paper balance
#[derive(Debug)]
pub struct SimulatedExecutor {
    rng: StdRng,
    win_probability: f64,
    payout_rate: Decimal,
    settle_delay: Duration,
    balance: Decimal,
    next_id: ContractId,
}

impl SimulatedExecutor {
    pub fn new(config: &SimulationConfig, opening_balance: Decimal) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            win_probability: config.win_probability.clamp(0.0, 1.0),
            payout_rate: config.payout_rate,
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            balance: opening_balance,
            next_id: 1,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Paper balance after every delivered settlement
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Accept an order and draw its outcome
    pub fn place(&mut self, intent: &TradeIntent) -> SimulatedFill {
        let contract_id = self.next_id;
        self.next_id += 1;

        let outcome = if self.rng.gen_bool(self.win_probability) {
            Outcome::Won
        } else {
            Outcome::Lost
        };

        SimulatedFill {
            contract_id,
            stake: intent.stake,
            outcome,
        }
    }

    /// Apply a fill to the paper balance and build its settlement update
    pub fn settle(&mut self, fill: &SimulatedFill) -> ContractUpdate {
        let profit = match fill.outcome {
            Outcome::Won => fill.stake * self.payout_rate,
            Outcome::Lost => -fill.stake,
        };
        self.balance += profit;

        let status = match fill.outcome {
            Outcome::Won => "won",
            Outcome::Lost => "lost",
        };
        ContractUpdate {
            contract_id: fill.contract_id,
            status: Some(status.to_string()),
            is_sold: 1,
            profit: Some(profit),
            balance_after: Some(self.balance),
            tick_stream: Vec::new(),
        }
    }
}
