//! Strategy types

use crate::protocol::ContractId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Even/odd classification of a digit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    pub fn of(digit: u8) -> Self {
        if digit % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Parity::Even => Parity::Odd,
            Parity::Odd => Parity::Even,
        }
    }
}

/// Direction of a digit-parity contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetType {
    /// Wins if the exit digit is odd
    BetOdd,
    /// Wins if the exit digit is even
    BetEven,
}

impl BetType {
    /// The bet that wins on `parity`
    pub fn on(parity: Parity) -> Self {
        match parity {
            Parity::Even => BetType::BetEven,
            Parity::Odd => BetType::BetOdd,
        }
    }

    pub fn parity(self) -> Parity {
        match self {
            BetType::BetOdd => Parity::Odd,
            BetType::BetEven => Parity::Even,
        }
    }

    pub fn opposite(self) -> Self {
        BetType::on(self.parity().opposite())
    }

    /// Venue contract type code
    pub fn contract_type(self) -> &'static str {
        match self {
            BetType::BetOdd => "DIGITODD",
            BetType::BetEven => "DIGITEVEN",
        }
    }

    /// Outcome of this bet if the deciding digit is `digit`
    pub fn outcome_for(self, digit: u8) -> Outcome {
        if Parity::of(digit) == self.parity() {
            Outcome::Won
        } else {
            Outcome::Lost
        }
    }
}

/// Trade result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Won,
    Lost,
}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Settled,
}

/// Per-instrument engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Accumulating parity streaks
    Counting,
    /// Placement request in flight
    AwaitingFill { bet: BetType, stake: Decimal },
    /// Order outstanding, no outcome known yet
    Open { contract_id: ContractId },
    /// Previous order lost; the next tick places `bet` directly
    Armed { bet: BetType },
}

/// A placed contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub contract_id: ContractId,
    pub bet: BetType,
    pub stake: Decimal,
    pub status: OrderStatus,
    pub profit: Option<Decimal>,
    /// Last digits seen in intermediate updates
    pub tick_digits: Vec<u8>,
    /// Early outcome, made at most once per order
    pub prediction: Option<Outcome>,
    /// Loss count the stake was drawn from
    pub loss_count_at_entry: usize,
    pub placed_at: DateTime<Utc>,
}

impl Order {
    pub fn new(contract_id: ContractId, bet: BetType, stake: Decimal, loss_count: usize) -> Self {
        Self {
            contract_id,
            bet,
            stake,
            status: OrderStatus::Open,
            profit: None,
            tick_digits: Vec::new(),
            prediction: None,
            loss_count_at_entry: loss_count,
            placed_at: Utc::now(),
        }
    }
}

/// Request to open a trade, produced by a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeIntent {
    pub bet: BetType,
    pub stake: Decimal,
}

/// What a tick asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    /// Nothing to do
    Idle,
    /// Place an order
    Trade(TradeIntent),
    /// Stake table exhausted; instrument was reset
    Exhausted,
}

/// Authoritative result of an order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    pub symbol: String,
    pub contract_id: ContractId,
    pub bet: BetType,
    pub stake: Decimal,
    pub outcome: Outcome,
    pub profit: Decimal,
    pub balance_after: Option<Decimal>,
    /// Prediction made earlier for this order, if any
    pub predicted: Option<Outcome>,
}

impl Settlement {
    pub fn prediction_diverged(&self) -> bool {
        matches!(self.predicted, Some(p) if p != self.outcome)
    }
}

/// What an order update did to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum ContractEvent {
    /// Not an order this engine tracks, or nothing new
    Ignored,
    /// Early outcome inferred from intermediate ticks
    Predicted {
        contract_id: ContractId,
        outcome: Outcome,
    },
    /// Order settled
    Settled(Settlement),
}
