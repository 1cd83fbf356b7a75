//! Digit-parity reversal strategy
//!
//! One engine per traded symbol: count parity streaks, bet on a reversal once
//! a streak reaches the threshold, escalate stakes along a Martingale table
//! after losses, and use intermediate contract ticks to predict outcomes
//! before settlement.

mod engine;
mod martingale;
mod store;
mod types;

pub use engine::InstrumentEngine;
pub use martingale::MartingaleTable;
pub use store::InstrumentStore;
pub use types::{
    BetType, ContractEvent, EngineState, Order, OrderStatus, Outcome, Parity, Settlement,
    TickDecision, TradeIntent,
};
