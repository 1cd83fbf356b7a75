//! Aggregate trading statistics
//!
//! Balances are only ever taken from values the venue (or the simulator)
//! reports. Profit is summed from settlements; it is never used to derive a
//! balance.

use crate::strategy::{Outcome, Settlement};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-instrument breakdown
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstrumentStats {
    pub trades: u32,
    pub won: u32,
    pub lost: u32,
    pub profit: Decimal,
}

impl InstrumentStats {
    fn record(&mut self, outcome: Outcome, profit: Decimal) {
        match outcome {
            Outcome::Won => self.won += 1,
            Outcome::Lost => self.lost += 1,
        }
        self.profit += profit;
    }

    pub fn win_rate(&self) -> f64 {
        win_rate(self.won, self.lost)
    }
}

/// Session-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub total_trades: u32,
    pub won: u32,
    pub lost: u32,
    pub initial_balance: Option<Decimal>,
    pub current_balance: Option<Decimal>,
    pub cumulative_profit: Decimal,
    pub instruments: BTreeMap<String, InstrumentStats>,
}

impl SessionStats {
    pub fn new<S: AsRef<str>>(symbols: &[S]) -> Self {
        Self {
            instruments: symbols
                .iter()
                .map(|s| (s.as_ref().to_string(), InstrumentStats::default()))
                .collect(),
            ..Default::default()
        }
    }

    /// Opening balance; also becomes the current balance
    pub fn set_initial_balance(&mut self, balance: Decimal) {
        self.initial_balance = Some(balance);
        self.current_balance = Some(balance);
    }

    /// Apply a balance reported by the venue
    pub fn set_balance(&mut self, balance: Decimal) {
        self.current_balance = Some(balance);
    }

    /// Order accepted
    pub fn record_trade(&mut self, symbol: &str) {
        self.total_trades += 1;
        self.instruments.entry(symbol.to_string()).or_default().trades += 1;
    }

    /// Authoritative result of an order
    pub fn record_settlement(&mut self, settlement: &Settlement) {
        match settlement.outcome {
            Outcome::Won => self.won += 1,
            Outcome::Lost => self.lost += 1,
        }
        self.cumulative_profit += settlement.profit;
        self.instruments
            .entry(settlement.symbol.clone())
            .or_default()
            .record(settlement.outcome, settlement.profit);

        if let Some(balance) = settlement.balance_after {
            self.set_balance(balance);
        }
    }

    /// Share of settled trades that won, 0.0 when nothing settled
    pub fn win_rate(&self) -> f64 {
        win_rate(self.won, self.lost)
    }
}

fn win_rate(won: u32, lost: u32) -> f64 {
    let settled = won + lost;
    if settled == 0 {
        0.0
    } else {
        f64::from(won) / f64::from(settled)
    }
}
