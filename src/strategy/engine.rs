//! Per-instrument digit-parity state machine
//!
//! Counting → AwaitingFill → Open → (Counting | Armed). Streaks only move
//! while Counting, so an in-flight trade can never be triggered twice. The
//! engine performs no I/O; the session carries out what it asks for and
//! reports the results back.

use super::martingale::MartingaleTable;
use super::types::{
    BetType, ContractEvent, EngineState, Order, OrderStatus, Outcome, Parity, Settlement,
    TickDecision, TradeIntent,
};
use crate::protocol::{ContractId, ContractUpdate, Tick};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResetCause {
    Win,
    PlacementFailed,
    Exhausted,
}

/// Strategy state for one traded symbol
#[derive(Debug, Clone)]
pub struct InstrumentEngine {
    symbol: String,
    threshold: u32,
    table: Arc<MartingaleTable>,
    even_streak: u32,
    odd_streak: u32,
    loss_count: usize,
    state: EngineState,
    last_digit: Option<u8>,
    pip_size: Option<u32>,
    /// Orders awaiting settlement, including ones already predicted
    orders: HashMap<ContractId, Order>,
    active_order_id: Option<ContractId>,
}

impl InstrumentEngine {
    pub fn new(symbol: impl Into<String>, threshold: u32, table: Arc<MartingaleTable>) -> Self {
        Self {
            symbol: symbol.into(),
            threshold,
            table,
            even_streak: 0,
            odd_streak: 0,
            loss_count: 0,
            state: EngineState::Counting,
            last_digit: None,
            pip_size: None,
            orders: HashMap::new(),
            active_order_id: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn even_streak(&self) -> u32 {
        self.even_streak
    }

    pub fn odd_streak(&self) -> u32 {
        self.odd_streak
    }

    pub fn loss_count(&self) -> usize {
        self.loss_count
    }

    pub fn last_digit(&self) -> Option<u8> {
        self.last_digit
    }

    pub fn active_order_id(&self) -> Option<ContractId> {
        self.active_order_id
    }

    /// Bet currently being placed or held
    pub fn current_bet(&self) -> Option<BetType> {
        match self.state {
            EngineState::AwaitingFill { bet, .. } => Some(bet),
            EngineState::Open { contract_id } => self.orders.get(&contract_id).map(|o| o.bet),
            _ => None,
        }
    }

    /// Bet queued for the next tick after a loss
    pub fn pending_bet(&self) -> Option<BetType> {
        match self.state {
            EngineState::Armed { bet } => Some(bet),
            _ => None,
        }
    }

    pub fn owns(&self, contract_id: ContractId) -> bool {
        self.orders.contains_key(&contract_id)
    }

    pub fn order(&self, contract_id: ContractId) -> Option<&Order> {
        self.orders.get(&contract_id)
    }

    /// Contracts not yet settled
    pub fn open_contracts(&self) -> Vec<ContractId> {
        let mut ids: Vec<ContractId> = self.orders.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Consume a price update
    pub fn on_tick(&mut self, tick: &Tick) -> TickDecision {
        let Some(digit) = tick.last_digit() else {
            tracing::warn!(symbol = %self.symbol, quote = tick.quote, "Tick without a digit");
            return TickDecision::Idle;
        };
        self.last_digit = Some(digit);
        self.pip_size = Some(tick.pip_size);

        match self.state {
            EngineState::Counting => {
                let parity = Parity::of(digit);
                let streak = self.advance_streak(parity);
                if streak == self.threshold {
                    tracing::debug!(
                        symbol = %self.symbol,
                        streak,
                        parity = ?parity,
                        "Streak threshold reached"
                    );
                    self.begin_trade(BetType::on(parity.opposite()))
                } else {
                    TickDecision::Idle
                }
            }
            EngineState::Armed { bet } => self.begin_trade(bet),
            EngineState::AwaitingFill { .. } | EngineState::Open { .. } => TickDecision::Idle,
        }
    }

    fn advance_streak(&mut self, parity: Parity) -> u32 {
        match parity {
            Parity::Even => {
                self.even_streak += 1;
                self.odd_streak = 0;
                self.even_streak
            }
            Parity::Odd => {
                self.odd_streak += 1;
                self.even_streak = 0;
                self.odd_streak
            }
        }
    }

    fn begin_trade(&mut self, bet: BetType) -> TickDecision {
        match self.table.stake(self.loss_count) {
            Some(stake) => {
                self.state = EngineState::AwaitingFill { bet, stake };
                TickDecision::Trade(TradeIntent { bet, stake })
            }
            None => {
                tracing::warn!(
                    symbol = %self.symbol,
                    loss_count = self.loss_count,
                    "Martingale table exhausted, resetting"
                );
                self.reset(ResetCause::Exhausted);
                TickDecision::Exhausted
            }
        }
    }

    /// Placement confirmed by the venue (or the simulator)
    pub fn on_placed(&mut self, contract_id: ContractId) -> Option<Order> {
        let EngineState::AwaitingFill { bet, stake } = self.state else {
            tracing::warn!(symbol = %self.symbol, contract_id, "Placement without a pending trade");
            return None;
        };

        let order = Order::new(contract_id, bet, stake, self.loss_count);
        self.orders.insert(contract_id, order.clone());
        self.active_order_id = Some(contract_id);
        self.state = EngineState::Open { contract_id };
        Some(order)
    }

    /// Placement rejected or timed out; not a trading loss
    pub fn on_placement_failed(&mut self) {
        if matches!(self.state, EngineState::AwaitingFill { .. }) {
            self.reset(ResetCause::PlacementFailed);
        }
    }

    /// Updates for an open contract can no longer be received
    ///
    /// The instrument goes back to Counting with `loss_count` untouched. The
    /// order is kept so a settlement that still arrives is applied once.
    pub fn on_tracking_lost(&mut self, contract_id: ContractId) {
        if self.state != (EngineState::Open { contract_id }) {
            return;
        }
        tracing::warn!(
            symbol = %self.symbol,
            contract_id,
            loss_count = self.loss_count,
            "Lost track of open contract, resuming counting"
        );
        if self.active_order_id == Some(contract_id) {
            self.active_order_id = None;
        }
        self.zero_streaks();
        self.state = EngineState::Counting;
    }

    /// Consume an order-lifecycle push
    pub fn on_contract_update(&mut self, update: &ContractUpdate) -> ContractEvent {
        let pip_size = self.pip_size;
        let Some(order) = self.orders.get_mut(&update.contract_id) else {
            return ContractEvent::Ignored;
        };

        if !update.tick_stream.is_empty() {
            order.tick_digits = update
                .tick_stream
                .iter()
                .filter_map(|t| t.last_digit(pip_size))
                .collect();
        }

        if let Some(outcome) = update.settlement() {
            return self.settle(update, outcome);
        }

        if order.prediction.is_some() {
            return ContractEvent::Ignored;
        }
        let Some(&digit) = order.tick_digits.last() else {
            return ContractEvent::Ignored;
        };

        let outcome = order.bet.outcome_for(digit);
        order.prediction = Some(outcome);
        let (contract_id, bet) = (order.contract_id, order.bet);

        tracing::debug!(symbol = %self.symbol, contract_id, digit, outcome = ?outcome, "Outcome predicted");
        self.apply_outcome(contract_id, bet, outcome);
        ContractEvent::Predicted {
            contract_id,
            outcome,
        }
    }

    fn settle(&mut self, update: &ContractUpdate, outcome: Outcome) -> ContractEvent {
        let Some(mut order) = self.orders.remove(&update.contract_id) else {
            return ContractEvent::Ignored;
        };

        let profit = match update.profit {
            Some(profit) => profit,
            None => {
                let fallback = match outcome {
                    Outcome::Won => Decimal::ZERO,
                    Outcome::Lost => -order.stake,
                };
                tracing::warn!(
                    symbol = %self.symbol,
                    contract_id = order.contract_id,
                    outcome = ?outcome,
                    %fallback,
                    "Settlement without profit, recording fallback"
                );
                fallback
            }
        };
        order.status = OrderStatus::Settled;
        order.profit = Some(profit);

        if self.active_order_id == Some(order.contract_id) {
            self.active_order_id = None;
        }

        match order.prediction {
            None => self.apply_outcome(order.contract_id, order.bet, outcome),
            Some(predicted) if predicted == outcome => {}
            Some(predicted) => self.reconcile(&order, predicted, outcome),
        }

        ContractEvent::Settled(Settlement {
            symbol: self.symbol.clone(),
            contract_id: order.contract_id,
            bet: order.bet,
            stake: order.stake,
            outcome,
            profit,
            balance_after: update.balance_after,
            predicted: order.prediction,
        })
    }

    /// First knowledge of an order's outcome, from prediction or settlement
    fn apply_outcome(&mut self, contract_id: ContractId, bet: BetType, outcome: Outcome) {
        let current = self.state == EngineState::Open { contract_id };
        match outcome {
            Outcome::Won => {
                self.loss_count = 0;
                if current {
                    self.reset(ResetCause::Win);
                }
            }
            Outcome::Lost => {
                self.loss_count += 1;
                if current {
                    self.zero_streaks();
                    self.state = EngineState::Armed {
                        bet: bet.opposite(),
                    };
                }
            }
        }
    }

    /// Settlement disagrees with the earlier prediction; settlement wins
    fn reconcile(&mut self, order: &Order, predicted: Outcome, actual: Outcome) {
        tracing::warn!(
            symbol = %self.symbol,
            contract_id = order.contract_id,
            predicted = ?predicted,
            actual = ?actual,
            "Prediction diverged from settlement"
        );

        let newer_in_flight = matches!(
            self.state,
            EngineState::AwaitingFill { .. } | EngineState::Open { .. }
        );
        match actual {
            Outcome::Won => {
                self.loss_count = 0;
                if !newer_in_flight {
                    self.reset(ResetCause::Win);
                }
            }
            Outcome::Lost => {
                self.loss_count = order.loss_count_at_entry + 1;
                if !newer_in_flight {
                    self.zero_streaks();
                    self.state = EngineState::Armed {
                        bet: order.bet.opposite(),
                    };
                }
            }
        }
    }

    fn zero_streaks(&mut self) {
        self.even_streak = 0;
        self.odd_streak = 0;
    }

    fn reset(&mut self, cause: ResetCause) {
        self.zero_streaks();
        if cause != ResetCause::PlacementFailed {
            self.loss_count = 0;
        }
        self.state = EngineState::Counting;
    }
}
