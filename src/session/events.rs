//! Typed session events and their sinks

use super::stats::SessionStats;
use super::types::ShutdownSummary;
use crate::protocol::ContractId;
use crate::strategy::{BetType, Outcome};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;

/// Structured events emitted by the session; presentation is up to the sink
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    TradeStarted {
        symbol: String,
        contract_id: ContractId,
        bet: BetType,
        stake: Decimal,
        simulated: bool,
    },
    TradeSettled {
        symbol: String,
        contract_id: ContractId,
        bet: BetType,
        outcome: Outcome,
        profit: Decimal,
        balance_after: Option<Decimal>,
    },
    StatsSnapshot(SessionStats),
    ShutdownSummary(ShutdownSummary),
}

/// Consumer of session events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

/// Renders events as structured log records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: SessionEvent) {
        match event {
            SessionEvent::TradeStarted {
                symbol,
                contract_id,
                bet,
                stake,
                simulated,
            } => {
                tracing::info!(%symbol, contract_id, ?bet, %stake, simulated, "Trade started");
            }
            SessionEvent::TradeSettled {
                symbol,
                contract_id,
                bet,
                outcome,
                profit,
                balance_after,
            } => {
                tracing::info!(
                    %symbol,
                    contract_id,
                    ?bet,
                    ?outcome,
                    %profit,
                    balance_after = ?balance_after,
                    "Trade settled"
                );
            }
            SessionEvent::StatsSnapshot(stats) => {
                tracing::info!(
                    trades = stats.total_trades,
                    won = stats.won,
                    lost = stats.lost,
                    profit = %stats.cumulative_profit,
                    balance = ?stats.current_balance,
                    "Session stats"
                );
            }
            SessionEvent::ShutdownSummary(summary) => {
                tracing::info!(
                    reason = %summary.reason,
                    initial_balance = ?summary.initial_balance,
                    final_balance = ?summary.final_balance,
                    profit = %summary.total_profit,
                    trades = summary.total_trades,
                    win_rate = summary.win_rate,
                    simulated = summary.simulated,
                    "Session summary"
                );
                for (symbol, s) in &summary.instruments {
                    tracing::info!(
                        %symbol,
                        trades = s.trades,
                        won = s.won,
                        lost = s.lost,
                        profit = %s.profit,
                        "Instrument summary"
                    );
                }
            }
        }
    }
}

/// Forwards events to a channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: SessionEvent) {
        // Receiver gone means nobody is listening
        let _ = self.tx.send(event);
    }
}
