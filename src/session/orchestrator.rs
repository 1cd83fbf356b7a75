//! Session orchestrator
//!
//! A single control loop owns the instrument store, the statistics and the
//! subscription bookkeeping. Requests to the venue run as spawned tasks that
//! report back into the loop, so every state change happens here, one event
//! at a time, in arrival order.

use super::events::{EventSink, SessionEvent};
use super::safety::{HaltReason, SafetyLimits};
use super::simulator::{SimulatedExecutor, SimulatedFill};
use super::stats::SessionStats;
use super::types::{SessionError, ShutdownReason, ShutdownSummary};
use crate::config::Config;
use crate::dispatch::{self, Push, Route};
use crate::protocol::{
    ContractId, ContractUpdate, OrderRequest, OrderSubscription, Placement, SubscriptionId, Tick,
};
use crate::strategy::{ContractEvent, InstrumentStore, Settlement, TickDecision, TradeIntent};
use crate::telemetry::{self, GaugeMetric};
use crate::transport::{TransportError, TransportEvent, VenueApi};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Subscription attempts per order before waiting for a reconnect to replay it
const ORDER_SUBSCRIBE_ATTEMPTS: u32 = 3;

/// Results of spawned requests, fed back into the loop
#[derive(Debug)]
enum LoopEvent {
    Placed {
        symbol: String,
        result: Result<Placement, TransportError>,
    },
    OrderSubscribed {
        symbol: String,
        contract_id: ContractId,
        generation: u64,
        result: Result<OrderSubscription, TransportError>,
    },
    TickSubscribed {
        symbol: String,
        generation: u64,
        result: Result<SubscriptionId, TransportError>,
    },
    SimulatedDraw {
        symbol: String,
        fill: SimulatedFill,
    },
    Balance(Result<Decimal, TransportError>),
}

enum Next {
    Stop(ShutdownReason),
    Loop(LoopEvent),
    Transport(Option<TransportEvent>),
}

/// Trading session over one venue connection
pub struct Session {
    config: Config,
    venue: Arc<dyn VenueApi>,
    sink: Arc<dyn EventSink>,
    store: InstrumentStore,
    stats: SessionStats,
    limits: SafetyLimits,
    simulator: Option<SimulatedExecutor>,
    tick_subscriptions: HashMap<String, SubscriptionId>,
    order_subscriptions: HashMap<ContractId, SubscriptionId>,
    /// Bumped when the connection drops; older subscription ids are stale
    generation: u64,
    halt: Option<ShutdownReason>,
    loop_tx: mpsc::UnboundedSender<LoopEvent>,
    loop_rx: mpsc::UnboundedReceiver<LoopEvent>,
}

impl Session {
    /// Build a session from a validated configuration
    pub fn new(
        config: Config,
        venue: Arc<dyn VenueApi>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let store = InstrumentStore::new(
            &config.trading.symbols,
            config.threshold(),
            config.trading.martingale.clone(),
        );
        let stats = SessionStats::new(&config.trading.symbols);
        let limits = SafetyLimits::from(&config.risk);
        let (loop_tx, loop_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            venue,
            sink,
            store,
            stats,
            limits,
            simulator: None,
            tick_subscriptions: HashMap::new(),
            order_subscriptions: HashMap::new(),
            generation: 0,
            halt: None,
            loop_tx,
            loop_rx,
        })
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn store(&self) -> &InstrumentStore {
        &self.store
    }

    fn simulated(&self) -> bool {
        self.config.simulation.enabled
    }

    /// Start up, trade until `shutdown` resolves or a limit is hit, then wind down
    pub async fn run<F>(
        mut self,
        mut events: mpsc::Receiver<TransportEvent>,
        shutdown: F,
    ) -> Result<ShutdownSummary, SessionError>
    where
        F: Future<Output = ()>,
    {
        if let Err(e) = self.start().await {
            self.venue.disconnect().await;
            return Err(e);
        }

        tokio::pin!(shutdown);
        let reason = loop {
            if let Some(reason) = self.halt.take() {
                break reason;
            }

            let next = tokio::select! {
                _ = &mut shutdown => Next::Stop(ShutdownReason::Signal),
                Some(event) = self.loop_rx.recv() => Next::Loop(event),
                event = events.recv() => Next::Transport(event),
            };

            match next {
                Next::Stop(reason) => break reason,
                Next::Loop(event) => self.on_loop_event(event),
                Next::Transport(Some(event)) => self.on_transport_event(event),
                Next::Transport(None) => {
                    break ShutdownReason::TransportLost("event stream closed".to_string())
                }
            }
        };

        Ok(self.shutdown(reason).await)
    }

    /// Authorize, capture the opening balance and subscribe every tick stream
    async fn start(&mut self) -> Result<(), SessionError> {
        let account = self.venue.authorize(&self.config.connection.api_token).await?;
        tracing::info!(
            loginid = %account.loginid,
            balance = %account.balance,
            currency = %account.currency,
            simulated = self.simulated(),
            "Authorized"
        );
        self.stats.set_initial_balance(account.balance);
        telemetry::set_gauge_decimal(GaugeMetric::Balance, account.balance);

        if self.simulated() {
            self.simulator = Some(SimulatedExecutor::new(
                &self.config.simulation,
                account.balance,
            ));
        }

        let symbols: Vec<String> = self.store.symbols().map(str::to_string).collect();
        let venue = &self.venue;
        let results = join_all(symbols.iter().map(|s| venue.subscribe_ticks(s))).await;
        for (symbol, result) in symbols.into_iter().zip(results) {
            match result {
                Ok(id) => {
                    tracing::info!(%symbol, subscription = %id, "Subscribed to ticks");
                    self.tick_subscriptions.insert(symbol, id);
                }
                Err(e) => {
                    return Err(SessionError::Startup(format!(
                        "tick subscription for {} failed: {}",
                        symbol, e
                    )))
                }
            }
        }
        Ok(())
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Push(value) => self.on_push(dispatch::classify(&value)),
            TransportEvent::Reconnecting { attempt, delay } => {
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "Connection lost, reconnecting");
                self.generation += 1;
                self.tick_subscriptions.clear();
                self.order_subscriptions.clear();
            }
            TransportEvent::Reconnected => {
                tracing::info!("Reconnected, replaying subscriptions");
                self.replay_subscriptions();
            }
            TransportEvent::Closed => {
                self.halt = Some(ShutdownReason::TransportLost("connection closed".to_string()));
            }
            TransportEvent::Fatal(e) => {
                tracing::error!(error = %e, "Transport gave up");
                self.halt = Some(ShutdownReason::TransportLost(e.to_string()));
            }
        }
    }

    fn on_push(&mut self, push: Push) {
        match (dispatch::route(&push, &self.store), push) {
            (Route::Instrument(symbol), Push::Tick(tick)) => self.on_tick(&symbol, &tick),
            (Route::Order { symbol, .. }, Push::ContractUpdate(update)) => {
                self.on_contract_update(&symbol, &update)
            }
            (_, Push::Error { req_id, error }) => {
                tracing::warn!(req_id = ?req_id, code = %error.code, message = %error.message, "Venue error");
            }
            (_, push) => tracing::trace!(?push, "Push dropped"),
        }
    }

    fn on_tick(&mut self, symbol: &str, tick: &Tick) {
        let Some(engine) = self.store.get_mut(symbol) else {
            return;
        };
        match engine.on_tick(tick) {
            TickDecision::Idle => {}
            TickDecision::Exhausted => {
                tracing::warn!(%symbol, "Stake table exhausted, instrument reset");
            }
            TickDecision::Trade(intent) => self.open_trade(symbol, intent),
        }
    }

    fn open_trade(&mut self, symbol: &str, intent: TradeIntent) {
        if let Some(simulator) = self.simulator.as_mut() {
            let fill = simulator.place(&intent);
            let delay = simulator.settle_delay();
            self.on_accepted(symbol, fill.contract_id, true);

            let tx = self.loop_tx.clone();
            let symbol = symbol.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(LoopEvent::SimulatedDraw { symbol, fill });
            });
            return;
        }

        let order = OrderRequest {
            symbol: symbol.to_string(),
            bet: intent.bet,
            stake: intent.stake,
            duration_ticks: self.config.trading.duration_ticks,
            currency: self.config.trading.currency.clone(),
        };
        tracing::debug!(%symbol, bet = ?intent.bet, stake = %intent.stake, "Placing order");

        let venue = Arc::clone(&self.venue);
        let tx = self.loop_tx.clone();
        tokio::spawn(async move {
            let result = venue.place_order(&order).await;
            let _ = tx.send(LoopEvent::Placed {
                symbol: order.symbol,
                result,
            });
        });
    }

    /// Order accepted; the engine moves to Open
    fn on_accepted(&mut self, symbol: &str, contract_id: ContractId, simulated: bool) -> bool {
        let Some(order) = self
            .store
            .get_mut(symbol)
            .and_then(|e| e.on_placed(contract_id))
        else {
            return false;
        };

        self.stats.record_trade(symbol);
        telemetry::record_trade(symbol);
        self.sink.emit(SessionEvent::TradeStarted {
            symbol: symbol.to_string(),
            contract_id,
            bet: order.bet,
            stake: order.stake,
            simulated,
        });
        true
    }

    fn on_loop_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Placed { symbol, result } => self.on_placed(&symbol, result),
            LoopEvent::OrderSubscribed {
                symbol,
                contract_id,
                generation,
                result,
            } => self.on_order_subscribed(&symbol, contract_id, generation, result),
            LoopEvent::TickSubscribed {
                symbol,
                generation,
                result,
            } => match result {
                Ok(id) if generation == self.generation => {
                    tracing::info!(%symbol, subscription = %id, "Tick stream restored");
                    self.tick_subscriptions.insert(symbol, id);
                }
                Ok(id) => {
                    tracing::debug!(%symbol, "Stale tick subscription dropped");
                    self.forget(id);
                }
                Err(e) => tracing::error!(%symbol, error = %e, "Tick resubscription failed"),
            },
            LoopEvent::SimulatedDraw { symbol, fill } => {
                if let Some(simulator) = self.simulator.as_mut() {
                    let update = simulator.settle(&fill);
                    self.on_contract_update(&symbol, &update);
                }
            }
            LoopEvent::Balance(Ok(balance)) => {
                self.stats.set_balance(balance);
                telemetry::set_gauge_decimal(GaugeMetric::Balance, balance);
            }
            LoopEvent::Balance(Err(e)) => tracing::warn!(error = %e, "Balance query failed"),
        }
    }

    fn on_placed(&mut self, symbol: &str, result: Result<Placement, TransportError>) {
        let placement = match result {
            Ok(placement) => placement,
            Err(e) => {
                tracing::warn!(%symbol, error = %e, "Order placement failed");
                if let Some(engine) = self.store.get_mut(symbol) {
                    engine.on_placement_failed();
                }
                return;
            }
        };

        if !self.on_accepted(symbol, placement.contract_id, false) {
            return;
        }
        if let Some(balance) = placement.balance_after {
            self.stats.set_balance(balance);
            telemetry::set_gauge_decimal(GaugeMetric::Balance, balance);
        }
        self.subscribe_order(symbol, placement.contract_id);
    }

    fn subscribe_order(&self, symbol: &str, contract_id: ContractId) {
        let venue = Arc::clone(&self.venue);
        let tx = self.loop_tx.clone();
        let symbol = symbol.to_string();
        let generation = self.generation;
        tokio::spawn(async move {
            let mut attempt = 1;
            let result = loop {
                match venue.subscribe_order_updates(contract_id).await {
                    Err(e) if e != TransportError::Disconnected && attempt < ORDER_SUBSCRIBE_ATTEMPTS => {
                        tracing::warn!(contract_id, attempt, error = %e, "Order subscription failed, retrying");
                        attempt += 1;
                    }
                    result => break result,
                }
            };
            let _ = tx.send(LoopEvent::OrderSubscribed {
                symbol,
                contract_id,
                generation,
                result,
            });
        });
    }

    fn on_order_subscribed(
        &mut self,
        symbol: &str,
        contract_id: ContractId,
        generation: u64,
        result: Result<OrderSubscription, TransportError>,
    ) {
        let subscription = match result {
            Ok(subscription) => subscription,
            Err(TransportError::Disconnected) => {
                // Resubscribed with the rest once the connection is back
                tracing::warn!(%symbol, contract_id, "Order subscription interrupted by disconnect");
                return;
            }
            Err(e) => {
                tracing::error!(%symbol, contract_id, error = %e, "Order update subscription failed");
                if generation == self.generation {
                    if let Some(engine) = self.store.get_mut(symbol) {
                        engine.on_tracking_lost(contract_id);
                    }
                }
                return;
            }
        };

        let owned = self.store.get(symbol).is_some_and(|e| e.owns(contract_id));
        if let Some(id) = subscription.subscription_id {
            if generation != self.generation {
                tracing::debug!(contract_id, "Stale order subscription dropped");
                self.forget(id);
            } else if owned {
                self.order_subscriptions.insert(contract_id, id);
            } else {
                // Settled before the subscription was confirmed
                self.forget(id);
            }
        }

        if let Some(snapshot) = subscription.snapshot {
            self.on_contract_update(symbol, &snapshot);
        }
    }

    fn on_contract_update(&mut self, symbol: &str, update: &ContractUpdate) {
        let Some(engine) = self.store.get_mut(symbol) else {
            return;
        };

        match engine.on_contract_update(update) {
            ContractEvent::Ignored => {}
            ContractEvent::Predicted {
                contract_id,
                outcome,
            } => {
                tracing::debug!(%symbol, contract_id, ?outcome, "Early prediction");
                telemetry::record_prediction(outcome);
                let losses = engine.loss_count();
                if let Some(reason) = self.limits.check_losses(symbol, losses) {
                    self.halt_on(reason);
                }
            }
            ContractEvent::Settled(settlement) => self.on_settled(settlement),
        }
    }

    fn on_settled(&mut self, settlement: Settlement) {
        self.stats.record_settlement(&settlement);
        telemetry::record_settlement(&settlement.symbol, settlement.outcome);
        telemetry::set_gauge_decimal(GaugeMetric::CumulativeProfit, self.stats.cumulative_profit);
        if settlement.prediction_diverged() {
            telemetry::record_prediction_divergence();
        }

        match settlement.balance_after {
            Some(balance) => telemetry::set_gauge_decimal(GaugeMetric::Balance, balance),
            None => self.query_balance(),
        }

        if let Some(id) = self.order_subscriptions.remove(&settlement.contract_id) {
            self.forget(id);
        }

        self.sink.emit(SessionEvent::TradeSettled {
            symbol: settlement.symbol.clone(),
            contract_id: settlement.contract_id,
            bet: settlement.bet,
            outcome: settlement.outcome,
            profit: settlement.profit,
            balance_after: settlement.balance_after,
        });
        self.sink.emit(SessionEvent::StatsSnapshot(self.stats.clone()));

        if let Some(reason) = self.limits.check(&self.store, self.stats.cumulative_profit) {
            self.halt_on(reason);
        }
    }

    fn halt_on(&mut self, reason: HaltReason) {
        if self.halt.is_none() {
            tracing::warn!(%reason, "Safety limit reached, shutting down");
            self.halt = Some(ShutdownReason::SafetyLimit(reason));
        }
    }

    fn query_balance(&self) {
        let venue = Arc::clone(&self.venue);
        let tx = self.loop_tx.clone();
        let account = self.config.connection.account.clone();
        tokio::spawn(async move {
            let result = venue.balance(&account).await;
            let _ = tx.send(LoopEvent::Balance(result));
        });
    }

    /// Best-effort unsubscribe
    fn forget(&self, subscription_id: SubscriptionId) {
        let venue = Arc::clone(&self.venue);
        tokio::spawn(async move {
            if let Err(e) = venue.unsubscribe(&subscription_id).await {
                tracing::debug!(subscription = %subscription_id, error = %e, "Unsubscribe failed");
            }
        });
    }

    /// Re-issue tick streams and open-order streams on the new connection
    fn replay_subscriptions(&self) {
        let generation = self.generation;
        for symbol in self.store.symbols() {
            let venue = Arc::clone(&self.venue);
            let tx = self.loop_tx.clone();
            let symbol = symbol.to_string();
            tokio::spawn(async move {
                let result = venue.subscribe_ticks(&symbol).await;
                let _ = tx.send(LoopEvent::TickSubscribed {
                    symbol,
                    generation,
                    result,
                });
            });
        }

        if self.simulated() {
            return;
        }
        for (symbol, contract_id) in self.store.open_contracts() {
            self.subscribe_order(&symbol, contract_id);
        }
    }

    async fn shutdown(mut self, reason: ShutdownReason) -> ShutdownSummary {
        tracing::info!(%reason, "Shutting down");

        let subscriptions: Vec<SubscriptionId> = self
            .tick_subscriptions
            .drain()
            .map(|(_, id)| id)
            .chain(self.order_subscriptions.drain().map(|(_, id)| id))
            .collect();
        let venue = &self.venue;
        let results = join_all(subscriptions.iter().map(|id| venue.unsubscribe(id))).await;
        for (id, result) in subscriptions.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(subscription = %id, error = %e, "Unsubscribe failed during shutdown");
            }
        }

        let final_balance = match &self.simulator {
            Some(simulator) => Some(simulator.balance()),
            None => match self.venue.balance(&self.config.connection.account).await {
                Ok(balance) => Some(balance),
                Err(e) => {
                    tracing::warn!(error = %e, "Final balance query failed");
                    self.stats.current_balance
                }
            },
        };
        if let Some(balance) = final_balance {
            self.stats.set_balance(balance);
        }

        let summary = ShutdownSummary {
            reason,
            initial_balance: self.stats.initial_balance,
            final_balance,
            total_profit: self.stats.cumulative_profit,
            total_trades: self.stats.total_trades,
            won: self.stats.won,
            lost: self.stats.lost,
            win_rate: self.stats.win_rate(),
            instruments: self.stats.instruments.clone(),
            simulated: self.simulated(),
        };
        self.sink.emit(SessionEvent::ShutdownSummary(summary.clone()));

        self.venue.disconnect().await;
        summary
    }
}
