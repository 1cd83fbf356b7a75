//! Session orchestration against a scripted venue

use crate::common::{test_config, MockVenue};
use parity_hft::config::{Config, ValidationError};
use parity_hft::session::{
    self, ChannelSink, HaltReason, Session, SessionError, SessionEvent, ShutdownReason,
    ShutdownSummary,
};
use parity_hft::strategy::{BetType, Outcome};
use parity_hft::transport::{TransportError, TransportEvent};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

struct Harness {
    venue: Arc<MockVenue>,
    transport: mpsc::Sender<TransportEvent>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<ShutdownSummary, SessionError>>,
}

impl Harness {
    fn start(config: Config) -> Self {
        let venue = Arc::new(MockVenue::new());
        let (sink, events) = ChannelSink::new();
        let (transport, transport_rx) = mpsc::channel(64);
        let (stop, stop_rx) = oneshot::channel::<()>();

        let session = Session::new(config, venue.clone(), Arc::new(sink)).unwrap();
        let handle = tokio::spawn(session.run(transport_rx, async move {
            let _ = stop_rx.await;
        }));

        Self {
            venue,
            transport,
            events,
            stop: Some(stop),
            handle,
        }
    }

    async fn push(&self, value: Value) {
        let _ = self.transport.send(TransportEvent::Push(value)).await;
    }

    async fn tick(&self, quote: f64) {
        self.push(json!({
            "msg_type": "tick",
            "tick": {"symbol": "R_100", "quote": quote, "pip_size": 2, "epoch": 1}
        }))
        .await;
    }

    async fn contract(&self, body: Value) {
        self.push(json!({"msg_type": "proposal_open_contract", "proposal_open_contract": body}))
            .await;
    }

    async fn next_event(&mut self) -> SessionEvent {
        timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("no session event")
            .expect("sink closed")
    }

    /// Next event other than a stats snapshot
    async fn next_trade_event(&mut self) -> SessionEvent {
        loop {
            match self.next_event().await {
                SessionEvent::StatsSnapshot(_) => continue,
                event => return event,
            }
        }
    }

    async fn finish(mut self) -> (ShutdownSummary, Arc<MockVenue>) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let summary = timeout(Duration::from_secs(2), self.handle)
            .await
            .expect("session did not stop")
            .unwrap()
            .unwrap();
        (summary, self.venue)
    }
}

fn simulated(win_probability: f64) -> Config {
    let mut config = test_config();
    config.simulation.enabled = true;
    config.simulation.win_probability = win_probability;
    config
}

#[tokio::test]
async fn test_live_settlement_round_trip() {
    let mut h = Harness::start(test_config());

    // Even digit with threshold 1 bets odd at the first stake
    h.tick(100.02).await;
    let SessionEvent::TradeStarted {
        contract_id,
        bet,
        stake,
        simulated,
        ..
    } = h.next_trade_event().await
    else {
        panic!("expected trade start");
    };
    assert_eq!((contract_id, bet, stake, simulated), (1, BetType::BetOdd, dec!(0.35), false));

    h.contract(json!({
        "contract_id": 1, "status": "won", "is_sold": 1,
        "profit": 0.33, "balance_after": 1000.33
    }))
    .await;
    let SessionEvent::TradeSettled {
        outcome,
        profit,
        balance_after,
        ..
    } = h.next_trade_event().await
    else {
        panic!("expected settlement");
    };
    assert_eq!(outcome, Outcome::Won);
    assert_eq!(profit, dec!(0.33));
    assert_eq!(balance_after, Some(dec!(1000.33)));

    let SessionEvent::StatsSnapshot(stats) = h.next_event().await else {
        panic!("expected stats snapshot");
    };
    assert_eq!(stats.current_balance, Some(dec!(1000.33)));
    assert_eq!(stats.total_trades, 1);

    h.venue.set_balance(dec!(1000.33));
    let (summary, venue) = h.finish().await;
    assert_eq!(summary.reason, ShutdownReason::Signal);
    assert_eq!(summary.initial_balance, Some(dec!(1000)));
    assert_eq!(summary.final_balance, Some(dec!(1000.33)));
    assert_eq!(summary.total_profit, dec!(0.33));
    assert_eq!((summary.won, summary.lost), (1, 0));
    assert!((summary.win_rate - 1.0).abs() < f64::EPSILON);

    let calls = venue.calls();
    assert_eq!(calls[0], "authorize:test-token");
    assert!(calls.contains(&"buy:R_100:BetOdd:0.35".to_string()));
    assert!(calls.contains(&"forget:tick-R_100-1".to_string()));
    assert!(calls.contains(&"balance:current".to_string()));
    assert_eq!(calls.last().map(String::as_str), Some("disconnect"));
}

#[tokio::test]
async fn test_missing_settlement_balance_is_queried() {
    let mut h = Harness::start(test_config());
    h.tick(100.02).await;
    assert!(matches!(h.next_trade_event().await, SessionEvent::TradeStarted { .. }));

    h.venue.set_balance(dec!(999.65));
    h.contract(json!({"contract_id": 1, "status": "lost", "is_sold": 1, "profit": -0.35}))
        .await;
    assert!(matches!(
        h.next_trade_event().await,
        SessionEvent::TradeSettled {
            balance_after: None,
            ..
        }
    ));
    h.venue.wait_for("balance:", 1).await;
}

#[tokio::test]
async fn test_predicted_loss_arms_next_trade() {
    let mut h = Harness::start(test_config());

    h.tick(100.02).await;
    assert!(matches!(
        h.next_trade_event().await,
        SessionEvent::TradeStarted { contract_id: 1, bet: BetType::BetOdd, .. }
    ));

    // Intermediate tick ends on an even digit: the odd bet is predicted lost
    h.contract(json!({
        "contract_id": 1, "status": "open", "is_sold": 0,
        "tick_stream": [{"epoch": 2, "tick": 100.04, "tick_display_value": "100.04"}]
    }))
    .await;

    // The very next tick trades the opposite bet at the next stake
    h.tick(100.05).await;
    let SessionEvent::TradeStarted {
        contract_id,
        bet,
        stake,
        ..
    } = h.next_trade_event().await
    else {
        panic!("expected second trade");
    };
    assert_eq!((contract_id, bet, stake), (2, BetType::BetEven, dec!(0.69)));

    // Settlement agrees with the prediction; counted once
    h.contract(json!({
        "contract_id": 1, "status": "lost", "is_sold": 1, "profit": -0.35, "balance_after": 999.65
    }))
    .await;
    assert!(matches!(
        h.next_trade_event().await,
        SessionEvent::TradeSettled { contract_id: 1, outcome: Outcome::Lost, .. }
    ));

    let (summary, _) = h.finish().await;
    assert_eq!(summary.total_trades, 2);
    assert_eq!(summary.lost, 1);
}

#[tokio::test]
async fn test_placement_failure_is_not_a_loss() {
    let h = Harness::start(test_config());
    h.venue.fail_placements.store(true, Ordering::SeqCst);

    h.tick(100.02).await;
    h.venue.wait_for("buy:", 1).await;
    // Let the rejection reach the engine before the next tick
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.tick(100.03).await;
    h.venue.wait_for("buy:", 2).await;

    let (summary, venue) = h.finish().await;
    // Both attempts stake the first table entry
    let buys: Vec<String> = venue.calls().into_iter().filter(|c| c.starts_with("buy:")).collect();
    assert_eq!(buys, vec!["buy:R_100:BetOdd:0.35", "buy:R_100:BetEven:0.35"]);
    assert_eq!(summary.total_trades, 0);
}

#[tokio::test]
async fn test_untracked_order_releases_instrument() {
    let mut h = Harness::start(test_config());
    h.venue.fail_order_subscriptions.store(true, Ordering::SeqCst);

    for (n, quote) in [100.02, 100.03, 100.04].into_iter().enumerate() {
        h.tick(quote).await;
        assert!(matches!(h.next_trade_event().await, SessionEvent::TradeStarted { .. }));
        // Every retry is spent before the instrument counts again
        h.venue.wait_for(&format!("poc:{}", n + 1), 3).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let (summary, venue) = h.finish().await;
    assert_eq!(venue.count("buy:"), 3);
    assert_eq!(summary.total_trades, 3);
    // No settlement seen, so no loss was counted: every stake is the first entry
    assert!(venue
        .calls()
        .iter()
        .filter(|c| c.starts_with("buy:"))
        .all(|c| c.ends_with(":0.35")));
}

#[tokio::test]
async fn test_simulation_never_places_orders() {
    let mut h = Harness::start(simulated(1.0));

    h.tick(100.02).await;
    let SessionEvent::TradeStarted { simulated, stake, .. } = h.next_trade_event().await else {
        panic!("expected trade start");
    };
    assert!(simulated);
    assert_eq!(stake, dec!(0.35));

    let SessionEvent::TradeSettled {
        outcome,
        profit,
        balance_after,
        ..
    } = h.next_trade_event().await
    else {
        panic!("expected settlement");
    };
    assert_eq!(outcome, Outcome::Won);
    assert_eq!(profit, dec!(0.3325));
    assert_eq!(balance_after, Some(dec!(1000.3325)));

    let (summary, venue) = h.finish().await;
    assert!(summary.simulated);
    assert_eq!(summary.final_balance, Some(dec!(1000.3325)));
    assert_eq!(venue.count("buy:"), 0);
    assert_eq!(venue.count("poc:"), 0);
    assert_eq!(venue.count("balance:"), 0);
}

#[tokio::test]
async fn test_consecutive_loss_limit_stops_before_sixth_trade() {
    let mut config = simulated(0.0);
    config.risk.max_consecutive_losses = Some(5);
    let mut h = Harness::start(config);

    let mut stakes = Vec::new();
    for i in 0u8..5 {
        h.tick(100.02 + f64::from(i) * 0.01).await;
        match h.next_trade_event().await {
            SessionEvent::TradeStarted { stake, .. } => stakes.push(stake),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            h.next_trade_event().await,
            SessionEvent::TradeSettled { outcome: Outcome::Lost, .. }
        ));
    }
    assert_eq!(
        stakes,
        vec![dec!(0.35), dec!(0.69), dec!(1.39), dec!(2.84), dec!(5.8)]
    );

    // The session halts on its own; further ticks are never traded
    h.tick(100.09).await;
    let summary = timeout(Duration::from_secs(2), h.handle)
        .await
        .expect("session did not halt")
        .unwrap()
        .unwrap();
    assert_eq!(
        summary.reason,
        ShutdownReason::SafetyLimit(HaltReason::MaxConsecutiveLosses {
            symbol: "R_100".to_string(),
            losses: 5
        })
    );
    assert_eq!(summary.total_trades, 5);
    assert_eq!(summary.lost, 5);
    assert_eq!(summary.total_profit, dec!(-11.07));
    let final_balance = summary.final_balance.unwrap_or(Decimal::ZERO);
    assert_eq!(final_balance, dec!(988.93));
}

#[tokio::test]
async fn test_daily_loss_limit() {
    let mut config = simulated(0.0);
    config.risk.max_daily_loss = Some(dec!(-1));
    let mut h = Harness::start(config);

    for quote in [100.02, 100.03] {
        h.tick(quote).await;
        assert!(matches!(h.next_trade_event().await, SessionEvent::TradeStarted { .. }));
        assert!(matches!(h.next_trade_event().await, SessionEvent::TradeSettled { .. }));
    }

    // -0.35 - 0.69 = -1.04 <= -1
    let summary = timeout(Duration::from_secs(2), h.handle).await.unwrap().unwrap().unwrap();
    assert!(matches!(
        summary.reason,
        ShutdownReason::SafetyLimit(HaltReason::MaxDailyLoss { .. })
    ));
    assert_eq!(summary.total_trades, 2);
}

#[tokio::test]
async fn test_reconnect_replays_subscriptions() {
    let mut h = Harness::start(test_config());
    h.tick(100.02).await;
    assert!(matches!(h.next_trade_event().await, SessionEvent::TradeStarted { contract_id: 1, .. }));
    h.venue.wait_for("poc:1", 1).await;

    h.transport
        .send(TransportEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(2),
        })
        .await
        .unwrap();
    h.transport.send(TransportEvent::Reconnected).await.unwrap();

    h.venue.wait_for("ticks:R_100", 2).await;
    h.venue.wait_for("poc:1", 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (_, venue) = h.finish().await;
    let calls = venue.calls();
    // Only the subscriptions made on the new connection are forgotten
    assert!(!calls.contains(&"forget:tick-R_100-1".to_string()));
    assert!(calls.iter().any(|c| c.starts_with("forget:tick-R_100-") && c != "forget:tick-R_100-1"));
}

#[tokio::test]
async fn test_stale_order_subscription_is_forgotten() {
    let mut h = Harness::start(test_config());
    h.venue.order_subscription_delay_ms.store(100, Ordering::SeqCst);

    h.tick(100.02).await;
    assert!(matches!(h.next_trade_event().await, SessionEvent::TradeStarted { contract_id: 1, .. }));
    h.venue.wait_for("poc:1", 1).await;

    // Connection cycles while the first subscription is still outstanding
    h.transport
        .send(TransportEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(2),
        })
        .await
        .unwrap();
    h.transport.send(TransportEvent::Reconnected).await.unwrap();
    h.venue.wait_for("poc:1", 2).await;

    // The pre-reconnect answer is released without waiting for shutdown
    h.venue.wait_for("forget:poc-1-", 1).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.venue.count("forget:poc-1-"), 1);

    let (_, venue) = h.finish().await;
    // The replayed subscription is the one released at shutdown
    assert_eq!(venue.count("forget:poc-1-"), 2);
}

#[tokio::test]
async fn test_fatal_transport_ends_session() {
    let h = Harness::start(test_config());
    h.transport
        .send(TransportEvent::Fatal(TransportError::MaxReconnectsExceeded))
        .await
        .unwrap();

    let summary = timeout(Duration::from_secs(2), h.handle).await.unwrap().unwrap().unwrap();
    assert!(matches!(summary.reason, ShutdownReason::TransportLost(_)));
    assert_eq!(summary.total_trades, 0);
}

#[tokio::test]
async fn test_validation_precedes_connection() {
    let mut config = test_config();
    config.trading.symbols = vec!["frxEURUSD".to_string()];

    let err = Session::new(config.clone(), Arc::new(MockVenue::new()), Arc::new(ChannelSink::new().0))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        SessionError::Validation(ValidationError::DisallowedSymbol(_))
    ));

    // The endpoint is unreachable; validation must fail first
    let (sink, _rx) = ChannelSink::new();
    let err = session::run_session(config, Arc::new(sink), std::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));

    let mut config = test_config();
    config.trading.digit_threshold = 0;
    let (sink, _rx) = ChannelSink::new();
    let err = session::run_session(config, Arc::new(sink), std::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Validation(ValidationError::InvalidThreshold(0))
    ));
}
