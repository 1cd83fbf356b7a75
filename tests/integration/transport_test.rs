//! RPC client against a local WebSocket venue

use crate::common::{next_request, reply, req_id, spawn_venue};
use parity_hft::dispatch::{classify, Push};
use parity_hft::protocol::Request;
use parity_hft::transport::{RpcClient, TransportConfig, TransportError, TransportEvent, VenueApi};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn fast_config(url: String) -> TransportConfig {
    TransportConfig::new(url)
        .request_timeout(Duration::from_millis(300))
        .max_reconnects(2)
        .backoff(Duration::from_millis(10), Duration::from_millis(40))
}

async fn next_event(events: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no transport event")
        .expect("event stream closed")
}

#[tokio::test]
async fn test_out_of_order_responses_are_correlated() {
    let url = spawn_venue(|mut ws, _| async move {
        let first = next_request(&mut ws).await.unwrap();
        let second = next_request(&mut ws).await.unwrap();
        // Answer in reverse order
        for request in [second, first] {
            let symbol = request["ticks"].as_str().unwrap().to_string();
            reply(
                &mut ws,
                json!({
                    "msg_type": "ticks",
                    "req_id": req_id(&request),
                    "subscription": {"id": format!("sub-{}", symbol)}
                }),
            )
            .await;
        }
        while next_request(&mut ws).await.is_some() {}
    })
    .await;

    let (client, _events) = RpcClient::connect(fast_config(url)).await.unwrap();
    let (a, b) = tokio::join!(client.subscribe_ticks("R_10"), client.subscribe_ticks("R_50"));
    assert_eq!(a.unwrap(), "sub-R_10");
    assert_eq!(b.unwrap(), "sub-R_50");
    client.close().await;
}

#[tokio::test]
async fn test_timeout_affects_only_its_request() {
    let url = spawn_venue(|mut ws, _| async move {
        while let Some(request) = next_request(&mut ws).await {
            // Balance requests are never answered
            if request.get("ticks").is_some() {
                reply(
                    &mut ws,
                    json!({"msg_type": "ticks", "req_id": req_id(&request), "subscription": {"id": "s1"}}),
                )
                .await;
            }
        }
    })
    .await;

    let (client, _events) = RpcClient::connect(fast_config(url)).await.unwrap();
    let (balance, ticks) = tokio::join!(client.balance("current"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.subscribe_ticks("R_100").await
    });
    assert!(matches!(balance, Err(TransportError::Timeout { .. })));
    assert_eq!(ticks.unwrap(), "s1");
    client.close().await;
}

#[tokio::test]
async fn test_late_response_after_timeout_is_a_push() {
    let url = spawn_venue(|mut ws, _| async move {
        let request = next_request(&mut ws).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        reply(
            &mut ws,
            json!({"msg_type": "balance", "req_id": req_id(&request), "balance": {"balance": 10.0, "currency": "USD"}}),
        )
        .await;
        while next_request(&mut ws).await.is_some() {}
    })
    .await;

    let (client, mut events) = RpcClient::connect(fast_config(url)).await.unwrap();
    let result = client.balance("current").await;
    assert!(matches!(result, Err(TransportError::Timeout { .. })));

    // The expired id no longer resolves anything
    match next_event(&mut events).await {
        TransportEvent::Push(value) => assert_eq!(value["msg_type"], "balance"),
        other => panic!("unexpected event {:?}", other),
    }
    client.close().await;
}

#[tokio::test]
async fn test_remote_error_rejects_request() {
    let url = spawn_venue(|mut ws, _| async move {
        let request = next_request(&mut ws).await.unwrap();
        reply(
            &mut ws,
            json!({
                "msg_type": "authorize",
                "req_id": req_id(&request),
                "error": {"code": "InvalidToken", "message": "The token is invalid."}
            }),
        )
        .await;
        while next_request(&mut ws).await.is_some() {}
    })
    .await;

    let (client, _events) = RpcClient::connect(fast_config(url)).await.unwrap();
    let err = client.authorize("bad-token").await.unwrap_err();
    assert_eq!(
        err,
        TransportError::Remote {
            code: "InvalidToken".to_string(),
            message: "The token is invalid.".to_string()
        }
    );
    client.close().await;
}

#[tokio::test]
async fn test_pushes_are_forwarded() {
    let url = spawn_venue(|mut ws, _| async move {
        let request = next_request(&mut ws).await.unwrap();
        reply(
            &mut ws,
            json!({"msg_type": "tick", "req_id": req_id(&request), "subscription": {"id": "t-1"},
                   "tick": {"symbol": "R_100", "quote": 812.34, "pip_size": 2, "epoch": 1}}),
        )
        .await;
        reply(
            &mut ws,
            json!({"msg_type": "tick", "req_id": req_id(&request), "subscription": {"id": "t-1"},
                   "tick": {"symbol": "R_100", "quote": 812.37, "pip_size": 2, "epoch": 2}}),
        )
        .await;
        while next_request(&mut ws).await.is_some() {}
    })
    .await;

    let (client, mut events) = RpcClient::connect(fast_config(url)).await.unwrap();
    assert_eq!(client.subscribe_ticks("R_100").await.unwrap(), "t-1");

    // Subsequent messages reuse the req_id but nothing is pending for it
    let TransportEvent::Push(value) = next_event(&mut events).await else {
        panic!("expected push");
    };
    let Push::Tick(tick) = classify(&value) else {
        panic!("expected tick");
    };
    assert_eq!(tick.last_digit(), Some(7));
    client.close().await;
}

#[tokio::test]
async fn test_reconnect_replays_authorization() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let url = spawn_venue(move |mut ws, index| {
        let seen_tx = seen_tx.clone();
        async move {
            let request = next_request(&mut ws).await.unwrap();
            let _ = seen_tx.send((index, request.clone()));
            reply(
                &mut ws,
                json!({"msg_type": "authorize", "req_id": req_id(&request),
                       "authorize": {"loginid": "VRTC1", "balance": 100.0, "currency": "USD"}}),
            )
            .await;
            if index == 0 {
                // Drop the first connection right after authorizing
                return;
            }
            while next_request(&mut ws).await.is_some() {}
        }
    })
    .await;

    let (client, mut events) = RpcClient::connect(fast_config(url)).await.unwrap();
    let account = client.authorize("secret").await.unwrap();
    assert_eq!(account.loginid, "VRTC1");

    match next_event(&mut events).await {
        TransportEvent::Reconnecting { attempt, delay } => {
            assert_eq!(attempt, 1);
            assert_eq!(delay, Duration::from_millis(20));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(next_event(&mut events).await, TransportEvent::Reconnected));

    let (_, first) = seen_rx.recv().await.unwrap();
    let (index, replayed) = seen_rx.recv().await.unwrap();
    assert_eq!(index, 1);
    assert_eq!(first["authorize"], "secret");
    assert_eq!(replayed["authorize"], "secret");
    client.close().await;
}

#[tokio::test]
async fn test_in_flight_requests_fail_on_disconnect() {
    let url = spawn_venue(|mut ws, index| async move {
        if index == 0 {
            // Read the request, then vanish
            let _ = next_request(&mut ws).await;
            return;
        }
        while next_request(&mut ws).await.is_some() {}
    })
    .await;

    let (client, _events) = RpcClient::connect(fast_config(url)).await.unwrap();
    let result = timeout(Duration::from_secs(1), client.send(&Request::balance("current")))
        .await
        .expect("request hung after disconnect");
    assert_eq!(result, Err(TransportError::Disconnected));
    client.close().await;
}

#[tokio::test]
async fn test_reconnect_gives_up_after_max_attempts() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        // Listener and socket both go away
        drop(listener);
        drop(ws);
    });

    let (_client, mut events) = RpcClient::connect(fast_config(url)).await.unwrap();
    let mut attempts = Vec::new();
    loop {
        match next_event(&mut events).await {
            TransportEvent::Reconnecting { attempt, .. } => attempts.push(attempt),
            TransportEvent::Fatal(e) => {
                assert_eq!(e, TransportError::MaxReconnectsExceeded);
                break;
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(attempts, vec![1, 2]);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let url = spawn_venue(|mut ws, _| async move { while next_request(&mut ws).await.is_some() {} }).await;

    let (client, mut events) = RpcClient::connect(fast_config(url)).await.unwrap();
    client.close().await;
    client.close().await;
    assert!(matches!(next_event(&mut events).await, TransportEvent::Closed));

    let result = client.balance("current").await;
    assert_eq!(result, Err(TransportError::Disconnected));
}

#[tokio::test]
async fn test_initial_connect_failure() {
    let result = RpcClient::connect(fast_config("ws://127.0.0.1:1".to_string())).await;
    assert!(matches!(result, Err(TransportError::Connection(_))));
}
