//! WebSocket Gateway Integration Tests
//!
//! Runs the gateway on an ephemeral port and talks to it with a real
//! WebSocket client.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use portfolio_alerts::infrastructure::gateway;
use portfolio_alerts::{
    AlertDeliveryPort, ClientRegistry, GatewayState, PriceAlert, Symbol, UserId,
    WebSocketAlertDelivery,
};
use rust_decimal::Decimal;

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct Gateway {
    url: String,
    registry: Arc<ClientRegistry>,
    cancel: CancellationToken,
}

async fn start_gateway() -> Gateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = Arc::new(ClientRegistry::new());
    let cancel = CancellationToken::new();
    let state = Arc::new(GatewayState::new(Arc::clone(&registry), 8, cancel.clone()));

    tokio::spawn(gateway::serve(listener, state));

    Gateway {
        url: format!("ws://{addr}/ws"),
        registry,
        cancel,
    }
}

async fn connect(url: &str) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    client
}

async fn register(client: &mut Client, user: &str) {
    let frame = serde_json::json!({ "event": "registerUser", "userID": user }).to_string();
    client.send(Message::text(frame)).await.unwrap();
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn next_text(client: &mut Client) -> String {
    let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("no frame received")
        .unwrap()
        .unwrap();
    msg.to_text().unwrap().to_string()
}

fn alert() -> PriceAlert {
    PriceAlert {
        symbol: Symbol::new("AAPL"),
        previous: Decimal::ONE_HUNDRED,
        current: Decimal::new(10020, 2),
        change_pct: Decimal::new(20, 2),
    }
}

#[tokio::test]
async fn registered_user_receives_alert_json() {
    let gw = start_gateway().await;
    let alice = UserId::new("alice");
    let mut client = connect(&gw.url).await;

    register(&mut client, "alice").await;
    wait_until(|| gw.registry.is_online(&alice)).await;

    let handle = gw.registry.lookup(&alice).unwrap();
    WebSocketAlertDelivery
        .deliver(&handle, &alert().payload())
        .await
        .unwrap();

    let json: serde_json::Value = serde_json::from_str(&next_text(&mut client).await).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "message": "AAPL price has changed by +0.20%! New price: $100.20" })
    );

    gw.cancel.cancel();
}

#[tokio::test]
async fn malformed_frames_do_not_register() {
    let gw = start_gateway().await;
    let mut client = connect(&gw.url).await;

    client.send(Message::text("not json")).await.unwrap();
    client
        .send(Message::text(r#"{"event":"subscribe","userID":"alice"}"#))
        .await
        .unwrap();
    register(&mut client, "").await;
    register(&mut client, "bob").await;

    wait_until(|| gw.registry.is_online(&UserId::new("bob"))).await;
    assert_eq!(gw.registry.online_count(), 1);
    assert!(!gw.registry.is_online(&UserId::new("alice")));

    gw.cancel.cancel();
}

#[tokio::test]
async fn closing_socket_takes_user_offline() {
    let gw = start_gateway().await;
    let alice = UserId::new("alice");
    let mut client = connect(&gw.url).await;

    register(&mut client, "alice").await;
    wait_until(|| gw.registry.is_online(&alice)).await;

    client.close(None).await.unwrap();
    wait_until(|| !gw.registry.is_online(&alice)).await;
    assert_eq!(gw.registry.online_count(), 0);

    gw.cancel.cancel();
}

#[tokio::test]
async fn stale_close_keeps_newer_connection() {
    let gw = start_gateway().await;
    let alice = UserId::new("alice");

    let mut first = connect(&gw.url).await;
    register(&mut first, "alice").await;
    wait_until(|| gw.registry.is_online(&alice)).await;
    let first_handle = gw.registry.lookup(&alice).unwrap();

    let mut second = connect(&gw.url).await;
    register(&mut second, "alice").await;
    wait_until(|| gw.registry.lookup(&alice).is_some_and(|h| h != first_handle)).await;

    first.close(None).await.unwrap();
    drop(first);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(gw.registry.is_online(&alice));
    let handle = gw.registry.lookup(&alice).unwrap();
    WebSocketAlertDelivery
        .deliver(&handle, &alert().payload())
        .await
        .unwrap();
    assert!(next_text(&mut second).await.contains("AAPL"));

    gw.cancel.cancel();
}
