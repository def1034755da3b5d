//! Integration tests for stream sessions against a local WebSocket server.
//!
//! Each test spawns a one-shot tokio-tungstenite server on an ephemeral port
//! and drives `TungsteniteConnector` through a real handshake.

use depthline_core::Subscription;
use depthline_ws::{
    ConnectionConfig, StreamConnector, StreamFrame, StreamTarget, TransportEvent,
    TungsteniteConnector, DEFAULT_HEARTBEAT,
};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const BOOK: &str = r#"{"book": {"exchange": "KRAKEN", "symbol": "BTC-USD",
    "book": {"bid": {"100": 2, "99": 3}, "ask": {"101": 1}}}}"#;

async fn spawn_server<F, Fut>(script: F) -> String
where
    F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept");
        let ws = tokio_tungstenite::accept_async(tcp).await.expect("handshake");
        script(ws).await;
    });
    format!("ws://{addr}")
}

fn target(base: &str) -> StreamTarget {
    StreamTarget::new(base, Subscription::new("kraken", "BTC/USD").expect("subscription"))
}

async fn next_event(rx: &mut tokio::sync::mpsc::Receiver<TransportEvent>) -> Option<TransportEvent> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within 5s")
}

#[tokio::test]
async fn test_session_forwards_frames_until_close() {
    let base = spawn_server(|mut ws| async move {
        ws.send(Message::Text("heartbeat".to_string())).await.expect("send");
        ws.send(Message::Text(BOOK.to_string())).await.expect("send");
        ws.close(None).await.expect("close");
        while ws.next().await.is_some() {}
    })
    .await;

    let connector = TungsteniteConnector::new(ConnectionConfig::default());
    let mut rx = connector.open(&target(&base), CancellationToken::new());

    assert_eq!(next_event(&mut rx).await, Some(TransportEvent::Opened));

    let Some(TransportEvent::Frame(hb)) = next_event(&mut rx).await else {
        panic!("Expected heartbeat frame");
    };
    assert!(StreamFrame::classify(&hb, DEFAULT_HEARTBEAT).is_heartbeat());

    let Some(TransportEvent::Frame(book)) = next_event(&mut rx).await else {
        panic!("Expected book frame");
    };
    let StreamFrame::Book(envelope) = StreamFrame::classify(&book, DEFAULT_HEARTBEAT) else {
        panic!("Expected book update");
    };
    assert!(envelope.matches(&Subscription::new("kraken", "BTC/USD").expect("subscription")));

    let terminal = next_event(&mut rx).await.expect("terminal event");
    assert!(terminal.is_terminal(), "got {terminal:?}");
}

#[tokio::test]
async fn test_session_idle_timeout() {
    let base = spawn_server(|mut ws| async move {
        // Keep the socket open without sending anything.
        while ws.next().await.is_some() {}
    })
    .await;

    let config = ConnectionConfig {
        idle_timeout_ms: 200,
        ..ConnectionConfig::default()
    };
    let connector = TungsteniteConnector::new(config);
    let mut rx = connector.open(&target(&base), CancellationToken::new());

    assert_eq!(next_event(&mut rx).await, Some(TransportEvent::Opened));
    match next_event(&mut rx).await {
        Some(TransportEvent::Error(msg)) => assert!(msg.contains("No frame received"), "{msg}"),
        other => panic!("Expected idle timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_session_connect_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let connector = TungsteniteConnector::new(ConnectionConfig::default());
    let mut rx = connector.open(&target(&format!("ws://{addr}")), CancellationToken::new());

    assert!(matches!(next_event(&mut rx).await, Some(TransportEvent::Error(_))));
    assert_eq!(next_event(&mut rx).await, None);
}

#[tokio::test]
async fn test_session_cancel_ends_silently() {
    let base = spawn_server(|mut ws| async move {
        while ws.next().await.is_some() {}
    })
    .await;

    let connector = TungsteniteConnector::new(ConnectionConfig::default());
    let cancel = CancellationToken::new();
    let mut rx = connector.open(&target(&base), cancel.clone());

    assert_eq!(next_event(&mut rx).await, Some(TransportEvent::Opened));
    cancel.cancel();
    assert_eq!(next_event(&mut rx).await, None);
}
