//! Integration tests for the WebSocket transport against a local server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use electrumrpc_core::error::TransportError;
use electrumrpc_core::transport::{Transport, TransportEvent};
use electrumrpc_ws::{WsConfig, WsTransport};

const WAIT: Duration = Duration::from_secs(5);

async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

#[tokio::test]
async fn frames_are_forwarded_whole() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        let request = match ws.next().await {
            Some(Ok(Message::Text(text))) => text.to_string(),
            other => panic!("unexpected frame {other:?}"),
        };
        ws.send(Message::Text(r#"{"id":"1","result":"pong"}"#.to_string().into()))
            .await
            .unwrap();
        ws.send(Message::Text(
            r#"{"method":"blockchain.headers.subscribe","params":[{"height":1}]}"#
                .to_string()
                .into(),
        ))
        .await
        .unwrap();
        ws.close(None).await.unwrap();
        request
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut transport = WsTransport::new(WsConfig::new("127.0.0.1", port, None), tx);
    transport.initialize().await.unwrap();
    assert!(transport.is_connected());
    assert!(matches!(next_event(&mut rx).await, TransportEvent::Connect));

    transport
        .send("{\"jsonrpc\":\"2.0\",\"method\":\"server.ping\",\"params\":[],\"id\":\"1\"}\n")
        .await
        .unwrap();

    match next_event(&mut rx).await {
        TransportEvent::Message(body) => assert_eq!(body, r#"{"id":"1","result":"pong"}"#),
        other => panic!("expected message, got {other:?}"),
    }
    match next_event(&mut rx).await {
        TransportEvent::Message(body) => assert!(body.contains("blockchain.headers.subscribe")),
        other => panic!("expected message, got {other:?}"),
    }
    assert!(matches!(next_event(&mut rx).await, TransportEvent::End));
    assert!(matches!(next_event(&mut rx).await, TransportEvent::Close));
    assert!(!transport.is_connected());

    let request = server.await.unwrap();
    assert!(request.contains("\"server.ping\""));
}

#[tokio::test]
async fn send_before_initialize_is_rejected() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut transport = WsTransport::new(WsConfig::new("127.0.0.1", 1, None), tx);
    assert!(matches!(
        transport.send("{}\n").await,
        Err(TransportError::NotConnected)
    ));
}

#[tokio::test]
async fn handshake_against_non_websocket_peer_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
    });

    let (tx, _rx) = mpsc::unbounded_channel();
    let mut transport = WsTransport::new(WsConfig::new("127.0.0.1", port, None), tx);
    let err = transport.initialize().await.unwrap_err();
    assert!(matches!(err, TransportError::WebSocket(_)), "unexpected error: {err}");
    assert!(!transport.is_connected());
    transport.close().await;
}
