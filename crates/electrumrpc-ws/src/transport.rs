//! WebSocket transport: `ws://` or `wss://`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};

use electrumrpc_core::error::TransportError;
use electrumrpc_core::net;
use electrumrpc_core::tls::{self, TlsOptions};
use electrumrpc_core::transport::{EventSender, Transport, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for a [`WsTransport`].
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub host: String,
    pub port: u16,
    /// `Some` for `wss://`, `None` for `ws://`.
    pub tls: Option<TlsOptions>,
    /// Bounds TCP connect plus the WebSocket (and TLS) handshake.
    pub connect_timeout: Duration,
}

impl WsConfig {
    pub fn new(host: impl Into<String>, port: u16, tls: Option<TlsOptions>) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn url(&self) -> String {
        let scheme = if self.tls.is_some() { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Message-based transport. Every inbound frame is forwarded as-is as a
/// [`TransportEvent::Message`].
pub struct WsTransport {
    config: WsConfig,
    url: String,
    events: EventSender,
    sink: Option<SplitSink<WsStream, Message>>,
    reader_task: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
}

impl WsTransport {
    pub fn new(config: WsConfig, events: EventSender) -> Self {
        let url = config.url();
        Self {
            config,
            url,
            events,
            sink: None,
            reader_task: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn open(config: &WsConfig, url: &str) -> Result<WsStream, TransportError> {
        let timeout = config.connect_timeout;
        let stream = net::dial(&config.host, config.port, timeout).await?;
        let connector = match &config.tls {
            Some(options) => Connector::Rustls(tls::client_config(options)?),
            None => Connector::Plain,
        };

        let handshake = tokio_tungstenite::client_async_tls_with_config(
            url,
            stream,
            None,
            Some(connector),
        );
        let (ws, _response) = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| TransportError::Timeout {
                ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        Ok(ws)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn initialize(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        let ws = Self::open(&self.config, &self.url).await?;
        let (sink, stream) = ws.split();
        self.sink = Some(sink);
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(url = %self.url, "connected via WebSocket");
        let _ = self.events.send(TransportEvent::Connect);

        self.reader_task = Some(tokio::spawn(read_loop(
            stream,
            self.events.clone(),
            Arc::clone(&self.connected),
        )));
        Ok(())
    }

    async fn send(&mut self, data: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let sink = self.sink.as_mut().ok_or(TransportError::NotConnected)?;
        sink.send(Message::Text(data.to_owned().into()))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }

    async fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(mut sink) = self.sink.take() {
            // sends a close frame
            let _ = sink.close().await;
            tracing::debug!(url = %self.url, "closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, events: EventSender, connected: Arc<AtomicBool>) {
    let failure = loop {
        match stream.next().await {
            None => break None,
            Some(Ok(Message::Text(text))) => {
                let _ = events.send(TransportEvent::Message(text.to_string()));
            }
            Some(Ok(Message::Binary(bytes))) => {
                let body = String::from_utf8_lossy(&bytes).into_owned();
                let _ = events.send(TransportEvent::Message(body));
            }
            Some(Ok(Message::Close(frame))) => {
                match frame {
                    Some(frame) => tracing::info!(
                        code = %frame.code,
                        reason = %frame.reason,
                        "websocket connection closed"
                    ),
                    None => tracing::info!("websocket connection closed"),
                }
                break None;
            }
            // ping/pong are answered by tungstenite
            Some(Ok(_)) => {}
            Some(Err(e)) => break Some(TransportError::WebSocket(e.to_string())),
        }
    };

    connected.store(false, Ordering::SeqCst);
    match failure {
        None => {
            let _ = events.send(TransportEvent::End);
        }
        Some(e) => {
            tracing::warn!(error = %e, "WS receive error");
            let _ = events.send(TransportEvent::Error(e));
        }
    }
    let _ = events.send(TransportEvent::Close);
}
