//! Scripted in-memory transport for driving the client in tests.
//!
//! Version negotiation and pings are answered automatically; every other
//! request is handed to the test through [`Harness::next_request`] so the
//! test decides when (and whether) to answer.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

use electrumrpc_client::{Client, ClientOptions};
use electrumrpc_core::error::TransportError;
use electrumrpc_core::transport::{Connector, EventSender, Transport, TransportEvent};

pub const WAIT: Duration = Duration::from_secs(5);

struct Link {
    events: EventSender,
    connected: Arc<AtomicBool>,
}

struct Script {
    links: Vec<Link>,
    lines: Vec<Value>,
    refuse: bool,
    answer_ping: bool,
    handshake_delay: Duration,
    requests: mpsc::UnboundedSender<Value>,
}

pub struct Harness {
    script: Arc<Mutex<Script>>,
    requests: mpsc::UnboundedReceiver<Value>,
}

pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl Harness {
    pub fn new() -> (Self, ScriptedConnector) {
        let (tx, rx) = mpsc::unbounded_channel();
        let script = Arc::new(Mutex::new(Script {
            links: Vec::new(),
            lines: Vec::new(),
            refuse: false,
            answer_ping: true,
            handshake_delay: Duration::ZERO,
            requests: tx,
        }));
        (
            Self {
                script: Arc::clone(&script),
                requests: rx,
            },
            ScriptedConnector { script },
        )
    }

    /// Client over a fresh harness with short timers.
    pub fn client(options: ClientOptions) -> (Self, Client) {
        let (harness, connector) = Self::new();
        (harness, Client::with_connector(connector, options))
    }

    pub fn transports_created(&self) -> usize {
        self.script.lock().unwrap().links.len()
    }

    /// Every line written by the client, parsed.
    pub fn written(&self) -> Vec<Value> {
        self.script.lock().unwrap().lines.clone()
    }

    pub fn written_methods(&self) -> Vec<String> {
        self.written()
            .iter()
            .map(|l| l["method"].as_str().unwrap_or_default().to_owned())
            .collect()
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.script.lock().unwrap().refuse = refuse;
    }

    pub fn answer_pings(&self, answer: bool) {
        self.script.lock().unwrap().answer_ping = answer;
    }

    /// Make every handshake take `delay`, like a host that never answers.
    pub fn slow_handshakes(&self, delay: Duration) {
        self.script.lock().unwrap().handshake_delay = delay;
    }

    /// Next request not answered by the script.
    pub async fn next_request(&mut self) -> Value {
        timeout(WAIT, self.requests.recv())
            .await
            .expect("timed out waiting for a request")
            .expect("script dropped")
    }

    /// Deliver a raw inbound message on the newest transport.
    pub fn inject_raw(&self, body: &str) {
        let script = self.script.lock().unwrap();
        let link = script.links.last().expect("no transport created");
        link.events
            .send(TransportEvent::Message(body.to_owned()))
            .unwrap();
    }

    pub fn inject(&self, message: Value) {
        self.inject_raw(&message.to_string());
    }

    pub fn reply(&self, request: &Value, result: Value) {
        self.inject(json!({"jsonrpc": "2.0", "id": request["id"], "result": result}));
    }

    /// Whether the newest transport is still open.
    pub fn newest_connected(&self) -> bool {
        let script = self.script.lock().unwrap();
        script
            .links
            .last()
            .map_or(false, |l| l.connected.load(Ordering::SeqCst))
    }

    /// Simulate the server dropping the newest connection.
    pub fn drop_connection(&self) {
        let script = self.script.lock().unwrap();
        let link = script.links.last().expect("no transport created");
        link.connected.store(false, Ordering::SeqCst);
        let _ = link.events.send(TransportEvent::End);
        let _ = link.events.send(TransportEvent::Close);
    }
}

impl Connector for ScriptedConnector {
    fn create(&self, events: EventSender) -> Box<dyn Transport> {
        let connected = Arc::new(AtomicBool::new(false));
        self.script.lock().unwrap().links.push(Link {
            events: events.clone(),
            connected: Arc::clone(&connected),
        });
        Box::new(ScriptedTransport {
            script: Arc::clone(&self.script),
            events,
            connected,
        })
    }
}

struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    events: EventSender,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn initialize(&mut self) -> Result<(), TransportError> {
        let delay = self.script.lock().unwrap().handshake_delay;
        if !delay.is_zero() {
            sleep(delay).await;
        }
        if self.script.lock().unwrap().refuse {
            return Err(TransportError::Connect("connection refused".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Connect);
        Ok(())
    }

    async fn send(&mut self, data: &str) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        assert!(data.ends_with('\n'), "request must be newline terminated");
        let request: Value = serde_json::from_str(data.trim_end()).expect("request is JSON");

        let mut script = self.script.lock().unwrap();
        script.lines.push(request.clone());
        let answer = match request["method"].as_str() {
            Some("server.version") => Some(json!(["MockServer 1.0", "1.4"])),
            Some("server.banner") => Some(json!("Welcome to the mock server")),
            Some("server.ping") if script.answer_ping => Some(Value::Null),
            Some("server.ping") => None,
            _ => {
                let _ = script.requests.send(request.clone());
                None
            }
        };
        if let Some(result) = answer {
            let reply = json!({"jsonrpc": "2.0", "id": request["id"], "result": result});
            let _ = self.events.send(TransportEvent::Message(reply.to_string()));
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn endpoint(&self) -> &str {
        "mock://electrum"
    }
}

/// Options with timers short enough for tests.
pub fn fast_options() -> ClientOptions {
    ClientOptions {
        reconnect_delay: Duration::from_millis(20),
        ..ClientOptions::default()
    }
}

/// Poll `cond` until it holds or [`WAIT`] elapses.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        sleep(Duration::from_millis(5)).await;
    }
}
