//! Background task owning one client's connection.
//!
//! Everything mutable lives here and is touched from this task only: the
//! current transport, the pending table, the persistence policy and the
//! keep-alive and reconnect timers.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use electrumrpc_core::error::TransportError;
use electrumrpc_core::request::{parse_inbound, Inbound, JsonRpcRequest, RpcError, RpcId};
use electrumrpc_core::transport::{Connector, Transport, TransportEvent};

use crate::client::{cache_key, Command, ConnectionEvent, ConnectionState, Reply, Shared};
use crate::error::ClientError;
use crate::policy::PersistencePolicy;

/// Who is waiting on a request id.
enum Waiter {
    Caller(Reply),
    Negotiation,
    Banner,
    Ping,
}

/// Outcome of a handshake run off the driver task.
struct Attempt {
    transport: Box<dyn Transport>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    result: Result<(), TransportError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Negotiating,
    Ready,
}

pub(crate) struct Driver {
    connector: Box<dyn Connector>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    shared: Arc<Shared>,

    transport: Option<Box<dyn Transport>>,
    attempt: Option<JoinHandle<Attempt>>,
    transport_events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    state: ConnectionState,
    phase: Phase,
    pending: HashMap<String, Waiter>,
    connect_waiters: Vec<oneshot::Sender<()>>,

    policy: Option<PersistencePolicy>,
    /// Set by an explicit close; suppresses reconnects until the next connect.
    closing: bool,
    reconnect_at: Option<Instant>,

    keepalive: Option<Interval>,
    last_request: Option<Instant>,
    ping_deadline: Option<Instant>,
}

impl Driver {
    pub(crate) fn new(
        connector: Box<dyn Connector>,
        commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            connector,
            commands,
            state_tx,
            shared,
            transport: None,
            attempt: None,
            transport_events: None,
            state: ConnectionState::Disconnected,
            phase: Phase::Idle,
            pending: HashMap::new(),
            connect_waiters: Vec::new(),
            policy: None,
            closing: false,
            reconnect_at: None,
            keepalive: None,
            last_request: None,
            ping_deadline: None,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                joined = join_attempt(&mut self.attempt) => {
                    self.attempt = None;
                    self.finish_attempt(joined).await;
                }
                Some(event) = next_event(&mut self.transport_events) => {
                    self.handle_transport_event(event).await;
                }
                _ = tick(&mut self.keepalive) => self.keepalive_tick().await,
                _ = expire(self.ping_deadline) => {
                    self.ping_deadline = None;
                    self.fail_connection("keepalive ping timed out".into()).await;
                }
                _ = expire(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.apply_policy().await;
                }
            }
        }

        tracing::debug!("all client handles dropped, shutting down");
        self.closing = true;
        self.teardown().await;
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { policy, done } => {
                self.closing = false;
                self.policy = policy;
                if self.attempt.is_some() {
                    self.connect_waiters.push(done);
                    return;
                }
                if self.transport.as_ref().map_or(false, |t| t.is_connected()) {
                    if self.phase == Phase::Ready {
                        let _ = done.send(());
                    } else {
                        self.connect_waiters.push(done);
                    }
                    return;
                }
                self.reconnect_at = None;
                self.discard_connection().await;
                self.connect_waiters.push(done);
                self.start_connect();
            }
            Command::Reconnect { done } => {
                if self.closing {
                    tracing::debug!("reconnect skipped, client was closed");
                    let _ = done.send(());
                    return;
                }
                self.reconnect().await;
                self.connect_waiters.push(done);
            }
            Command::Request {
                id,
                method,
                params,
                reply,
            } => {
                if self.state != ConnectionState::Connected {
                    let _ = reply.send(Err(ClientError::NotConnected));
                    return;
                }
                self.send_request(id, &method, params, Waiter::Caller(reply))
                    .await;
            }
            Command::Cancel(key) => {
                if self.pending.remove(&key).is_some() {
                    tracing::debug!(id = %key, "request abandoned by caller");
                }
            }
            Command::PendingCount(tx) => {
                let _ = tx.send(self.pending.len());
            }
            Command::Close { done } => {
                tracing::info!("closing connection");
                self.closing = true;
                self.reconnect_at = None;
                self.teardown().await;
                let _ = done.send(());
            }
        }
    }

    // ------------------------------------------------------------------
    // connection lifecycle
    // ------------------------------------------------------------------

    /// Start the handshake on its own task so commands keep flowing while
    /// it runs. The outcome comes back through [`Driver::finish_attempt`].
    fn start_connect(&mut self) {
        self.set_state(ConnectionState::Connecting);
        self.last_request = None;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut transport = self.connector.create(events_tx);
        tracing::info!(endpoint = %transport.endpoint(), "connecting to electrum server");

        self.attempt = Some(tokio::spawn(async move {
            let result = transport.initialize().await;
            Attempt {
                transport,
                events: events_rx,
                result,
            }
        }));
    }

    async fn finish_attempt(&mut self, joined: Result<Attempt, JoinError>) {
        let attempt = match joined {
            Ok(attempt) => attempt,
            Err(e) => {
                self.report_error(format!("failed to connect to electrum server: [{e}]"));
                self.teardown().await;
                return;
            }
        };
        let Attempt {
            mut transport,
            events,
            result,
        } = attempt;

        if let Err(e) = result {
            self.report_error(format!("failed to connect to electrum server: [{e}]"));
            transport.close().await;
            self.teardown().await;
            return;
        }

        self.transport = Some(transport);
        self.transport_events = Some(events);
        self.set_state(ConnectionState::Connected);
        self.phase = Phase::Negotiating;

        let params = vec![
            json!(self.shared.options.client_name),
            json!(self.shared.options.protocol_version),
        ];
        let id = self.shared.ids.next_id();
        self.send_request(id, "server.version", params, Waiter::Negotiation)
            .await;
    }

    /// Negotiation (and the optional banner) is done.
    fn finish_connect(&mut self) {
        self.phase = Phase::Ready;
        let period = self.shared.options.keepalive_interval;
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.keepalive = Some(keepalive);

        self.shared.publish(ConnectionEvent::Connected);
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    async fn reconnect(&mut self) {
        if self.closing {
            tracing::debug!("reconnect skipped, client was closed");
            return;
        }
        tracing::info!("electrum reconnect");
        self.discard_connection().await;
        self.start_connect();
    }

    /// Tear down the current transport, if any, without scheduling a
    /// reconnect: the caller is about to connect again.
    async fn discard_connection(&mut self) {
        if self.transport.is_none() && self.attempt.is_none() {
            return;
        }
        let closing = std::mem::replace(&mut self.closing, true);
        self.teardown().await;
        self.closing = closing;
    }

    /// Runs once per unexpected close, after the reconnect delay.
    async fn apply_policy(&mut self) {
        if self.closing {
            return;
        }
        let Some(policy) = self.policy.clone() else {
            self.reconnect().await;
            return;
        };
        if policy.try_consume() {
            tracing::info!(remaining = policy.remaining_retries(), "retrying connection");
            self.reconnect().await;
        } else if policy.exhaust() {
            tracing::info!("reconnect retries exhausted");
        } else {
            tracing::info!("reconnect retries exhausted, giving up");
        }
    }

    /// Fatal error on a live connection: report, drop the transport, and go
    /// through the regular close path.
    async fn fail_connection(&mut self, reason: String) {
        self.report_error(reason);
        self.teardown().await;
    }

    /// The close path. Abandons any handshake in flight, closes the transport
    /// if there still is one, fails every pending request, clears
    /// per-connection state and, unless the client was closed on purpose,
    /// schedules the next connection attempt.
    async fn teardown(&mut self) {
        let live = self.transport.is_some()
            || self.attempt.is_some()
            || self.state != ConnectionState::Disconnected;
        if let Some(attempt) = self.attempt.take() {
            attempt.abort();
            tracing::debug!("connection attempt abandoned");
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
            tracing::info!(endpoint = %transport.endpoint(), "connection closed");
        }
        self.transport_events = None;
        self.set_state(ConnectionState::Disconnected);
        self.phase = Phase::Idle;
        self.keepalive = None;
        self.ping_deadline = None;
        self.shared.cache.lock().clear();

        for (id, waiter) in self.pending.drain() {
            match waiter {
                Waiter::Caller(reply) => {
                    tracing::debug!(id = %id, "failing pending request, connection closed");
                    let _ = reply.send(Err(ClientError::ConnectionClosed));
                }
                Waiter::Negotiation | Waiter::Banner => {
                    tracing::warn!("connection closed before negotiation finished");
                }
                Waiter::Ping => {}
            }
        }

        if live {
            self.shared.publish(ConnectionEvent::Closed);
        }
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(());
        }

        if !self.closing {
            self.reconnect_at = Some(Instant::now() + self.shared.options.reconnect_delay);
        }
    }

    // ------------------------------------------------------------------
    // requests and inbound traffic
    // ------------------------------------------------------------------

    async fn send_request(&mut self, id: RpcId, method: &str, params: Vec<Value>, waiter: Waiter) {
        let request = JsonRpcRequest::new(id, method, params);
        let line = match request.to_line() {
            Ok(line) => line,
            Err(e) => {
                self.settle_local(waiter, ClientError::Deserialization(e));
                return;
            }
        };
        let Some(transport) = self.transport.as_mut() else {
            self.settle_local(waiter, ClientError::NotConnected);
            return;
        };

        let key = request.id.key();
        tracing::debug!(id = %key, method, "request");
        self.last_request = Some(Instant::now());
        if let Some(previous) = self.pending.insert(key.clone(), waiter) {
            tracing::warn!(id = %key, "request id reused while still pending");
            if let Waiter::Caller(reply) = previous {
                let _ = reply.send(Err(ClientError::Protocol(format!(
                    "request id {key} reused while pending"
                ))));
            }
        }

        if let Err(e) = transport.send(&line).await {
            let reason = format!("write failed: {e}");
            if let Some(Waiter::Caller(reply)) = self.pending.remove(&key) {
                let _ = reply.send(Err(ClientError::Transport(e)));
            }
            self.fail_connection(reason).await;
        }
    }

    /// Fail a waiter whose request never reached the wire.
    fn settle_local(&self, waiter: Waiter, err: ClientError) {
        match waiter {
            Waiter::Caller(reply) => {
                let _ = reply.send(Err(err));
            }
            _ => tracing::warn!(error = %err, "internal request not sent"),
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connect => tracing::debug!("transport connected"),
            TransportEvent::Message(body) => self.handle_message(&body).await,
            TransportEvent::End => tracing::debug!("remote end closed the stream"),
            TransportEvent::Error(e) => {
                self.report_error(format!("transport error: [{e}]"));
            }
            TransportEvent::Close => {
                tracing::debug!("transport closed");
                self.teardown().await;
            }
        }
    }

    async fn handle_message(&mut self, body: &str) {
        if body.trim().is_empty() {
            return;
        }
        tracing::trace!(message = %body, "inbound");

        match parse_inbound(body) {
            Err(e) => {
                self.report_error(format!("discarding inbound message: {e}"));
            }
            Ok(Inbound::Notification { method, params }) => {
                let delivered = self.shared.notifications.emit(&method, &params);
                if delivered == 0 {
                    tracing::debug!(method = %method, "notification without listeners");
                }
            }
            Ok(Inbound::Response { id, outcome }) => {
                let waiter = id.as_ref().and_then(|key| self.pending.remove(key));
                match waiter {
                    Some(waiter) => self.settle(waiter, outcome).await,
                    None => tracing::warn!(id = ?id, "response for unknown request id"),
                }
            }
        }
    }

    async fn settle(&mut self, waiter: Waiter, outcome: Result<Value, RpcError>) {
        match waiter {
            Waiter::Caller(reply) => {
                let _ = reply.send(outcome.map_err(ClientError::Rpc));
            }
            Waiter::Negotiation => match outcome {
                Ok(version) => {
                    tracing::info!(version = %version, "negotiated version");
                    let params = [
                        json!(self.shared.options.client_name),
                        json!(self.shared.options.protocol_version),
                    ];
                    self.shared
                        .cache
                        .lock()
                        .insert(cache_key("server.version", &params), version);

                    if self.shared.options.call_banner {
                        let id = self.shared.ids.next_id();
                        self.send_request(id, "server.banner", Vec::new(), Waiter::Banner)
                            .await;
                    } else {
                        self.finish_connect();
                    }
                }
                Err(e) => {
                    self.fail_connection(format!("failed to connect to electrum server: [{e}]"))
                        .await;
                }
            },
            Waiter::Banner => {
                match outcome {
                    Ok(banner) if self.shared.options.show_banner => {
                        tracing::info!(banner = %banner.as_str().unwrap_or_default(), "server banner");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "server.banner failed"),
                }
                self.finish_connect();
            }
            Waiter::Ping => match outcome {
                Ok(_) => {
                    tracing::trace!("pong");
                    self.ping_deadline = None;
                }
                Err(e) => {
                    self.ping_deadline = None;
                    self.fail_connection(format!("keepalive ping failed: [{e}]"))
                        .await;
                }
            },
        }
    }

    // ------------------------------------------------------------------
    // keep-alive
    // ------------------------------------------------------------------

    async fn keepalive_tick(&mut self) {
        if self.state != ConnectionState::Connected || self.ping_deadline.is_some() {
            return;
        }
        let idle = self.shared.options.keepalive_idle;
        if self.last_request.is_some_and(|at| at.elapsed() <= idle) {
            return;
        }
        self.ping_deadline = Some(Instant::now() + self.shared.options.ping_timeout);
        let id = self.shared.ids.next_id();
        self.send_request(id, "server.ping", Vec::new(), Waiter::Ping)
            .await;
    }

    // ------------------------------------------------------------------

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "connection state");
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn report_error(&self, message: String) {
        tracing::error!("{message}");
        self.shared.publish(ConnectionEvent::Error(message));
    }
}

async fn join_attempt(attempt: &mut Option<JoinHandle<Attempt>>) -> Result<Attempt, JoinError> {
    match attempt {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
