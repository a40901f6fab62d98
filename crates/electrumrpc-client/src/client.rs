//! Caller-facing handle to a multiplexed Electrum connection.
//!
//! A background [driver](crate::driver) task owns the transport, the pending
//! request table, keep-alive and reconnect timers. [`Client`] talks to it
//! over a command channel and reads connection state from a watch channel,
//! so handles are cheap to clone and share across tasks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use electrumrpc_core::request::RpcId;
use electrumrpc_core::transport::{Connector, Protocol};

use crate::connector::DefaultConnector;
use crate::driver::Driver;
use crate::emitter::{EventEmitter, ListenerId};
use crate::error::ClientError;
use crate::options::{ClientOptions, IdGenerator};
use crate::policy::PersistencePolicy;

const EVENT_CAPACITY: usize = 64;

/// Connection lifecycle as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Transport is up. Requests are accepted from here on, including
    /// while the version negotiation is still in flight.
    Connected,
}

/// Lifecycle events published to [`Client::events`] subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Negotiation finished; the connection is ready.
    Connected,
    /// The connection closed (explicitly or not).
    Closed,
    /// A failure that did not surface through a request: connect errors,
    /// unparseable inbound messages, keep-alive failures.
    Error(String),
}

pub(crate) type Reply = oneshot::Sender<Result<Value, ClientError>>;

pub(crate) enum Command {
    Connect {
        policy: Option<PersistencePolicy>,
        done: oneshot::Sender<()>,
    },
    Reconnect {
        done: oneshot::Sender<()>,
    },
    Request {
        id: RpcId,
        method: String,
        params: Vec<Value>,
        reply: Reply,
    },
    /// Forget a request whose caller stopped waiting.
    Cancel(String),
    PendingCount(oneshot::Sender<usize>),
    Close {
        done: oneshot::Sender<()>,
    },
}

/// State shared between the handles and the driver.
pub(crate) struct Shared {
    pub(crate) options: ClientOptions,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) notifications: EventEmitter,
    pub(crate) events: broadcast::Sender<ConnectionEvent>,
    pub(crate) cache: Mutex<HashMap<String, Value>>,
}

impl Shared {
    pub(crate) fn publish(&self, event: ConnectionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

pub(crate) fn cache_key(method: &str, params: &[Value]) -> String {
    format!("{method}{}", Value::Array(params.to_vec()))
}

/// Handle to an Electrum server connection.
///
/// Construction spawns the driver task, so it must happen inside a Tokio
/// runtime. The driver stops once every handle is dropped.
#[derive(Clone)]
pub struct Client {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    shared: Arc<Shared>,
}

impl Client {
    /// Client for `host:port` over `protocol`.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        protocol: Protocol,
        options: ClientOptions,
    ) -> Self {
        let connector = DefaultConnector::new(
            host,
            port,
            protocol,
            options.tls.clone(),
            options.inactivity_timeout,
        );
        Self::with_connector(connector, options)
    }

    /// Client using a caller-supplied transport factory.
    pub fn with_connector(connector: impl Connector, options: ClientOptions) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            ids: options.ids(),
            options,
            notifications: EventEmitter::new(),
            events,
            cache: Mutex::new(HashMap::new()),
        });

        let driver = Driver::new(Box::new(connector), cmd_rx, state_tx, Arc::clone(&shared));
        tokio::spawn(driver.run());

        Self {
            cmd_tx,
            state,
            shared,
        }
    }

    /// Connect and negotiate the protocol version.
    ///
    /// Returns once negotiation finished or the attempt failed; failures are
    /// logged and published as [`ConnectionEvent::Error`], never returned.
    /// `policy` governs reconnects after unexpected closes; `None` reconnects
    /// indefinitely. Connecting while connected only updates the policy.
    pub async fn connect(&self, policy: Option<PersistencePolicy>) {
        let (done, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Connect { policy, done }).is_err() {
            tracing::error!("connect on a stopped client");
            return;
        }
        let _ = rx.await;
    }

    /// Drop the current connection, failing its pending requests, and
    /// connect again with the stored policy. Like [`connect`], returns once
    /// negotiation finished or the attempt failed. Does nothing after
    /// [`close`].
    ///
    /// [`connect`]: Client::connect
    ///
    /// [`close`]: Client::close
    pub async fn reconnect(&self) {
        let (done, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Reconnect { done }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Close the connection and stop reconnecting. Pending requests fail
    /// with [`ClientError::ConnectionClosed`].
    pub async fn close(&self) {
        let (done, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Close { done }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Send `method` and wait for the matching response.
    pub async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let id = self.shared.ids.next_id();
        let key = id.key();
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Request {
                id,
                method: method.to_owned(),
                params,
                reply,
            })
            .map_err(|_| ClientError::Shutdown)?;

        let Some(limit) = self.shared.options.request_timeout else {
            return rx.await.map_err(|_| ClientError::Shutdown)?;
        };
        match tokio::time::timeout(limit, rx).await {
            Ok(outcome) => outcome.map_err(|_| ClientError::Shutdown)?,
            Err(_) => {
                tracing::warn!(method, id = %key, "request timed out");
                let _ = self.cmd_tx.send(Command::Cancel(key));
                Err(ClientError::Timeout {
                    ms: limit.as_millis() as u64,
                })
            }
        }
    }

    /// [`request`](Client::request), deserializing the result into `T`.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, ClientError> {
        let result = self.request(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Like [`request_as`](Client::request_as), but answered from the
    /// per-connection cache when the same call already succeeded.
    pub(crate) async fn request_cached<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, ClientError> {
        let key = cache_key(method, &params);
        let hit = self.shared.cache.lock().get(&key).cloned();
        let result = match hit {
            Some(result) => {
                tracing::debug!(method, "cache hit");
                result
            }
            None => {
                let result = self.request(method, params).await?;
                self.shared.cache.lock().insert(key, result.clone());
                result
            }
        };
        Ok(serde_json::from_value(result)?)
    }

    /// Register a listener for server notifications named `method`.
    pub fn on_notification<F>(&self, method: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.shared.notifications.on(method, listener)
    }

    pub fn remove_listener(&self, method: &str, id: ListenerId) -> bool {
        self.shared.notifications.off(method, id)
    }

    pub fn clear_listeners(&self, method: &str) -> usize {
        self.shared.notifications.clear(method)
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// Number of requests awaiting a response.
    pub async fn pending_requests(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::PendingCount(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.shared.options
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("options", &self.shared.options)
            .finish()
    }
}
