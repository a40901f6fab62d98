//! Client configuration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use electrumrpc_core::request::RpcId;
use electrumrpc_core::tls::TlsOptions;

/// Mints request ids. Ids must be unique among the requests outstanding on
/// one connection.
pub trait IdGenerator: Send + Sync + 'static {
    fn next_id(&self) -> RpcId;
}

/// Default generator: decimal strings counting up from `"1"`.
#[derive(Debug, Default)]
pub struct SequentialIds {
    counter: AtomicU64,
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> RpcId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        RpcId::String(n.to_string())
    }
}

struct FnIds<F>(F);

impl<F> IdGenerator for FnIds<F>
where
    F: Fn() -> String + Send + Sync + 'static,
{
    fn next_id(&self) -> RpcId {
        RpcId::String((self.0)())
    }
}

/// Options for a [`Client`](crate::Client).
#[derive(Clone)]
pub struct ClientOptions {
    /// Sent as the first `server.version` parameter.
    pub client_name: String,
    /// Protocol version requested during negotiation.
    pub protocol_version: String,
    /// Fetch `server.banner` right after negotiation.
    pub call_banner: bool,
    /// Log the banner at info level when it arrives.
    pub show_banner: bool,
    /// `None` uses [`SequentialIds`].
    pub id_generator: Option<Arc<dyn IdGenerator>>,
    /// Applies to `tls` and `wss` endpoints.
    pub tls: TlsOptions,
    /// Connect timeout, and the byte-stream reply-inactivity limit.
    pub inactivity_timeout: Duration,
    pub keepalive_interval: Duration,
    /// A ping is sent only when no request went out for longer than this.
    pub keepalive_idle: Duration,
    pub ping_timeout: Duration,
    /// Pause between a close and the next connection attempt.
    pub reconnect_delay: Duration,
    /// Per-request deadline. `None` waits until the reply or a close.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            client_name: "electrumrpc".into(),
            protocol_version: "1.4.2".into(),
            call_banner: false,
            show_banner: false,
            id_generator: None,
            tls: TlsOptions::default(),
            inactivity_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(5),
            keepalive_idle: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(9),
            reconnect_delay: Duration::from_secs(1),
            request_timeout: None,
        }
    }
}

impl ClientOptions {
    /// Use `f` to mint request ids.
    pub fn with_id_generator<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.id_generator = Some(Arc::new(FnIds(f)));
        self
    }

    pub(crate) fn ids(&self) -> Arc<dyn IdGenerator> {
        match &self.id_generator {
            Some(ids) => Arc::clone(ids),
            None => Arc::new(SequentialIds::default()),
        }
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("client_name", &self.client_name)
            .field("protocol_version", &self.protocol_version)
            .field("call_banner", &self.call_banner)
            .field("show_banner", &self.show_banner)
            .field("custom_ids", &self.id_generator.is_some())
            .field("tls", &self.tls)
            .field("inactivity_timeout", &self.inactivity_timeout)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("keepalive_idle", &self.keepalive_idle)
            .field("ping_timeout", &self.ping_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_start_at_one() {
        let ids = SequentialIds::default();
        assert_eq!(ids.next_id(), RpcId::String("1".into()));
        assert_eq!(ids.next_id(), RpcId::String("2".into()));
    }

    #[test]
    fn custom_generator() {
        let counter = AtomicU64::new(100);
        let opts = ClientOptions::default()
            .with_id_generator(move || format!("req-{}", counter.fetch_add(1, Ordering::Relaxed)));
        let ids = opts.ids();
        assert_eq!(ids.next_id().key(), "req-100");
        assert_eq!(ids.next_id().key(), "req-101");
    }

    #[test]
    fn defaults() {
        let opts = ClientOptions::default();
        assert_eq!(opts.protocol_version, "1.4.2");
        assert_eq!(opts.keepalive_interval, Duration::from_secs(5));
        assert_eq!(opts.ping_timeout, Duration::from_secs(9));
        assert!(opts.request_timeout.is_none());
        assert_eq!(opts.ids().next_id().key(), "1");
    }
}
