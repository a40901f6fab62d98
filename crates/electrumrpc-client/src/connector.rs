//! Picks the transport variant for a protocol.

use std::time::Duration;

use electrumrpc_core::tls::TlsOptions;
use electrumrpc_core::transport::{Connector, EventSender, Protocol, Transport};
use electrumrpc_tcp::{TcpConfig, TcpTransport};
use electrumrpc_ws::{WsConfig, WsTransport};

/// Builds a [`TcpTransport`] for `tcp`/`tls` and a [`WsTransport`] for
/// `ws`/`wss`.
#[derive(Debug, Clone)]
pub struct DefaultConnector {
    host: String,
    port: u16,
    protocol: Protocol,
    tls: TlsOptions,
    timeout: Duration,
}

impl DefaultConnector {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        protocol: Protocol,
        tls: TlsOptions,
        timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            protocol,
            tls,
            timeout,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}

impl Connector for DefaultConnector {
    fn create(&self, events: EventSender) -> Box<dyn Transport> {
        let tls = self.protocol.is_encrypted().then(|| self.tls.clone());
        if self.protocol.is_message_based() {
            Box::new(WsTransport::new(
                WsConfig {
                    host: self.host.clone(),
                    port: self.port,
                    tls,
                    connect_timeout: self.timeout,
                },
                events,
            ))
        } else {
            Box::new(TcpTransport::new(
                TcpConfig {
                    host: self.host.clone(),
                    port: self.port,
                    tls,
                    inactivity_timeout: self.timeout,
                },
                events,
            ))
        }
    }
}
