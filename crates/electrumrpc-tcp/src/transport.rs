//! TCP/TLS transport with a background reader task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;

use electrumrpc_core::error::TransportError;
use electrumrpc_core::tls::{self, TlsOptions};
use electrumrpc_core::transport::{EventSender, Transport, TransportEvent};
use electrumrpc_core::{net, Framer};

/// Default inactivity timeout.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

const READ_CHUNK: usize = 16 * 1024;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Configuration for a [`TcpTransport`].
#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
    /// `Some` for TLS, `None` for plain TCP.
    pub tls: Option<TlsOptions>,
    /// Bounds connection establishment, and the wait for the first byte
    /// after each write.
    pub inactivity_timeout: Duration,
}

impl TcpConfig {
    pub fn plain(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: None,
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
        }
    }

    pub fn tls(host: impl Into<String>, port: u16, options: TlsOptions) -> Self {
        Self {
            tls: Some(options),
            ..Self::plain(host, port)
        }
    }
}

/// Byte-stream transport. Inbound bytes go through a [`Framer`] and each
/// complete line is reported as [`TransportEvent::Message`].
pub struct TcpTransport {
    config: TcpConfig,
    endpoint: String,
    events: EventSender,
    writer: Option<BoxedWriter>,
    reader_task: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
    /// Signalled after every write to arm the inactivity timer.
    wrote: Arc<Notify>,
}

impl TcpTransport {
    pub fn new(config: TcpConfig, events: EventSender) -> Self {
        let scheme = if config.tls.is_some() { "tls" } else { "tcp" };
        let endpoint = format!("{scheme}://{}:{}", config.host, config.port);
        Self {
            config,
            endpoint,
            events,
            writer: None,
            reader_task: None,
            connected: Arc::new(AtomicBool::new(false)),
            wrote: Arc::new(Notify::new()),
        }
    }

    async fn open(config: &TcpConfig) -> Result<(BoxedReader, BoxedWriter), TransportError> {
        let timeout = config.inactivity_timeout;
        let stream = net::dial(&config.host, config.port, timeout).await?;

        let Some(options) = &config.tls else {
            let (reader, writer) = stream.into_split();
            return Ok((Box::new(reader), Box::new(writer)));
        };

        let connector = TlsConnector::from(tls::client_config(options)?);
        let name = tls::server_name(&config.host)?;
        let stream = tokio::time::timeout(timeout, connector.connect(name, stream))
            .await
            .map_err(|_| TransportError::Timeout {
                ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        let (reader, writer) = tokio::io::split(stream);
        Ok((Box::new(reader), Box::new(writer)))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn initialize(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        let (reader, writer) = Self::open(&self.config).await?;
        self.writer = Some(writer);
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(endpoint = %self.endpoint, "connected");
        let _ = self.events.send(TransportEvent::Connect);

        self.reader_task = Some(tokio::spawn(read_loop(
            reader,
            self.events.clone(),
            Arc::clone(&self.connected),
            Arc::clone(&self.wrote),
            self.config.inactivity_timeout,
        )));
        Ok(())
    }

    async fn send(&mut self, data: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let writer = self.writer.as_mut().ok_or(TransportError::NotConnected)?;
        writer.write_all(data.as_bytes()).await?;
        writer.flush().await?;
        self.wrote.notify_one();
        Ok(())
    }

    async fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
            tracing::debug!(endpoint = %self.endpoint, "closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

async fn read_loop(
    mut reader: BoxedReader,
    events: EventSender,
    connected: Arc<AtomicBool>,
    wrote: Arc<Notify>,
    timeout: Duration,
) {
    let frames = events.clone();
    let mut framer = Framer::new(move |body| {
        let _ = frames.send(TransportEvent::Message(body));
    });
    let mut buf = vec![0u8; READ_CHUNK];
    let mut deadline: Option<Instant> = None;

    let failure = loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => break None,
                Ok(n) => {
                    deadline = None;
                    tracing::trace!(bytes = n, "read");
                    framer.feed(&buf[..n]);
                }
                Err(e) => break Some(TransportError::Io(e)),
            },
            _ = wrote.notified() => {
                if deadline.is_none() {
                    deadline = Some(Instant::now() + timeout);
                }
            }
            _ = expire(deadline) => {
                break Some(TransportError::Timeout { ms: timeout.as_millis() as u64 });
            }
        }
    };

    connected.store(false, Ordering::SeqCst);
    match failure {
        None => {
            tracing::debug!("peer closed the stream");
            let _ = events.send(TransportEvent::End);
        }
        Some(e) => {
            tracing::error!(error = %e, "read failed");
            let _ = events.send(TransportEvent::Error(e));
        }
    }
    let _ = events.send(TransportEvent::Close);
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
