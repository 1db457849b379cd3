//! Protocol transport: the wire side of the connection manager
//!
//! [`ConnectionManager`](crate::ConnectionManager) only talks to the
//! [`Transport`] trait. [`TcpTransport`] is the production adapter over a
//! plain or TLS socket; tests drive the manager with an in-memory transport.

use crate::config::ServerConfig;
use crate::{Error, Message, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest inbound line accepted: 8191 bytes of IRCv3 tags plus a 512-byte message
pub const MAX_LINE_BYTES: usize = 8191 + 512;

/// Wire-level operations the connection manager needs
#[async_trait]
pub trait Transport: Send {
    /// Open the socket (and TLS session) to the server
    async fn open(&mut self, server: &ServerConfig) -> Result<()>;

    /// Write one message
    async fn send(&mut self, message: &Message) -> Result<()>;

    /// Next inbound message; `None` once the peer has closed the connection.
    ///
    /// Must be cancel-safe: the manager polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<Message>>;

    /// Whether the socket is currently open
    fn is_connected(&self) -> bool;

    /// Tear the socket down; a no-op when already closed
    async fn close(&mut self);
}

/// Reject parameters that would smuggle extra lines onto the wire
pub fn check_outbound(message: &Message) -> Result<()> {
    if message
        .params
        .iter()
        .any(|p| p.contains(['\r', '\n', '\0']))
    {
        return Err(Error::MessageParse(format!(
            "Refusing to send {} with embedded line break",
            message.command
        )));
    }
    Ok(())
}

/// Trait for byte streams the transport can run over (TCP or TLS)
trait WireStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> WireStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// An open socket: writer half plus the task feeding parsed lines
struct OpenSocket {
    writer: WriteHalf<Box<dyn WireStream>>,
    lines: mpsc::UnboundedReceiver<Result<Message>>,
    reader: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

/// TCP/TLS transport
#[derive(Default)]
pub struct TcpTransport {
    socket: Option<OpenSocket>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn tls_connector() -> TlsConnector {
        let mut roots = rustls::RootCertStore::empty();
        roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
            rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                ta.subject,
                ta.spki,
                ta.name_constraints,
            )
        }));
        let config = rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();
        TlsConnector::from(Arc::new(config))
    }

    async fn establish(server: &ServerConfig) -> Result<Box<dyn WireStream>> {
        let tcp = TcpStream::connect((server.host.as_str(), server.port)).await?;
        tcp.set_nodelay(true)?;

        if !server.tls {
            return Ok(Box::new(tcp));
        }

        tracing::debug!("Upgrading connection to {} to TLS", server.host);
        let name = rustls::ServerName::try_from(server.host.as_str())
            .map_err(|_| Error::Connection(format!("Invalid TLS server name: {}", server.host)))?;
        let tls = Self::tls_connector()
            .connect(name, tcp)
            .await
            .map_err(|e| Error::Connection(format!("TLS handshake failed: {}", e)))?;
        Ok(Box::new(tls))
    }

    /// Read lines until EOF, forwarding each parsed message
    async fn read_loop<R: AsyncRead + Unpin>(
        read_half: R,
        sender: mpsc::UnboundedSender<Result<Message>>,
        alive: Arc<AtomicBool>,
    ) {
        let mut reader = BufReader::new(read_half);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64);
            match limited.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(n) if n >= MAX_LINE_BYTES && buf.last() != Some(&b'\n') => {
                    let _ = sender.send(Err(Error::Connection(format!(
                        "Server sent a line longer than {} bytes",
                        MAX_LINE_BYTES
                    ))));
                    break;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    if line.trim().is_empty() {
                        continue;
                    }
                    tracing::trace!("<< {}", line.trim_end());
                    if sender.send(Message::parse(&line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = sender.send(Err(Error::Io(e)));
                    break;
                }
            }
        }

        alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self, server: &ServerConfig) -> Result<()> {
        self.close().await;

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, Self::establish(server))
            .await
            .map_err(|_| Error::Connection(format!("Timed out connecting to {}", server.host)))??;

        let (read_half, writer) = tokio::io::split(stream);
        let (sender, lines) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(Self::read_loop(read_half, sender, alive.clone()));

        self.socket = Some(OpenSocket {
            writer,
            lines,
            reader,
            alive,
        });
        Ok(())
    }

    async fn send(&mut self, message: &Message) -> Result<()> {
        check_outbound(message)?;
        let socket = self.socket.as_mut().ok_or(Error::NotConnected)?;
        tracing::trace!(">> {}", message);
        socket.writer.write_all(message.to_line().as_bytes()).await?;
        socket.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Message>> {
        match self.socket.as_mut() {
            Some(socket) => socket.lines.recv().await,
            None => None,
        }
    }

    fn is_connected(&self) -> bool {
        self.socket
            .as_ref()
            .map(|s| s.alive.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            socket.reader.abort();
            if let Err(e) = socket.writer.shutdown().await {
                tracing::debug!("Error shutting down IRC socket: {}", e);
            }
        }
    }
}
