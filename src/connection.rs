//! A single TCP connection to an SSDB server.
//!
//! A connection owns its socket, an incremental frame parser, and an
//! optional already-parsed frame parked by the idle probe. Exactly one
//! request may be in flight at a time; the pool's lease protocol enforces
//! that a connection is never shared between concurrent callers.

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpSocket, TcpStream};

use crate::error::{Result, SsdbError};
use crate::protocol::{encode_request, Arg, Frame, FrameParser};

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default server port.
pub const DEFAULT_PORT: u16 = 7036;

/// Default size of a single socket read.
pub const DEFAULT_RECV_CHUNK: usize = 65536;

/// Connection settings shared by every connection a pool creates.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server hostname or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Password for the `auth` handshake right after connecting.
    pub password: Option<String>,
    /// Enable TCP keepalive (and SO_REUSEADDR) on new sockets.
    pub keepalive: bool,
    /// Maximum bytes pulled from the socket per read.
    pub recv_chunk: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            password: None,
            keepalive: false,
            recv_chunk: DEFAULT_RECV_CHUNK,
        }
    }
}

/// Outcome of a non-blocking liveness probe on an idle connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleProbe {
    /// Nothing buffered and nothing readable: safe to send.
    Idle,
    /// A frame or raw bytes arrived unsolicited; the previous response
    /// was not fully drained and the connection should be recycled.
    DataPresent,
}

/// A TCP connection with its receive parser.
#[derive(Debug)]
pub struct Connection {
    config: ConnectionConfig,
    stream: Option<TcpStream>,
    parser: FrameParser,
    pending: Option<Frame>,
    owning_pid: u32,
}

impl Connection {
    /// Create an unconnected connection. The socket opens lazily on
    /// [`connect`](Self::connect).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            stream: None,
            parser: FrameParser::new(),
            pending: None,
            owning_pid: std::process::id(),
        }
    }

    /// Whether a socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// PID of the process that created this connection.
    pub(crate) fn owning_pid(&self) -> u32 {
        self.owning_pid
    }

    /// Open the socket and run the `auth` handshake if configured.
    /// Returns immediately when already connected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = self.open_stream().await?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        tracing::debug!(
            host = %self.config.host,
            port = self.config.port,
            "connected"
        );
        if let Some(password) = self.config.password.clone() {
            if let Err(err) = self.authenticate(&password).await {
                let _ = self.disconnect().await;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn open_stream(&self) -> Result<TcpStream> {
        let mut last_err: Option<io::Error> = None;
        let addrs = lookup_host((self.config.host.as_str(), self.config.port)).await?;
        for addr in addrs {
            match self.connect_addr(addr).await {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err
            .unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
            })
            .into())
    }

    async fn connect_addr(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if self.config.keepalive {
            socket.set_keepalive(true)?;
            socket.set_reuseaddr(true)?;
        }
        socket.connect(addr).await
    }

    async fn authenticate(&mut self, password: &str) -> Result<()> {
        self.send("auth", &[Arg::from(password)])
            .await
            .map_err(|err| SsdbError::Auth(err.to_string()))?;
        let frame = self
            .read_response()
            .await
            .map_err(|err| SsdbError::Auth(err.to_string()))?;
        match frame.status() {
            Some(status) if status == b"ok" => Ok(()),
            Some(status) => Err(SsdbError::Auth(
                String::from_utf8_lossy(status).into_owned(),
            )),
            None => Err(SsdbError::Auth("empty auth response".into())),
        }
    }

    /// Encode and write one request. Any write failure closes the socket
    /// before propagating.
    pub async fn send(&mut self, cmd: &str, args: &[Arg]) -> Result<()> {
        // A parked probe frame means the previous response was never
        // drained; the lease protocol recycles such connections before
        // they reach a send.
        debug_assert!(self.pending.is_none());
        let wire = encode_request(cmd, args);
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(not_connected)?;
        if let Err(err) = stream.write_all(&wire).await {
            let _ = self.disconnect().await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Read one response frame, serving a probe-parked frame first.
    pub async fn read_response(&mut self) -> Result<Frame> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        let mut chunk = vec![0u8; self.config.recv_chunk.max(1)];
        loop {
            match self.parser.try_parse() {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {}
                Err(err) => {
                    let _ = self.disconnect().await;
                    return Err(err);
                }
            }
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(not_connected)?;
            let n = match stream.read(&mut chunk).await {
                Ok(n) => n,
                Err(err) => {
                    let _ = self.disconnect().await;
                    return Err(err.into());
                }
            };
            if n == 0 {
                let _ = self.disconnect().await;
                return Err(SsdbError::ConnectionClosed);
            }
            if let Err(err) = self.parser.feed(&chunk[..n]) {
                let _ = self.disconnect().await;
                return Err(err);
            }
        }
    }

    /// Non-blocking check that the connection is truly idle.
    ///
    /// Leftover buffered bytes or readable socket data mean the previous
    /// response was not fully consumed; a parsed frame is parked so the
    /// next [`read_response`](Self::read_response) still sees it.
    pub async fn probe_idle(&mut self) -> Result<IdleProbe> {
        if self.pending.is_none() {
            match self.parser.try_parse() {
                Ok(frame) => self.pending = frame,
                Err(err) => {
                    let _ = self.disconnect().await;
                    return Err(err);
                }
            }
        }
        if self.pending.is_some() {
            return Ok(IdleProbe::DataPresent);
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(not_connected)?;
        let mut chunk = vec![0u8; self.config.recv_chunk.max(1)];
        match stream.try_read(&mut chunk) {
            Ok(0) => {
                let _ = self.disconnect().await;
                Err(SsdbError::ConnectionClosed)
            }
            Ok(n) => {
                tracing::warn!(bytes = n, "unexpected data on idle connection");
                self.parser.feed(&chunk[..n])?;
                Ok(IdleProbe::DataPresent)
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(IdleProbe::Idle),
            Err(err) => {
                let _ = self.disconnect().await;
                Err(err.into())
            }
        }
    }

    /// Close the socket. Idempotent. An orderly shutdown is attempted
    /// only in the process that created the connection; a forked child
    /// merely drops its copy of the descriptor so the parent's socket
    /// stays usable.
    pub async fn disconnect(&mut self) -> io::Result<()> {
        let result = match self.stream.take() {
            Some(mut stream) => {
                if self.owning_pid == std::process::id() {
                    tracing::debug!(
                        host = %self.config.host,
                        port = self.config.port,
                        "disconnecting"
                    );
                    stream.shutdown().await
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        };
        self.parser.reset();
        self.pending = None;
        result
    }
}

fn not_connected() -> SsdbError {
    SsdbError::Io(io::Error::new(
        io::ErrorKind::NotConnected,
        "connection is not open",
    ))
}
