//! The [`Connection`] type, a single session against a postgres backend.
pub mod config;

use bytes::{Buf, Bytes, BytesMut};
use lru::LruCache;
use std::{
    future::Future,
    io,
    num::NonZeroUsize,
    task::{Context, Poll, ready},
};

pub use config::{Config, ParseError, SslMode};

use crate::{
    ErrorKind, Result,
    common::{trace, unit_error},
    net::Socket,
    phase::{self, StartupResponse},
    postgres::{BackendProtocol, FrontendProtocol, Registry, backend, frontend},
    statement::CachedStatement,
    transport::{PgTransport, PgTransportExt},
};

const STMT_CACHE_SIZE: usize = 24;

unit_error! {
    /// The server requested a TLS upgrade this build cannot perform.
    ///
    /// Only built with the `tls-rustls` feature; without it, `ssl_mode != disable`
    /// connections fail as soon as the server agrees to upgrade.
    pub struct TlsUnavailable("server requires TLS, no connector configured");
}

unit_error! {
    /// `ssl_mode` required encryption but the server declined it.
    pub struct SslRequired("ssl_mode requires TLS but server refused to negotiate");
}

unit_error! {
    /// The server closed the connection, or the socket otherwise reached EOF
    /// mid-message.
    pub struct ConnectionLost("connection closed by the server");
}

unit_error! {
    /// A connect, query or cancel request did not complete before its configured deadline.
    pub struct Timeout("operation timed out");
}

/// A single session against a postgres backend.
///
/// Owns the transport, the send/receive buffers, and the per-connection
/// prepared statement cache.
pub struct Connection {
    socket: Socket,
    wbuf: BytesMut,
    rbuf: BytesMut,
    /// Set after an `ErrorResponse`, or explicitly via [`PgTransport::ready_request`]:
    /// frames are silently discarded until the next `ReadyForQuery`.
    discard_until_ready: bool,
    stmt_cache: LruCache<u64, CachedStatement>,
    backend_key_data: Option<backend::BackendKeyData>,
    registry: Registry,
    config: Config,
    deadline: Option<std::pin::Pin<Box<tokio::time::Sleep>>>,
    query_count: u32,
    created_at: std::time::Instant,
    session_uses: u32,
}

impl Connection {
    /// Connect using configuration read from the environment.
    ///
    /// See [`Config::from_env`] for the recognized variables.
    pub async fn connect_env() -> Result<Self> {
        Self::connect_with(Config::from_env()).await
    }

    /// Connect to `url`, a `postgres://` connection string.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(Config::parse(url)?).await
    }

    /// Connect using an already built [`Config`], using a default [`Registry`].
    pub async fn connect_with(config: Config) -> Result<Self> {
        Self::connect_with_registry(config, Registry::new()).await
    }

    /// Connect using an already built [`Config`] and a caller-supplied [`Registry`],
    /// e.g. one with extra domain/enum oids registered.
    pub async fn connect_with_registry(config: Config, registry: Registry) -> Result<Self> {
        match config.connect_timeout {
            Some(d) => match tokio::time::timeout(d, Self::connect_inner(config, registry)).await {
                Ok(result) => result,
                Err(_) => Err(Timeout.into()),
            },
            None => Self::connect_inner(config, registry).await,
        }
    }

    async fn connect_inner(config: Config, registry: Registry) -> Result<Self> {
        let socket = Socket::connect(&config.host, config.port).await?;

        let mut conn = Self {
            socket,
            wbuf: BytesMut::with_capacity(4096),
            rbuf: BytesMut::with_capacity(4096),
            discard_until_ready: false,
            stmt_cache: LruCache::new(NonZeroUsize::new(STMT_CACHE_SIZE).unwrap()),
            backend_key_data: None,
            registry,
            config: config.clone(),
            deadline: None,
            query_count: 0,
            created_at: std::time::Instant::now(),
            session_uses: 0,
        };

        if config.ssl_mode != SslMode::Disable {
            conn.negotiate_ssl().await?;
        }

        let StartupResponse { backend_key_data } = phase::startup(&config, &mut conn).await?;
        conn.backend_key_data = Some(backend_key_data);

        Ok(conn)
    }

    /// Send `SSLRequest` and read the server's one byte `S`/`N` reply, upgrading
    /// the socket to TLS when the server agrees and the `tls-rustls` feature is built.
    ///
    /// <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-SSL>
    async fn negotiate_ssl(&mut self) -> Result<()> {
        frontend::SslRequest.write(&mut self.wbuf);
        self.flush().await?;

        let byte = std::future::poll_fn(|cx| self.poll_ssl_reply(cx)).await?;

        match byte {
            b'S' => {
                #[cfg(feature = "tls-rustls")]
                {
                    let host = self.config.host.to_string();
                    self.socket.upgrade_tls(&host).await?;
                    Ok(())
                }
                #[cfg(not(feature = "tls-rustls"))]
                Err(TlsUnavailable.into())
            },
            b'N' => Err(SslRequired.into()),
            _ => Err(ErrorKind::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "unexpected byte in SSLRequest reply",
            ))
            .into()),
        }
    }

    fn poll_ssl_reply(&mut self, cx: &mut Context) -> Poll<Result<u8>> {
        loop {
            if !self.rbuf.is_empty() {
                let byte = self.rbuf[0];
                self.rbuf.advance(1);
                return Poll::Ready(Ok(byte));
            }
            let n = ready!(crate::io::poll_read(&mut self.socket, cx, &mut self.rbuf)?);
            if n == 0 {
                return Poll::Ready(Err(ConnectionLost.into()));
            }
        }
    }

    /// Read a full frame, returning its type tag and body (the bytes after
    /// the 4-byte length field).
    fn poll_frame(&mut self, cx: &mut Context) -> Poll<Result<(u8, Bytes)>> {
        loop {
            if self.rbuf.len() >= 5 {
                let len = u32::from_be_bytes(self.rbuf[1..5].try_into().unwrap()) as usize;
                let total = 1 + len;
                if self.rbuf.len() >= total {
                    let mut frame = self.rbuf.split_to(total);
                    let tag = frame[0];
                    frame.advance(5);
                    return Poll::Ready(Ok((tag, frame.freeze())));
                }
            }

            let n = ready!(crate::io::poll_read(&mut self.socket, cx, &mut self.rbuf)?);
            if n == 0 {
                return Poll::Ready(Err(ConnectionLost.into()));
            }
        }
    }

    /// Cheap liveness check used by the pool for connection healthchecks.
    ///
    /// A connection only ever becomes unhealthy via a fatal IO error, which
    /// the next [`PgTransport`] call surfaces directly, so this currently
    /// never blocks.
    pub(crate) fn poll_ready(&mut self, _cx: &mut Context) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    /// Close this connection's backend session, sending `Terminate` first.
    pub(crate) fn poll_shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        self.send(frontend::Terminate);
        let _ = ready!(self.poll_flush(cx));
        std::pin::Pin::new(&mut self.socket).poll_shutdown(cx)
    }

    /// Open a second, short-lived connection and send `CancelRequest` for
    /// this session's backend process.
    ///
    /// <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-CANCELING-REQUESTS>
    pub async fn cancel(&self, config: &Config) -> Result<()> {
        let Some(key_data) = self.backend_key_data else {
            return Ok(());
        };
        Self::send_cancel(config, key_data).await
    }

    /// Number of simple/extended queries executed on this connection so far.
    pub(crate) fn query_count(&self) -> u32 {
        self.query_count
    }

    /// How long ago this connection was established.
    pub(crate) fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Number of times this connection has been checked out of a pool.
    pub(crate) fn session_uses(&self) -> u32 {
        self.session_uses
    }

    /// Record that this connection was just handed out to a caller.
    pub(crate) fn mark_checked_out(&mut self) {
        self.session_uses += 1;
    }

    /// Open a second, short-lived connection and send `CancelRequest` carrying
    /// `key_data`, without needing a live `Connection` handle.
    async fn send_cancel(config: &Config, key_data: backend::BackendKeyData) -> Result<()> {
        let mut socket = Socket::connect(&config.host, config.port).await?;
        let mut buf = BytesMut::with_capacity(16);
        frontend::CancelRequest { process_id: key_data.process_id, secret_key: key_data.secret_key }
            .write(&mut buf);

        std::future::poll_fn(|cx| crate::io::poll_write_all(&mut socket, cx, &mut buf)).await?;
        Ok(())
    }
}

impl PgTransport for Connection {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        crate::io::poll_write_all(&mut self.socket, cx, &mut self.wbuf)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        if let Some(deadline) = self.deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                self.deadline = None;
                self.discard_until_ready = true;
                if let Some(key_data) = self.backend_key_data {
                    let config = self.config.clone();
                    tokio::spawn(async move {
                        let _ = Connection::send_cancel(&config, key_data).await;
                    });
                }
                return Poll::Ready(Err(Timeout.into()));
            }
        }

        ready!(self.poll_flush(cx)?);

        loop {
            let (tag, body) = ready!(self.poll_frame(cx)?);

            if tag == b'Z' {
                self.deadline = None;
            }

            if self.discard_until_ready {
                if tag == b'Z' {
                    self.discard_until_ready = false;
                }
                continue;
            }

            match tag {
                b'N' => {
                    let _notice = backend::NoticeResponse::decode(tag, body)?;
                    trace!("NoticeResponse: {_notice}");
                }
                b'S' => {
                    let _status = backend::ParameterStatus::decode(tag, body)?;
                    trace!("ParameterStatus: {}={}", _status.name, _status.value);
                }
                b'E' => {
                    let err = backend::ErrorResponse::decode(tag, body)?;
                    self.discard_until_ready = true;
                    return Poll::Ready(Err(err.into()));
                }
                _ => return Poll::Ready(Ok(B::decode(tag, body)?)),
            }
        }
    }

    fn ready_request(&mut self) {
        self.discard_until_ready = true;
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        if matches!(F::MSGTYPE, b'Q' | b'E') {
            self.query_count += 1;
            if let Some(timeout) = self.config.query_timeout {
                self.deadline = Some(Box::pin(tokio::time::sleep(timeout)));
            }
        }
        frontend::write(message, &mut self.wbuf);
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        startup.write(&mut self.wbuf);
    }

    fn get_stmt(&mut self, sql: u64) -> Option<CachedStatement> {
        self.stmt_cache.get(&sql).cloned()
    }

    fn add_stmt(&mut self, sql: u64, stmt: CachedStatement) {
        self.stmt_cache.put(sql, stmt);
    }

    fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("backend_key_data", &self.backend_key_data)
            .field("stmt_cache_len", &self.stmt_cache.len())
            .finish()
    }
}
