//! Transport-level socket abstraction.
use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

/// A connected socket: a regular TCP stream, (on unix, for localhost
/// connections) a unix domain socket, or, once upgraded, a TLS session over
/// one of the above.
pub struct Socket {
    kind: Kind,
}

enum Kind {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    #[cfg(feature = "tls-rustls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
    /// Only observed transiently inside [`Socket::upgrade_tls`].
    #[cfg(feature = "tls-rustls")]
    Empty,
}

impl Socket {
    /// Connect via TCP.
    pub async fn connect_tcp(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Self { kind: Kind::Tcp(stream) })
    }

    /// Connect via a unix domain socket at `path`.
    #[cfg(unix)]
    pub async fn connect_unix(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self { kind: Kind::Unix(stream) })
    }

    /// The conventional postgres unix socket path for `port` under `/run/postgresql`.
    #[cfg(unix)]
    pub fn unix_socket_path(port: u16) -> std::path::PathBuf {
        std::path::PathBuf::from(format!("/run/postgresql/.s.PGSQL.{port}"))
    }

    /// Connect to `host:port`, preferring the unix domain socket when `host`
    /// is `localhost` and the socket file exists, falling back to TCP.
    pub async fn connect(host: &str, port: u16) -> io::Result<Self> {
        #[cfg(unix)]
        {
            if host == "localhost" || host == "127.0.0.1" {
                let path = Self::unix_socket_path(port);
                if path.exists() {
                    return Self::connect_unix(path).await;
                }
            }
        }
        Self::connect_tcp(host, port).await
    }

    /// Upgrade an established TCP socket to TLS, per the `SSLRequest` flow.
    ///
    /// Only available when the `tls-rustls` feature is enabled; returns an
    /// error for unix-domain sockets (postgres never requests TLS on them).
    #[cfg(feature = "tls-rustls")]
    pub(crate) async fn upgrade_tls(&mut self, host: &str) -> io::Result<()> {
        use rustls::pki_types::ServerName;

        let Kind::Tcp(tcp) = std::mem::replace(&mut self.kind, Kind::Empty) else {
            return Err(io::Error::other("TLS upgrade is only supported for tcp sockets"));
        };

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let stream = tls_connector()?.connect(server_name, tcp).await?;
        self.kind = Kind::Tls(Box::new(stream));
        Ok(())
    }
}

#[cfg(feature = "tls-rustls")]
fn tls_connector() -> io::Result<tokio_rustls::TlsConnector> {
    use std::sync::{Arc, OnceLock};

    static CONFIG: OnceLock<Arc<rustls::ClientConfig>> = OnceLock::new();
    let config = CONFIG.get_or_init(|| {
        let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        )
    });

    Ok(tokio_rustls::TlsConnector::from(config.clone()))
}

impl AsyncRead for Socket {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().kind {
            Kind::Tcp(io) => Pin::new(io).poll_read(cx, buf),
            #[cfg(unix)]
            Kind::Unix(io) => Pin::new(io).poll_read(cx, buf),
            #[cfg(feature = "tls-rustls")]
            Kind::Tls(io) => Pin::new(io.as_mut()).poll_read(cx, buf),
            #[cfg(feature = "tls-rustls")]
            Kind::Empty => unreachable!("socket temporarily taken for tls upgrade"),
        }
    }
}

impl AsyncWrite for Socket {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().kind {
            Kind::Tcp(io) => Pin::new(io).poll_write(cx, buf),
            #[cfg(unix)]
            Kind::Unix(io) => Pin::new(io).poll_write(cx, buf),
            #[cfg(feature = "tls-rustls")]
            Kind::Tls(io) => Pin::new(io.as_mut()).poll_write(cx, buf),
            #[cfg(feature = "tls-rustls")]
            Kind::Empty => unreachable!("socket temporarily taken for tls upgrade"),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().kind {
            Kind::Tcp(io) => Pin::new(io).poll_write_vectored(cx, bufs),
            #[cfg(unix)]
            Kind::Unix(io) => Pin::new(io).poll_write_vectored(cx, bufs),
            #[cfg(feature = "tls-rustls")]
            Kind::Tls(io) => Pin::new(io.as_mut()).poll_write_vectored(cx, bufs),
            #[cfg(feature = "tls-rustls")]
            Kind::Empty => unreachable!("socket temporarily taken for tls upgrade"),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match &self.kind {
            Kind::Tcp(io) => io.is_write_vectored(),
            #[cfg(unix)]
            Kind::Unix(io) => io.is_write_vectored(),
            #[cfg(feature = "tls-rustls")]
            Kind::Tls(io) => io.get_ref().0.is_write_vectored(),
            #[cfg(feature = "tls-rustls")]
            Kind::Empty => unreachable!("socket temporarily taken for tls upgrade"),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().kind {
            Kind::Tcp(io) => Pin::new(io).poll_flush(cx),
            #[cfg(unix)]
            Kind::Unix(io) => Pin::new(io).poll_flush(cx),
            #[cfg(feature = "tls-rustls")]
            Kind::Tls(io) => Pin::new(io.as_mut()).poll_flush(cx),
            #[cfg(feature = "tls-rustls")]
            Kind::Empty => unreachable!("socket temporarily taken for tls upgrade"),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().kind {
            Kind::Tcp(io) => Pin::new(io).poll_shutdown(cx),
            #[cfg(unix)]
            Kind::Unix(io) => Pin::new(io).poll_shutdown(cx),
            #[cfg(feature = "tls-rustls")]
            Kind::Tls(io) => Pin::new(io.as_mut()).poll_shutdown(cx),
            #[cfg(feature = "tls-rustls")]
            Kind::Empty => unreachable!("socket temporarily taken for tls upgrade"),
        }
    }
}
