//! Postgres configuration.
use std::{borrow::Cow, env::var, fmt, time::Duration};

use crate::{common::ByteStr, phase::StartupConfig};

/// Postgres connection config.
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) user: ByteStr,
    pub(crate) pass: ByteStr,
    #[allow(unused)] // socket used later
    pub(crate) socket: Option<ByteStr>,
    pub(crate) host: ByteStr,
    pub(crate) port: u16,
    pub(crate) dbname: ByteStr,
    pub(crate) ssl_mode: SslMode,
    pub(crate) application_name: Option<ByteStr>,
    pub(crate) client_encoding: ByteStr,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) query_timeout: Option<Duration>,
}

/// Whether and how to require TLS on a connection.
///
/// <https://www.postgresql.org/docs/current/libpq-connect.html#LIBPQ-CONNECT-SSLMODE>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Never attempt TLS.
    #[default]
    Disable,
    /// Require TLS, but do not verify the server certificate.
    Require,
    /// Require TLS and verify the server certificate against a CA.
    VerifyCa,
    /// Require TLS, verify the CA, and verify the server hostname.
    VerifyFull,
}

impl std::str::FromStr for SslMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "disable" => Self::Disable,
            "require" => Self::Require,
            "verify-ca" => Self::VerifyCa,
            "verify-full" => Self::VerifyFull,
            _ => return Err(ParseError { reason: "invalid sslmode".into() }),
        })
    }
}

impl Config {
    /// Retrieve configuration from environment variable.
    ///
    /// It reads:
    /// - `PGUSER`
    /// - `PGPASS`
    /// - `PGHOST`
    /// - `PGDATABASE`
    /// - `PGPORT`
    ///
    /// Additionally, it also read `DATABASE_URL` to provide missing value from
    /// previous variables before fallback to default value.
    pub fn from_env() -> Config {
        let url = var("DATABASE_URL").ok().and_then(|e|Config::parse_inner(e.into()).ok());

        macro_rules! env {
            ($name:literal,$or:ident,$def:expr) => {
                match (var($name),url.as_ref()) {
                    (Ok(ok),_) => ok.into(),
                    (Err(_),Some(e)) => e.$or.clone(),
                    (Err(_),None) => $def.into(),
                }
            };
        }

        let user = env!("PGUSER",user,"postgres");
        let pass = env!("PGPASS",pass,"");
        let host = env!("PGHOST",host,"localhost");
        let dbname = env!("PGDATABASE",dbname,user.clone());
        let socket = url.as_ref().and_then(|e|e.socket.clone());
        let client_encoding = env!("PGCLIENTENCODING",client_encoding,"UTF8");

        let port = match (var("PGPORT"),url.as_ref()) {
            (Ok(ok),_) => ok.parse().unwrap_or(5432),
            (Err(_),Some(e)) => e.port,
            (Err(_),None) => 5432,
        };

        let ssl_mode = match (var("PGSSLMODE"),url.as_ref()) {
            (Ok(ok),_) => ok.parse().unwrap_or_default(),
            (Err(_),Some(e)) => e.ssl_mode,
            (Err(_),None) => SslMode::default(),
        };

        let application_name = match (var("PGAPPNAME"),url.as_ref()) {
            (Ok(ok),_) => Some(ok.into()),
            (Err(_),Some(e)) => e.application_name.clone(),
            (Err(_),None) => None,
        };

        let connect_timeout = match (var("PGCONNECT_TIMEOUT"),url.as_ref()) {
            (Ok(ok),_) => ok.parse().ok().map(Duration::from_secs),
            (Err(_),Some(e)) => e.connect_timeout,
            (Err(_),None) => None,
        };

        Self {
            user, pass, socket, host, port, dbname, ssl_mode,
            application_name, client_encoding,
            connect_timeout, query_timeout: None,
        }
    }

    /// Parse config from url.
    pub fn parse(url: &str) -> Result<Config, ParseError> {
        Self::parse_inner(ByteStr::copy_from_str(url))
    }

    /// Parse config from static strign url.
    ///
    /// This is for micro optimization, see [`Bytes::from_static`][1].
    ///
    /// [1]: bytes::Bytes::from_static
    pub fn parse_static(url: &'static str) -> Result<Config, ParseError> {
        Self::parse_inner(ByteStr::from_static(url))
    }

    fn parse_inner(url: ByteStr) -> Result<Self, ParseError> {
        let mut read = url.as_str();

        macro_rules! eat {
            (@ $delim:literal,$id:tt,$len:literal) => {{
                let Some(idx) = read.find($delim) else {
                    return Err(ParseError { reason: concat!(stringify!($id), " missing").into() })
                };
                let capture = &read[..idx];
                read = &read[idx + $len..];
                url.slice_ref(capture)
            }};
            ($delim:literal,$id:tt) => {
                eat!(@ $delim,$id,1)
            };
            ($delim:literal,$id:tt,$len:literal) => {
                eat!(@ $delim,$id,$len)
            };
        }

        let _scheme = eat!("://", user, 3);
        let user = eat!(':', password);
        let pass = eat!('@', host);
        let host = eat!(':', port);
        let port = eat!('/', dbname);

        let (dbname, ssl_mode, application_name, client_encoding) = match read.find('?') {
            Some(idx) => {
                let dbname = url.slice_ref(&read[..idx]);
                let query = &read[idx + 1..];
                let ssl_mode = query
                    .split('&')
                    .find_map(|kv| kv.strip_prefix("sslmode="))
                    .map(str::parse)
                    .transpose()?
                    .unwrap_or_default();
                let application_name = query
                    .split('&')
                    .find_map(|kv| kv.strip_prefix("application_name="))
                    .map(|v| url.slice_ref(v));
                let client_encoding = query
                    .split('&')
                    .find_map(|kv| kv.strip_prefix("client_encoding="))
                    .map(|v| url.slice_ref(v))
                    .unwrap_or_else(|| "UTF8".into());
                (dbname, ssl_mode, application_name, client_encoding)
            }
            None => (url.slice_ref(read), SslMode::default(), None, "UTF8".into()),
        };

        let Ok(port) = port.parse() else {
            return Err(ParseError { reason: "invalid port".into() })
        };

        Ok(Self {
            user, pass, host, port, dbname, socket: None, ssl_mode,
            application_name, client_encoding,
            connect_timeout: None, query_timeout: None,
        })
    }

    /// The configured TLS requirement, `disable` unless the url/environment said otherwise.
    pub fn ssl_mode(&self) -> SslMode {
        self.ssl_mode
    }

    /// Override the TLS requirement.
    pub fn set_ssl_mode(&mut self, ssl_mode: SslMode) {
        self.ssl_mode = ssl_mode;
    }

    /// The `application_name` reported to the server, if set.
    pub fn application_name(&self) -> Option<&str> {
        self.application_name.as_deref()
    }

    /// Set the `application_name` reported to the server.
    pub fn set_application_name(&mut self, application_name: impl Into<ByteStr>) {
        self.application_name = Some(application_name.into());
    }

    /// The client-side character encoding requested from the server. Defaults to `UTF8`.
    pub fn client_encoding(&self) -> &str {
        &self.client_encoding
    }

    /// Set the client-side character encoding requested from the server.
    pub fn set_client_encoding(&mut self, client_encoding: impl Into<ByteStr>) {
        self.client_encoding = client_encoding.into();
    }

    /// How long to wait for the initial connection and startup handshake before failing.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Set how long to wait for the initial connection and startup handshake.
    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = Some(timeout);
    }

    /// How long to wait for a single query to complete before cancelling it.
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }

    /// Set how long to wait for a single query to complete before cancelling it.
    pub fn set_query_timeout(&mut self, timeout: Duration) {
        self.query_timeout = Some(timeout);
    }
}

impl<'a> From<&'a Config> for StartupConfig<'a> {
    fn from(me: &'a Config) -> StartupConfig<'a> {
        StartupConfig {
            user: me.user.as_str().into(),
            database: Some(me.dbname.as_str().into()),
            password: Some(me.pass.as_str().into()),
            replication: None,
            application_name: me.application_name.as_deref().map(Cow::Borrowed),
            client_encoding: Some(me.client_encoding.as_str().into()),
        }
    }
}

impl std::str::FromStr for Config {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Error when parsing url.
pub struct ParseError {
    pub(crate) reason: Cow<'static,str>,
}

impl std::error::Error for ParseError { }

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            return f.write_str(&self.reason)
        }
        write!(f, "failed to parse url: {}", self.reason)
    }
}

impl fmt::Debug for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

