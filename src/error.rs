//! `pgwire` error types.
use std::{backtrace::Backtrace, fmt, io, str::Utf8Error};

use crate::{
    connection::{ConnectionLost, ParseError, SslRequired, TlsUnavailable, Timeout},
    fetch::EmptyQueryError,
    phase::UnsupportedAuth,
    pool::PoolExhausted,
    postgres::{ErrorResponse, ProtocolError, UnsupportedType},
    row::{DecodeError, RowNotFound},
    scram::AuthError,
    transaction::TransactionAborted,
};

/// A specialized [`Result`] type for `pgwire` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `pgwire` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub(crate) fn empty_query() -> Self {
        EmptyQueryError.into()
    }

    pub(crate) fn row_not_found() -> Self {
        RowNotFound.into()
    }
}

/// All possible error kind from `pgwire` library.
pub enum ErrorKind {
    Config(ParseError),
    Protocol(ProtocolError),
    Io(io::Error),
    Database(ErrorResponse),
    Utf8(std::str::Utf8Error),
    RowNotFound(RowNotFound),
    EmptyQuery(EmptyQueryError),
    UnsupportedAuth(UnsupportedAuth),
    Decode(DecodeError),
    Auth(AuthError),
    TlsUnavailable(TlsUnavailable),
    SslRequired(SslRequired),
    /// The connection was dropped by the server or the underlying socket.
    ConnectionLost(ConnectionLost),
    /// An operation was attempted against a transaction that the server
    /// already aborted because of a prior error.
    TransactionAborted(TransactionAborted),
    /// A connect, query or cancel request did not finish before its deadline.
    Timeout(Timeout),
    /// A value's declared oid is not known to the active [`Registry`][crate::postgres::Registry].
    UnsupportedType(UnsupportedType),
    /// The pool could not hand out a connection (e.g. it was closed).
    PoolExhausted(PoolExhausted),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<std::io::Error>e => ErrorKind::Io(e));
from!(<ErrorResponse>e => ErrorKind::Database(e));
from!(<Utf8Error>e => ErrorKind::Utf8(e));
from!(<RowNotFound>e => ErrorKind::RowNotFound(e));
from!(<EmptyQueryError>e => ErrorKind::EmptyQuery(e));
from!(<UnsupportedAuth>e => ErrorKind::UnsupportedAuth(e));

from!(<DecodeError>e => ErrorKind::Decode(e));
from!(<AuthError>e => ErrorKind::Auth(e));
from!(<TlsUnavailable>e => ErrorKind::TlsUnavailable(e));
from!(<SslRequired>e => ErrorKind::SslRequired(e));
from!(<ConnectionLost>e => ErrorKind::ConnectionLost(e));
from!(<TransactionAborted>e => ErrorKind::TransactionAborted(e));
from!(<Timeout>e => ErrorKind::Timeout(e));
from!(<UnsupportedType>e => ErrorKind::UnsupportedType(e));
from!(<PoolExhausted>e => ErrorKind::PoolExhausted(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::UnsupportedAuth(e) => e.fmt(f),
            Self::RowNotFound(e) => e.fmt(f),
            Self::EmptyQuery(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
            Self::Auth(e) => e.fmt(f),
            Self::TlsUnavailable(e) => e.fmt(f),
            Self::SslRequired(e) => e.fmt(f),
            Self::ConnectionLost(e) => e.fmt(f),
            Self::TransactionAborted(e) => e.fmt(f),
            Self::Timeout(e) => e.fmt(f),
            Self::UnsupportedType(e) => e.fmt(f),
            Self::PoolExhausted(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

