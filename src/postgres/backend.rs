//! Backend (server to client) message types.
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::{Buf, Bytes};
use std::{borrow::Cow, fmt};

use crate::{common::ByteStr, ext::{BytesExt, NulError}};

/// A message decoded from the backend, dispatched on its 1-byte type tag.
pub trait BackendProtocol: Sized {
    /// Decode `body` (the bytes following the 4-byte length field) given
    /// the message's type tag.
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError>;
}

macro_rules! assert_msgtype {
    ($msgtype:expr, $expect:literal, $name:expr) => {
        if $msgtype != $expect {
            return Err(ProtocolError::unexpected($msgtype, $name));
        }
    };
}

macro_rules! unit_msg {
    ($(#[$meta:meta])* $name:ident = $tag:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl BackendProtocol for $name {
            fn decode(msgtype: u8, _body: Bytes) -> Result<Self, ProtocolError> {
                assert_msgtype!(msgtype, $tag, stringify!($name));
                Ok($name)
            }
        }
    };
}

unit_msg!(
    /// Response to a successful `Bind`.
    BindComplete = b'2'
);
unit_msg!(
    /// Response to a successful statement or portal `Close`.
    CloseComplete = b'3'
);
unit_msg!(
    /// The simple query string was empty.
    EmptyQueryResponse = b'I'
);
unit_msg!(
    /// `Describe` on a portal whose statement returns no rows.
    NoData = b'n'
);
unit_msg!(
    /// Response to a successful `Parse`.
    ParseComplete = b'1'
);
unit_msg!(
    /// `Execute` hit its row limit before the portal was exhausted.
    PortalSuspended = b's'
);

/// `AuthenticationXXX`, one of the authentication request messages.
///
/// <https://www.postgresql.org/docs/current/protocol-message-formats.html#PROTOCOL-MESSAGE-FORMATS-AUTHENTICATIONSASL>
#[derive(Debug)]
pub enum Authentication {
    /// Authentication succeeded.
    Ok,
    KerberosV5,
    CleartextPassword,
    Md5Password { salt: [u8; 4] },
    ScmCredential,
    Gss,
    GssContinue { data: Bytes },
    Sspi,
    /// Server offers one or more SASL mechanisms, preference ordered.
    Sasl { mechanisms: Vec<ByteStr> },
    /// SASL mechanism-specific data for the next challenge/response step.
    SaslContinue { data: Bytes },
    /// SASL exchange is complete, carries the server's final verification data.
    SaslFinal { data: Bytes },
}

impl BackendProtocol for Authentication {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype, b'R', "Authentication");

        Ok(match body.get_i32() {
            0 => Self::Ok,
            2 => Self::KerberosV5,
            3 => Self::CleartextPassword,
            5 => {
                if body.remaining() < 4 {
                    return Err(ProtocolError::unexpected(msgtype, "AuthenticationMD5Password salt"));
                }
                let mut salt = [0u8; 4];
                body.copy_to_slice(&mut salt);
                Self::Md5Password { salt }
            }
            6 => Self::ScmCredential,
            7 => Self::Gss,
            8 => Self::GssContinue { data: body },
            9 => Self::Sspi,
            10 => {
                let mut mechanisms = Vec::new();
                while !body.is_empty() {
                    let name = body.get_nul_bytestr()?;
                    if name.is_empty() {
                        break;
                    }
                    mechanisms.push(name);
                }
                Self::Sasl { mechanisms }
            }
            11 => Self::SaslContinue { data: body },
            12 => Self::SaslFinal { data: body },
            code => return Err(ProtocolError::message(format!("unknown authentication code {code}"))),
        })
    }
}

/// `BackendKeyData`, cancellation credentials for this session.
#[derive(Debug, Clone, Copy)]
pub struct BackendKeyData {
    pub process_id: i32,
    pub secret_key: i32,
}

impl BackendProtocol for BackendKeyData {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype, b'K', "BackendKeyData");
        Ok(Self { process_id: body.get_i32(), secret_key: body.get_i32() })
    }
}

/// `ParameterStatus`, a `GUC` value reported by the backend.
#[derive(Debug, Clone)]
pub struct ParameterStatus {
    pub name: ByteStr,
    pub value: ByteStr,
}

impl BackendProtocol for ParameterStatus {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype, b'S', "ParameterStatus");
        let name = body.get_nul_bytestr()?;
        let value = body.get_nul_bytestr()?;
        Ok(Self { name, value })
    }
}

/// `RowDescription`, kept as raw bytes and lazily parsed by [`Row`][crate::row::Row].
#[derive(Debug, Clone)]
pub struct RowDescription {
    pub body: Bytes,
}

impl BackendProtocol for RowDescription {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype, b'T', "RowDescription");
        Ok(Self { body })
    }
}

/// `DataRow`, kept as raw bytes and lazily parsed by [`Row`][crate::row::Row].
#[derive(Debug, Clone)]
pub struct DataRow {
    pub body: Bytes,
}

impl BackendProtocol for DataRow {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype, b'D', "DataRow");
        Ok(Self { body })
    }
}

/// `CommandComplete`, carries the command tag, e.g. `"UPDATE 4"`.
#[derive(Debug, Clone)]
pub struct CommandComplete {
    pub tag: ByteStr,
}

impl BackendProtocol for CommandComplete {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype, b'C', "CommandComplete");
        Ok(Self { tag: body.get_nul_bytestr()? })
    }
}

/// `ReadyForQuery`, marks the boundary between query cycles.
#[derive(Debug, Clone, Copy)]
pub struct ReadyForQuery {
    /// `b'I'` idle, `b'T'` in a transaction block, `b'E'` in a failed transaction block.
    pub tx_status: u8,
}

impl BackendProtocol for ReadyForQuery {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype, b'Z', "ReadyForQuery");
        Ok(Self { tx_status: body.get_u8() })
    }
}

/// `NegotiateProtocolVersion`, server does not support the requested minor
/// protocol version or some requested startup options.
#[derive(Debug, Clone)]
pub struct NegotiateProtocolVersion {
    pub minor_version: i32,
    pub unrecognized_options: Vec<ByteStr>,
}

impl BackendProtocol for NegotiateProtocolVersion {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype, b'v', "NegotiateProtocolVersion");
        let minor_version = body.get_i32();
        let count = body.get_i32();
        let mut unrecognized_options = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            unrecognized_options.push(body.get_nul_bytestr()?);
        }
        Ok(Self { minor_version, unrecognized_options })
    }
}

/// `ParameterDescription`, parameter oids inferred for a prepared statement.
#[derive(Debug, Clone)]
pub struct ParameterDescription {
    pub oids: Vec<u32>,
}

impl BackendProtocol for ParameterDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype, b't', "ParameterDescription");
        let count = body.get_i16();
        let mut oids = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            oids.push(body.get_u32());
        }
        Ok(Self { oids })
    }
}

/// Parsed fields shared by `ErrorResponse` and `NoticeResponse`.
///
/// <https://www.postgresql.org/docs/current/protocol-error-fields.html>
#[derive(Debug, Clone)]
pub struct ErrorFields {
    pub severity: ByteStr,
    pub code: ByteStr,
    pub message: ByteStr,
    pub detail: Option<ByteStr>,
    pub hint: Option<ByteStr>,
    pub position: Option<ByteStr>,
    pub where_: Option<ByteStr>,
    pub constraint: Option<ByteStr>,
}

fn parse_fields(mut body: Bytes) -> Result<ErrorFields, ProtocolError> {
    let mut severity = None;
    let mut code = None;
    let mut message = None;
    let mut detail = None;
    let mut hint = None;
    let mut position = None;
    let mut where_ = None;
    let mut constraint = None;

    loop {
        let field = body.get_u8();
        if field == 0 {
            break;
        }
        let value = body.get_nul_bytestr()?;
        match field {
            b'S' => severity = Some(value),
            b'C' => code = Some(value),
            b'M' => message = Some(value),
            b'D' => detail = Some(value),
            b'H' => hint = Some(value),
            b'P' => position = Some(value),
            b'W' => where_ = Some(value),
            b'n' => constraint = Some(value),
            _ => { /* unrecognized field, ignore per protocol */ }
        }
    }

    Ok(ErrorFields {
        severity: severity.unwrap_or_else(|| ByteStr::from_static("ERROR")),
        code: code.unwrap_or_else(|| ByteStr::from_static("XX000")),
        message: message.unwrap_or_else(|| ByteStr::from_static("")),
        detail,
        hint,
        position,
        where_,
        constraint,
    })
}

/// `ErrorResponse`, the backend is terminating the current command/connection.
#[derive(Debug, Clone)]
pub struct ErrorResponse(pub ErrorFields);

impl BackendProtocol for ErrorResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype, b'E', "ErrorResponse");
        Ok(Self(parse_fields(body)?))
    }
}

impl std::error::Error for ErrorResponse {}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.0.severity, self.0.message, self.0.code)
    }
}

/// `NoticeResponse`, informational, never fatal to the current command.
#[derive(Debug, Clone)]
pub struct NoticeResponse(pub ErrorFields);

impl BackendProtocol for NoticeResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype, b'N', "NoticeResponse");
        Ok(Self(parse_fields(body)?))
    }
}

impl fmt::Display for NoticeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.0.severity, self.0.message)
    }
}

/// Any backend message, dispatched on its type tag.
///
/// `ErrorResponse` and `NoticeResponse` normally never reach this enum:
/// the transport layer intercepts them before handing control back to
/// the caller (see [`PgTransport::poll_recv`][crate::transport::PgTransport::poll_recv]).
#[derive(Debug)]
pub enum BackendMessage {
    Authentication(Authentication),
    BackendKeyData(BackendKeyData),
    BindComplete(BindComplete),
    CloseComplete(CloseComplete),
    CommandComplete(CommandComplete),
    DataRow(DataRow),
    EmptyQueryResponse(EmptyQueryResponse),
    ErrorResponse(ErrorResponse),
    NegotiateProtocolVersion(NegotiateProtocolVersion),
    NoData(NoData),
    NoticeResponse(NoticeResponse),
    ParameterDescription(ParameterDescription),
    ParameterStatus(ParameterStatus),
    ParseComplete(ParseComplete),
    PortalSuspended(PortalSuspended),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
}

macro_rules! match_backend {
    ($msgtype:expr, $body:expr, { $($tag:literal => $variant:ident),* $(,)? }) => {
        match $msgtype {
            $($tag => Self::$variant($variant::decode($msgtype, $body)?),)*
            _ => return Err(ProtocolError::message(format!("unknown backend message tag {:?}", $msgtype as char))),
        }
    };
}

impl BackendProtocol for BackendMessage {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        Ok(match_backend!(msgtype, body, {
            b'R' => Authentication,
            b'K' => BackendKeyData,
            b'2' => BindComplete,
            b'3' => CloseComplete,
            b'C' => CommandComplete,
            b'D' => DataRow,
            b'I' => EmptyQueryResponse,
            b'E' => ErrorResponse,
            b'v' => NegotiateProtocolVersion,
            b'n' => NoData,
            b'N' => NoticeResponse,
            b't' => ParameterDescription,
            b'S' => ParameterStatus,
            b'1' => ParseComplete,
            b's' => PortalSuspended,
            b'Z' => ReadyForQuery,
            b'T' => RowDescription,
        }))
    }
}

impl BackendMessage {
    /// Build an error describing this message as unexpected in `context`.
    pub fn unexpected(&self, context: &str) -> ProtocolError {
        let name = match self {
            Self::Authentication(_) => "Authentication",
            Self::BackendKeyData(_) => "BackendKeyData",
            Self::BindComplete(_) => "BindComplete",
            Self::CloseComplete(_) => "CloseComplete",
            Self::CommandComplete(_) => "CommandComplete",
            Self::DataRow(_) => "DataRow",
            Self::EmptyQueryResponse(_) => "EmptyQueryResponse",
            Self::ErrorResponse(_) => "ErrorResponse",
            Self::NegotiateProtocolVersion(_) => "NegotiateProtocolVersion",
            Self::NoData(_) => "NoData",
            Self::NoticeResponse(_) => "NoticeResponse",
            Self::ParameterDescription(_) => "ParameterDescription",
            Self::ParameterStatus(_) => "ParameterStatus",
            Self::ParseComplete(_) => "ParseComplete",
            Self::PortalSuspended(_) => "PortalSuspended",
            Self::ReadyForQuery(_) => "ReadyForQuery",
            Self::RowDescription(_) => "RowDescription",
        };
        ProtocolError::message(format!("unexpected {name} during {context}"))
    }
}

/// An error while decoding a backend message.
pub struct ProtocolError {
    reason: Cow<'static, str>,
}

impl ProtocolError {
    pub(crate) fn unexpected(msgtype: u8, context: &str) -> Self {
        Self {
            reason: format!("unexpected message {:?} ({msgtype:#x}) during {context}", msgtype as char).into(),
        }
    }

    pub(crate) fn message(reason: String) -> Self {
        Self { reason: reason.into() }
    }
}

impl From<NulError> for ProtocolError {
    fn from(e: NulError) -> Self {
        Self { reason: format!("malformed backend message: {e}").into() }
    }
}

impl std::error::Error for ProtocolError {}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
