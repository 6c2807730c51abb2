//! Frontend (client to backend) message types.
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::{BufMut, BytesMut};

use crate::{
    encode::Encoded,
    ext::{BindParams, BufMutExt, StrExt, UsizeExt},
    postgres::PgFormat,
};

/// A message sent from the frontend to the backend.
///
/// Every message except [`Startup`] and `SSLRequest` is preceded by a
/// single byte identifying its type, [`MSGTYPE`][Self::MSGTYPE].
pub trait FrontendProtocol: Sized {
    /// The message type byte.
    const MSGTYPE: u8;

    /// Hint of the encoded body size, used to pre-reserve the send buffer.
    ///
    /// Does not need to be exact, only a reasonable lower bound.
    fn size_hint(&self) -> usize;

    /// Encode the message body. The 1-byte type tag and the 4-byte
    /// length prefix are written by the caller.
    fn encode(self, buf: &mut BytesMut);
}

/// Write `message` as a complete wire frame: type byte, length, body.
pub fn write<F: FrontendProtocol>(message: F, buf: &mut BytesMut) {
    buf.reserve(message.size_hint() + 5);
    buf.put_u8(F::MSGTYPE);
    let len_at = buf.len();
    buf.put_u32(0);
    message.encode(buf);
    let len = (buf.len() - len_at).to_u32();
    buf[len_at..len_at + 4].copy_from_slice(&len.to_be_bytes());
}

/// The startup message has no type byte, for historical reasons.
pub struct Startup<'a> {
    pub user: &'a str,
    pub database: Option<&'a str>,
    pub replication: Option<&'a str>,
    pub application_name: Option<&'a str>,
    pub client_encoding: Option<&'a str>,
}

impl Startup<'_> {
    /// Protocol version 3.0.
    const VERSION: i32 = 0x0003_0000;

    /// Encode the startup message, which has no leading type byte.
    pub(crate) fn write(self, buf: &mut BytesMut) {
        let len_at = buf.len();
        buf.put_u32(0);
        buf.put_i32(Self::VERSION);

        buf.put_nul_string("user");
        buf.put_nul_string(self.user);

        if let Some(database) = self.database {
            buf.put_nul_string("database");
            buf.put_nul_string(database);
        }

        if let Some(replication) = self.replication {
            buf.put_nul_string("replication");
            buf.put_nul_string(replication);
        }

        if let Some(application_name) = self.application_name {
            buf.put_nul_string("application_name");
            buf.put_nul_string(application_name);
        }

        if let Some(client_encoding) = self.client_encoding {
            buf.put_nul_string("client_encoding");
            buf.put_nul_string(client_encoding);
        }

        buf.put_u8(0);

        let len = (buf.len() - len_at).to_u32();
        buf[len_at..len_at + 4].copy_from_slice(&len.to_be_bytes());
    }
}

/// A request to negotiate SSL encryption, sent before the startup message.
///
/// Like [`Startup`], it has no leading type byte. The server replies with
/// a single `S` or `N` byte, not a regular framed message.
pub struct SslRequest;

impl SslRequest {
    /// The magic ssl request code, in place of a protocol version.
    const CODE: i32 = 80877103;

    pub(crate) fn write(self, buf: &mut BytesMut) {
        buf.put_u32(8);
        buf.put_i32(Self::CODE);
    }
}

/// Cancel an in progress request on another connection.
///
/// Sent alone, on a fresh connection, with no leading type byte and no
/// further authentication.
pub struct CancelRequest {
    pub process_id: i32,
    pub secret_key: i32,
}

impl CancelRequest {
    const CODE: i32 = 80877102;

    pub(crate) fn write(self, buf: &mut BytesMut) {
        buf.put_u32(16);
        buf.put_i32(Self::CODE);
        buf.put_i32(self.process_id);
        buf.put_i32(self.secret_key);
    }
}

/// `PasswordMessage`, also reused for the `SASLResponse` payload in cleartext mode.
pub struct PasswordMessage<'a> {
    pub password: &'a str,
}

impl FrontendProtocol for PasswordMessage<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> usize {
        self.password.nul_string_len() as usize
    }

    fn encode(self, buf: &mut BytesMut) {
        buf.put_nul_string(self.password);
    }
}

/// `SASLInitialResponse`.
pub struct SaslInitialResponse<'a> {
    pub mechanism: &'a str,
    pub data: &'a [u8],
}

impl FrontendProtocol for SaslInitialResponse<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> usize {
        self.mechanism.nul_string_len() as usize + 4 + self.data.len()
    }

    fn encode(self, buf: &mut BytesMut) {
        buf.put_nul_string(self.mechanism);
        buf.put_i32(self.data.len().to_u32() as i32);
        buf.put_slice(self.data);
    }
}

/// `SASLResponse`.
pub struct SaslResponse<'a> {
    pub data: &'a [u8],
}

impl FrontendProtocol for SaslResponse<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> usize {
        self.data.len()
    }

    fn encode(self, buf: &mut BytesMut) {
        buf.put_slice(self.data);
    }
}

/// Simple query protocol `Query` message.
pub struct Query<'a> {
    pub sql: &'a str,
}

impl FrontendProtocol for Query<'_> {
    const MSGTYPE: u8 = b'Q';

    fn size_hint(&self) -> usize {
        self.sql.nul_string_len() as usize
    }

    fn encode(self, buf: &mut BytesMut) {
        buf.put_nul_string(self.sql);
    }
}

/// `Parse`, extended query protocol statement preparation.
pub struct Parse<'a, I> {
    pub prepare_name: &'a str,
    pub sql: &'a str,
    pub oids_len: i16,
    pub oids: I,
}

impl<I> FrontendProtocol for Parse<'_, I>
where
    I: ExactSizeIterator<Item = u32>,
{
    const MSGTYPE: u8 = b'P';

    fn size_hint(&self) -> usize {
        self.prepare_name.nul_string_len() as usize
            + self.sql.nul_string_len() as usize
            + 2
            + self.oids.len() * 4
    }

    fn encode(self, buf: &mut BytesMut) {
        buf.put_nul_string(self.prepare_name);
        buf.put_nul_string(self.sql);
        buf.put_i16(self.oids_len);
        for oid in self.oids {
            buf.put_u32(oid);
        }
    }
}

/// `Bind`, bind parameters to a prepared statement, creating a portal.
pub struct Bind<'a, ParamFmts, Params, ResultFmts> {
    pub portal_name: &'a str,
    pub stmt_name: &'a str,
    pub param_formats_len: i16,
    pub param_formats: ParamFmts,
    pub params_len: u16,
    pub params_size_hint: u32,
    pub params: Params,
    pub result_formats_len: i16,
    pub result_formats: ResultFmts,
}

impl<ParamFmts, Params, ResultFmts> FrontendProtocol for Bind<'_, ParamFmts, Params, ResultFmts>
where
    ParamFmts: IntoIterator<Item = PgFormat>,
    Params: IntoIterator<Item = Encoded<'static>>,
    ResultFmts: IntoIterator<Item = PgFormat>,
{
    const MSGTYPE: u8 = b'B';

    fn size_hint(&self) -> usize {
        self.portal_name.nul_string_len() as usize
            + self.stmt_name.nul_string_len() as usize
            + 2
            + self.param_formats_len as usize * 2
            + 2
            + self.params_size_hint as usize
            + 2
            + self.result_formats_len as usize * 2
    }

    fn encode(self, buf: &mut BytesMut) {
        buf.put_nul_string(self.portal_name);
        buf.put_nul_string(self.stmt_name);

        buf.put_i16(self.param_formats_len);
        for fmt in self.param_formats {
            buf.put_u16(fmt.format_code());
        }

        buf.put_u16(self.params_len);
        for param in self.params {
            buf.put_i32(param.size());
            let mut param = param;
            while param.has_remaining() {
                let chunk = bytes::Buf::chunk(&param);
                buf.put_slice(chunk);
                let n = chunk.len();
                bytes::Buf::advance(&mut param, n);
            }
        }

        buf.put_i16(self.result_formats_len);
        for fmt in self.result_formats {
            buf.put_u16(fmt.format_code());
        }
    }
}

/// `Execute`, run a bound portal.
pub struct Execute<'a> {
    pub portal_name: &'a str,
    pub max_row: u32,
}

impl FrontendProtocol for Execute<'_> {
    const MSGTYPE: u8 = b'E';

    fn size_hint(&self) -> usize {
        self.portal_name.nul_string_len() as usize + 4
    }

    fn encode(self, buf: &mut BytesMut) {
        buf.put_nul_string(self.portal_name);
        buf.put_u32(self.max_row);
    }
}

/// `Describe`, request `ParameterDescription`/`RowDescription` for a
/// statement (`kind == b'S'`) or portal (`kind == b'P'`).
pub struct Describe<'a> {
    pub kind: u8,
    pub name: &'a str,
}

impl FrontendProtocol for Describe<'_> {
    const MSGTYPE: u8 = b'D';

    fn size_hint(&self) -> usize {
        1 + self.name.nul_string_len() as usize
    }

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u8(self.kind);
        buf.put_nul_string(self.name);
    }
}

/// `Close`, close a statement (`kind == b'S'`) or portal (`kind == b'P'`).
pub struct Close<'a> {
    pub kind: u8,
    pub name: &'a str,
}

impl FrontendProtocol for Close<'_> {
    const MSGTYPE: u8 = b'C';

    fn size_hint(&self) -> usize {
        1 + self.name.nul_string_len() as usize
    }

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u8(self.kind);
        buf.put_nul_string(self.name);
    }
}

macro_rules! unit_msg {
    ($(#[$meta:meta])* $name:ident = $msgtype:literal) => {
        $(#[$meta])*
        pub struct $name;

        impl FrontendProtocol for $name {
            const MSGTYPE: u8 = $msgtype;

            fn size_hint(&self) -> usize {
                0
            }

            fn encode(self, _: &mut BytesMut) { }
        }
    };
}

unit_msg!(
    /// Request a flush without a full round-trip `Sync`.
    Flush = b'H'
);
unit_msg!(
    /// Synchronize after an extended query pipeline, closing the current
    /// transaction if one was implicitly started.
    Sync = b'S'
);
unit_msg!(
    /// Politely close the connection.
    Terminate = b'X'
);
