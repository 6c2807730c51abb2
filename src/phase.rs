use std::borrow::Cow;

use crate::{
    Result,
    common::unit_error,
    executor::Executor,
    postgres::{BackendMessage, backend, frontend},
    scram::Scram,
    transaction::Transaction,
    transport::{PgTransport, PgTransportExt},
};

/// Config for postgres startup phase.
///
/// <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-START-UP>
pub struct StartupConfig<'a> {
    pub(crate) user: Cow<'a,str>,
    pub(crate) database: Option<Cow<'a,str>>,
    pub(crate) password: Option<Cow<'a,str>>,
    pub(crate) replication: Option<Cow<'a,str>>,
    pub(crate) application_name: Option<Cow<'a,str>>,
    pub(crate) client_encoding: Option<Cow<'a,str>>,
}

/// Startup phase successful response.
pub struct StartupResponse {
    /// This message provides secret-key data that the frontend must
    /// save if it wants to be able to issue cancel requests later.
    pub backend_key_data: backend::BackendKeyData,
}

unit_error! {
    /// An error when postgres request an authentication
    /// method that not yet unsupported by `pgwire`.
    pub struct UnsupportedAuth("auth method is not yet supported");
}

/// Perform a startup message.
///
/// <https://www.postgresql.org/docs/17/protocol-flow.html#PROTOCOL-FLOW-START-UP>
pub async fn startup<'a, IO: PgTransport>(
    opt: impl Into<StartupConfig<'a>>,
    mut io: IO,
) -> Result<StartupResponse> {

    let opt: StartupConfig = opt.into();

    // To begin a session, a frontend opens a connection to the server and sends a startup message.

    // (Optionally, the startup message can include additional settings for run-time parameters.)

    io.send_startup(frontend::Startup {
        user: opt.user(),
        database: opt.database(),
        replication: opt.replication(),
        application_name: opt.application_name(),
        client_encoding: opt.client_encoding(),
    });
    io.flush().await?;

    // The server then sends an appropriate authentication request message,
    // to which the frontend must reply with an appropriate authentication response message (such as a password).
    //
    // For all authentication methods except GSSAPI, SSPI and SASL, there is at most one request and one response.
    // In some methods, no response at all is needed from the frontend, and so no authentication request occurs.
    // For GSSAPI, SSPI and SASL, multiple exchanges of packets may be needed to complete the authentication.

    loop {
        use backend::Authentication::*;
        match io.recv().await? {
            // we gucci
            Ok => break,
            // The frontend must now send a PasswordMessage containing the password in clear-text form.
            CleartextPassword => {
                io.send(frontend::PasswordMessage { password: opt.password().unwrap_or_default() });
                io.flush().await?;
            },
            Sasl { mechanisms } => {
                scram_exchange(&mut io, mechanisms, opt.user(), opt.password().unwrap_or_default()).await?;
            },
            // TODO: support more authentication method (md5, gss, sspi)
            _ => return Err(UnsupportedAuth.into())
        }
    }

    // After having received AuthenticationOk, the frontend must wait for further messages from the server.
    // In this phase a backend process is being started, and the frontend is just an interested bystander.
    // It is still possible for the startup attempt to fail (ErrorResponse) or the server to decline support
    // for the requested minor protocol version (NegotiateProtocolVersion), but in the normal case the backend
    // will send some ParameterStatus messages, BackendKeyData, and finally ReadyForQuery.
    //
    // During this phase the backend will attempt to apply any additional run-time parameter settings that
    // were given in the startup message. If successful, these values become session defaults.
    // An error causes ErrorResponse and exit.

    let mut key_data = None;

    loop {
        use BackendMessage::*;
        match io.recv().await? {
            ReadyForQuery(_) => break,
            BackendKeyData(new_key_data) => key_data = Some(new_key_data),
            // NOTE: ParameterStatus will get eaten by the IO
            f => Err(f.unexpected("startup phase"))?,
        }
    }

    Ok(StartupResponse {
        backend_key_data: key_data.expect("postgres never send backend key data"),
    })
}

/// Drive a SCRAM-SHA-256 SASL exchange to completion.
///
/// <https://www.postgresql.org/docs/current/sasl-authentication.html>
async fn scram_exchange<IO: PgTransport>(
    mut io: IO,
    mechanisms: Vec<crate::common::ByteStr>,
    username: &str,
    password: &str,
) -> Result<()> {
    let mechanism = crate::scram::select_mechanism(mechanisms.iter().map(|m| m.as_str()))
        .ok_or(UnsupportedAuth)?;

    let crate::scram::ClientFirst { message, state } = Scram::client_first(username);
    io.send(frontend::SaslInitialResponse { mechanism, data: &message });
    io.flush().await?;

    let data = match io.recv::<backend::Authentication>().await? {
        backend::Authentication::SaslContinue { data } => data,
        _ => return Err(UnsupportedAuth.into()),
    };

    let crate::scram::ClientFinal { message, state } = state.server_first(&data, password)?;
    io.send(frontend::SaslResponse { data: &message });
    io.flush().await?;

    let data = match io.recv::<backend::Authentication>().await? {
        backend::Authentication::SaslFinal { data } => data,
        _ => return Err(UnsupportedAuth.into()),
    };

    state.server_final(&data)?;

    // Server closes the SASL exchange with a final `AuthenticationOk`.
    match io.recv::<backend::Authentication>().await? {
        backend::Authentication::Ok => Ok(()),
        _ => Err(UnsupportedAuth.into()),
    }
}

/// Transaction isolation level for [`begin_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn as_sql(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Read/write access mode for [`begin_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

impl AccessMode {
    fn as_sql(self) -> &'static str {
        match self {
            Self::ReadWrite => "READ WRITE",
            Self::ReadOnly => "READ ONLY",
        }
    }
}

/// Options for [`begin_with`], matching `BEGIN`'s transaction mode clauses.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeginOptions {
    pub isolation_level: Option<IsolationLevel>,
    pub access_mode: Option<AccessMode>,
    pub deferrable: Option<bool>,
}

impl BeginOptions {
    fn to_sql(self) -> String {
        let mut sql = String::from("BEGIN");
        if let Some(level) = self.isolation_level {
            sql.push_str(" ISOLATION LEVEL ");
            sql.push_str(level.as_sql());
        }
        if let Some(mode) = self.access_mode {
            sql.push(' ');
            sql.push_str(mode.as_sql());
        }
        if let Some(deferrable) = self.deferrable {
            sql.push_str(if deferrable { " DEFERRABLE" } else { " NOT DEFERRABLE" });
        }
        sql
    }
}

/// Begin transaction with given executor.
pub async fn begin<Exec: Executor>(exec: Exec) -> Result<Transaction<Exec::Transport>> {
    begin_with(exec, BeginOptions::default()).await
}

/// Begin transaction with an explicit isolation level, access mode and/or deferrable setting.
pub async fn begin_with<Exec: Executor>(exec: Exec, options: BeginOptions) -> Result<Transaction<Exec::Transport>> {
    let mut io = exec.connection().await?;
    io.send(frontend::Query { sql: &options.to_sql() });
    io.flush().await?;
    io.recv::<backend::CommandComplete>().await?;
    let r = io.recv::<backend::ReadyForQuery>().await?;

    match r.tx_status {
        b'T' => Ok(Transaction::new(io)),
        b'E' => Err(crate::transaction::TransactionAborted.into()),
        other => Err(backend::ProtocolError::message(format!(
            "unexpected transaction status {:?} after BEGIN", other as char
        )).into()),
    }
}

impl<'a> StartupConfig<'a> {
    /// Create new config, the database user name is required.
    pub fn new(user: impl Into<Cow<'a, str>>) -> Self {
        Self {
            user: user.into(),
            database: None,
            password: None,
            replication: None,
            application_name: None,
            client_encoding: None,
        }
    }

    /// The database user name to connect as.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The database to connect to. Defaults to the user name.
    pub fn database(&self) -> Option<&str> {
        self.database.as_ref().map(<_>::as_ref)
    }

    /// The database to connect to. Defaults to the user name.
    pub fn set_database(&mut self, database: impl Into<Cow<'a,str>>) {
        self.database = Some(database.into());
    }

    /// Authentication password, the default is empty string.
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(<_>::as_ref)
    }

    /// Authentication password, the default is empty string.
    pub fn set_password(&mut self, password: impl Into<Cow<'a,str>>) {
        self.password = Some(password.into());
    }

    /// Used to connect in streaming replication mode, where a small set of replication commands can be issued
    /// instead of SQL statements.
    ///
    /// Value can be true, false, or database, and the default is false.
    ///
    /// See [Section 53.4](https://www.postgresql.org/docs/current/protocol-replication.html) for details.
    pub fn replication(&self) -> Option<&str> {
        self.replication.as_ref().map(<_>::as_ref)
    }

    /// Used to connect in streaming replication mode, where a small set of replication commands can be issued
    /// instead of SQL statements.
    ///
    /// Value can be true, false, or database, and the default is false.
    ///
    /// See [Section 53.4](https://www.postgresql.org/docs/current/protocol-replication.html) for details.
    pub fn set_replication(&mut self, replication: impl Into<Cow<'a,str>>) {
        self.replication = Some(replication.into());
    }

    /// The `application_name` reported to the server, shown in `pg_stat_activity`.
    pub fn application_name(&self) -> Option<&str> {
        self.application_name.as_ref().map(<_>::as_ref)
    }

    /// The `application_name` reported to the server, shown in `pg_stat_activity`.
    pub fn set_application_name(&mut self, application_name: impl Into<Cow<'a,str>>) {
        self.application_name = Some(application_name.into());
    }

    /// The client-side character encoding requested from the server.
    pub fn client_encoding(&self) -> Option<&str> {
        self.client_encoding.as_ref().map(<_>::as_ref)
    }

    /// The client-side character encoding requested from the server.
    pub fn set_client_encoding(&mut self, client_encoding: impl Into<Cow<'a,str>>) {
        self.client_encoding = Some(client_encoding.into());
    }
}
