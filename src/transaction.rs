//! The [`Transaction`] type.
use std::{cell::Cell, io};

use crate::{
    ErrorKind, Result,
    common::unit_error,
    postgres::{
        BackendProtocol, Registry, backend,
        frontend::{self, FrontendProtocol},
    },
    statement::{CachedStatement, StatementName},
    transport::{PgTransport, PgTransportExt},
};

unit_error! {
    /// An operation was attempted against a transaction the server already
    /// aborted because of a prior error; only `ROLLBACK` (or rolling back to
    /// a savepoint) can recover it.
    pub struct TransactionAborted("current transaction is aborted");
}

/// An RAII implementation of transaction scope.
///
/// To begin a transaction, use [`begin`][crate::phase::begin] function.
///
/// To commit transaction, use [`Transaction::commit`].
///
/// If not commited, when this structure is dropped, transaction will be rolled back.
///
/// # Example
///
/// ```no_run
/// # async fn test(mut conn: pgwire::Connection) -> pgwire::Result<()> {
/// let mut tx = pgwire::begin(&mut conn).await?;
///
/// pgwire::execute("insert into post(name) values('foo')", &mut tx)
///     .execute()
///     .await?;
///
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
pub struct Transaction<IO: PgTransport> {
    io: IO,
    commited: bool,
    aborted: Cell<bool>,
    savepoint_depth: Cell<u32>,
}

impl<IO> Transaction<IO>
where
    IO: PgTransport
{
    pub(crate) fn new(io: IO) -> Self {
        Self { io, commited: false, aborted: Cell::new(false), savepoint_depth: Cell::new(0) }
    }

    /// Commit transaction.
    ///
    /// If the server already aborted the transaction because of a prior
    /// error, this returns [`TransactionAborted`] without a round trip.
    pub async fn commit(mut self) -> Result<()> {
        if self.aborted.get() {
            return Err(TransactionAborted.into());
        }

        self.io.send(frontend::Query { sql: "COMMIT" });
        self.io.flush().await?;
        self.io.recv::<backend::CommandComplete>().await?;
        let r = self.io.recv::<backend::ReadyForQuery>().await?;

        match r.tx_status {
            b'I' => {
                self.commited = true;
                Ok(())
            },
            b'E' => Err(TransactionAborted.into()),
            other => Err(backend::ProtocolError::message(format!(
                "unexpected transaction status {:?} after COMMIT", other as char
            )).into()),
        }
    }

    /// Open a nested savepoint, named after the current nesting depth.
    ///
    /// Rolling back (or dropping without releasing) the returned
    /// [`Savepoint`] recovers an aborted transaction.
    pub async fn savepoint(&mut self) -> Result<Savepoint<'_, IO>> {
        if self.aborted.get() {
            return Err(TransactionAborted.into());
        }

        let depth = self.savepoint_depth.get();
        let name = format!("s{depth}");
        self.io.send(frontend::Query { sql: &format!("SAVEPOINT {name}") });
        self.io.flush().await?;
        self.io.recv::<backend::CommandComplete>().await?;
        self.io.recv::<backend::ReadyForQuery>().await?;
        self.savepoint_depth.set(depth + 1);

        Ok(Savepoint { tx: self, name, released: false })
    }
}

impl<IO> Drop for Transaction<IO>
where
    IO: PgTransport
{
    fn drop(&mut self) {
        if !self.commited {
            self.io.send(frontend::Query { sql: "ROLLBACK" });
            self.io.ready_request();
        }
    }
}

impl<IO> PgTransport for Transaction<IO>
where
    IO: PgTransport
{
    fn poll_flush(&mut self, cx: &mut std::task::Context) -> std::task::Poll<io::Result<()>> {
        IO::poll_flush(&mut self.io, cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut std::task::Context) -> std::task::Poll<Result<B>> {
        let result = std::task::ready!(IO::poll_recv::<B>(&mut self.io, cx));
        if let Err(e) = &result {
            if matches!(e.kind(), ErrorKind::Database(_)) {
                self.aborted.set(true);
            }
        }
        std::task::Poll::Ready(result)
    }

    fn ready_request(&mut self) {
        IO::ready_request(&mut self.io)
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        IO::send(&mut self.io, message)
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        IO::send_startup(&mut self.io, startup)
    }

    fn get_stmt(&mut self, sql: u64) -> Option<CachedStatement> {
        IO::get_stmt(&mut self.io, sql)
    }

    fn add_stmt(&mut self, sql: u64, stmt: CachedStatement) {
        IO::add_stmt(&mut self.io, sql, stmt)
    }

    fn registry(&self) -> &Registry {
        IO::registry(&self.io)
    }
}

/// A nested `SAVEPOINT` inside a [`Transaction`].
///
/// If dropped without calling [`Savepoint::release`], a `ROLLBACK TO
/// SAVEPOINT` is issued, which also clears the parent transaction's aborted
/// state.
pub struct Savepoint<'a, IO: PgTransport> {
    tx: &'a mut Transaction<IO>,
    name: String,
    released: bool,
}

impl<IO: PgTransport> Savepoint<'_, IO> {
    /// Release the savepoint, keeping its changes as part of the enclosing transaction.
    pub async fn release(mut self) -> Result<()> {
        self.tx.io.send(frontend::Query { sql: &format!("RELEASE SAVEPOINT {}", self.name) });
        self.tx.io.flush().await?;
        self.tx.io.recv::<backend::CommandComplete>().await?;
        self.tx.io.recv::<backend::ReadyForQuery>().await?;
        self.released = true;
        self.tx.savepoint_depth.set(self.tx.savepoint_depth.get().saturating_sub(1));
        Ok(())
    }
}

impl<IO: PgTransport> Drop for Savepoint<'_, IO> {
    fn drop(&mut self) {
        if !self.released {
            self.tx.io.send(frontend::Query { sql: &format!("ROLLBACK TO SAVEPOINT {}", self.name) });
            self.tx.io.ready_request();
            self.tx.aborted.set(false);
            self.tx.savepoint_depth.set(self.tx.savepoint_depth.get().saturating_sub(1));
        }
    }
}

