//! Query API types.
use std::marker::PhantomData;

use crate::{
    FromRow, Result, Row,
    encode::{Encode, Encoded},
    executor::Executor,
    fetch::{Execute, FetchAll, FetchOne, FetchOptional, FetchStream},
    row::RowResult,
    sql::Sql,
};

/// Entrypoint of the query API, rows are decoded using [`FromRow`].
#[inline]
pub fn query<SQL, Exe, R>(sql: SQL, exe: Exe) -> Query<'static, SQL, Exe, R>
where
    SQL: Sql,
    Exe: Executor,
    R: FromRow,
{
    Query { sql, exe, params: Vec::new(), _p: PhantomData }
}

/// Same as [`query`], kept as an explicit alias for readability at call sites
/// that bind a concrete row type.
#[inline]
pub fn query_as<SQL, Exe, R>(sql: SQL, exe: Exe) -> Query<'static, SQL, Exe, R>
where
    SQL: Sql,
    Exe: Executor,
    R: FromRow,
{
    query(sql, exe)
}

/// Entrypoint of the query API decoding a single column per row.
#[inline]
pub fn query_scalar<SQL, Exe, D>(sql: SQL, exe: Exe) -> Query<'static, SQL, Exe, (D,)>
where
    SQL: Sql,
    Exe: Executor,
    D: crate::Decode,
{
    query(sql, exe)
}

/// Entrypoint of the query API for statement with no returned row.
#[inline]
pub fn execute<SQL, Exe>(sql: SQL, exe: Exe) -> Query<'static, SQL, Exe, ()>
where
    SQL: Sql,
    Exe: Executor,
{
    query(sql, exe)
}

/// The query API.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Query<'val, SQL, Exe, R> {
    sql: SQL,
    exe: Exe,
    params: Vec<Encoded<'val>>,
    _p: PhantomData<R>,
}

impl<'val, SQL, Exe, R> Query<'val, SQL, Exe, R> {
    /// Bind query parameter.
    #[inline]
    pub fn bind<V: Encode<'val>>(mut self, value: V) -> Self {
        self.params.push(value.encode());
        self
    }
}

impl<'val, SQL, Exe, R> Query<'val, SQL, Exe, R>
where
    SQL: Sql,
    Exe: Executor,
{
    /// Fetch rows using [`Stream`][futures_core::Stream] api.
    ///
    /// The returned `Stream` must be polled/awaited until completion,
    /// otherwise it will disturb subsequent query.
    #[inline]
    pub fn fetch(self) -> FetchStream<'val, SQL, Exe::Future, Exe::Transport, R> {
        FetchStream::new(self.sql, self.exe.connection(), self.params, 0)
    }

    /// Fetch all rows into [`Vec`].
    #[inline]
    pub fn fetch_all(self) -> FetchAll<'val, SQL, Exe::Future, Exe::Transport, R> {
        FetchAll::new(self.sql, self.exe.connection(), self.params)
    }

    /// Fetch exactly one row, erroring with [`RowNotFound`][crate::row::RowNotFound] otherwise.
    #[inline]
    pub fn fetch_one(self) -> FetchOne<'val, SQL, Exe::Future, Exe::Transport, R> {
        FetchOne::new(self.sql, self.exe.connection(), self.params)
    }

    /// Fetch at most one row.
    #[inline]
    pub fn fetch_optional(self) -> FetchOptional<'val, SQL, Exe::Future, Exe::Transport, R> {
        FetchOptional::new(self.sql, self.exe.connection(), self.params)
    }

    /// Execute statement and return number of rows affected.
    #[inline]
    pub fn execute(self) -> Execute<'val, SQL, Exe::Future, Exe::Transport> {
        Execute::new(self.sql, self.exe.connection(), self.params)
    }
}

impl<'val, SQL, Exe, R> IntoFuture for Query<'val, SQL, Exe, R>
where
    SQL: Sql + Unpin,
    Exe: Executor + Unpin,
    Exe::Transport: Unpin,
    R: FromRow + Unpin,
{
    type Output = Result<RowResult>;

    type IntoFuture = Execute<'val, SQL, Exe::Future, Exe::Transport>;

    #[inline]
    fn into_future(self) -> Self::IntoFuture {
        self.execute()
    }
}

#[allow(unused)]
fn assert_row_unused(_: Row) {}
