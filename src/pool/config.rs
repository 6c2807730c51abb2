use std::time::Duration;

use crate::{Config, Result};

use super::Pool;

/// Pool configuration builder.
#[derive(Clone)]
pub struct PoolConfig {
    pub(crate) conn: Config,
    pub(crate) max_conn: usize,
    pub(crate) max_connection_age: Option<Duration>,
    pub(crate) max_session_use: Option<u32>,
    pub(crate) max_query_count: Option<u32>,
}

impl PoolConfig {
    pub fn from_env() -> PoolConfig {
        Self {
            conn: Config::from_env(),
            max_conn: 1,
            max_connection_age: None,
            max_session_use: None,
            max_query_count: None,
        }
    }

    /// Get connection config.
    pub fn connection(&self) -> &Config {
        &self.conn
    }

    /// Set max connection value.
    pub fn max_connection(mut self, value: usize) -> Self {
        self.max_conn = value;
        self
    }

    /// Close and replace a connection once it has lived this long, regardless
    /// of how it's being used.
    pub fn max_connection_age(mut self, value: Duration) -> Self {
        self.max_connection_age = Some(value);
        self
    }

    /// Close and replace a connection after it has been checked out this
    /// many times.
    pub fn max_session_use(mut self, value: u32) -> Self {
        self.max_session_use = Some(value);
        self
    }

    /// Close and replace a connection once it has executed this many
    /// queries.
    pub fn max_query_count(mut self, value: u32) -> Self {
        self.max_query_count = Some(value);
        self
    }
}

impl PoolConfig {
    pub async fn connect(mut self, url: &str) -> Result<Pool> {
        let conn = Config::parse(url)?;
        self.conn = conn;
        Pool::connect_with(self).await
    }

    pub fn connect_lazy(mut self, url: &str) -> Result<Pool> {
        let conn = Config::parse(url)?;
        self.conn = conn;
        Ok(Pool::connect_lazy_with(self))
    }
}
