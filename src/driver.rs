//! Driver boundary consumed by the executors.
//!
//! Every call into a driver is a suspension point; nothing else in the crate awaits.
//! Driver failures use [`sqlx::Error`] so they flow into [`crate::Error::Database`]
//! unchanged.

use async_trait::async_trait;
use std::time::Duration;

use crate::value::{SqlType, Value};

/// Result type for driver calls
pub type DriverResult<T> = std::result::Result<T, sqlx::Error>;

/// Whether a statement is compiled so the keys generated by its write can be read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedKeys {
    Ignore,
    Return,
}

/// A batch that failed partway.
#[derive(Debug)]
pub struct BatchError {
    /// Affected-row counts of the parameter sets applied before the failure
    pub counts: Vec<u64>,
    pub source: sqlx::Error,
}

/// A compiled statement with positional (0-based) parameters.
pub trait Statement: Send {
    fn bind_value(&mut self, index: usize, value: &Value) -> DriverResult<()>;

    /// Binds a NULL of the given type.
    fn bind_null(&mut self, index: usize, sql_type: SqlType) -> DriverResult<()>;

    /// Moves the current parameters into the pending batch and clears them.
    fn add_batch(&mut self) -> DriverResult<()>;

    /// Passed through to the driver; `None` removes the limit.
    fn set_query_timeout(&mut self, timeout: Option<Duration>);
}

/// Forward-only result rows with their column names.
pub trait Cursor: Send {
    fn columns(&self) -> &[String];

    fn next_row(&mut self) -> DriverResult<Option<Vec<Value>>>;

    fn close(&mut self) -> DriverResult<()>;
}

/// An open database connection.
#[async_trait]
pub trait Connection: Send {
    type Statement: Statement;
    type Cursor: Cursor;

    async fn prepare(&mut self, sql: &str, keys: GeneratedKeys) -> DriverResult<Self::Statement>;

    async fn execute_query(&mut self, statement: &mut Self::Statement)
        -> DriverResult<Self::Cursor>;

    /// Runs a write and returns the affected-row count.
    async fn execute_update(&mut self, statement: &mut Self::Statement) -> DriverResult<u64>;

    /// Keys generated by the last write of a statement prepared with [`GeneratedKeys::Return`].
    async fn generated_keys(&mut self, statement: &mut Self::Statement)
        -> DriverResult<Self::Cursor>;

    /// Runs every parameter set added with [`Statement::add_batch`].
    async fn execute_batch(
        &mut self,
        statement: &mut Self::Statement,
    ) -> std::result::Result<Vec<u64>, BatchError>;

    async fn close_statement(&mut self, statement: Self::Statement) -> DriverResult<()>;

    async fn close(&mut self) -> DriverResult<()>;
}

/// Hands out connections, typically from a pool.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    type Connection: Connection;

    async fn acquire(&self) -> DriverResult<Self::Connection>;
}

/// A connection together with who is responsible for closing it.
///
/// An `Owned` connection is closed when the execution using it releases its resources;
/// a `Borrowed` one is left open whatever the outcome.
#[derive(Debug)]
pub enum ConnectionRef<'c, C> {
    Owned(C),
    Borrowed(&'c mut C),
}

impl<'c, C> ConnectionRef<'c, C> {
    pub fn is_owned(&self) -> bool {
        matches!(self, ConnectionRef::Owned(_))
    }

    pub fn get_mut(&mut self) -> &mut C {
        match self {
            ConnectionRef::Owned(conn) => conn,
            ConnectionRef::Borrowed(conn) => conn,
        }
    }
}
