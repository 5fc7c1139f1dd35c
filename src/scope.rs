//! Resource lifecycle of a single execution.
//!
//! `Created → Prepared → Executed → Released`. Every path out of an execution goes
//! through [`StatementScope::finish`], which releases the cursor, then the statement,
//! then (only when owned) the connection. Releasing twice is a no-op.

use std::time::Duration;
use tracing::{debug, warn};

use crate::bind::Binding;
use crate::driver::{BatchError, Connection, ConnectionRef, GeneratedKeys, Statement};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Created,
    Prepared,
    Executed,
    Released,
}

pub(crate) struct StatementScope<'c, C: Connection> {
    conn: ConnectionRef<'c, C>,
    statement: Option<C::Statement>,
    cursor: Option<C::Cursor>,
    stage: Stage,
}

fn not_prepared() -> Error {
    Error::usage("statement used before it was prepared")
}

impl<'c, C: Connection> StatementScope<'c, C> {
    pub fn new(conn: ConnectionRef<'c, C>) -> Self {
        Self {
            conn,
            statement: None,
            cursor: None,
            stage: Stage::Created,
        }
    }

    #[cfg(test)]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub async fn prepare(
        &mut self,
        sql: &str,
        keys: GeneratedKeys,
        timeout: Option<Duration>,
    ) -> Result<()> {
        debug!(sql, ?keys, "preparing statement");
        let mut statement = self.conn.get_mut().prepare(sql, keys).await?;
        if timeout.is_some() {
            statement.set_query_timeout(timeout);
        }
        self.statement = Some(statement);
        self.stage = Stage::Prepared;
        Ok(())
    }

    /// Applies resolved bindings in positional order.
    pub fn bind_all(&mut self, actions: &[&Binding]) -> Result<()> {
        let statement = self.statement.as_mut().ok_or_else(not_prepared)?;
        for (index, action) in actions.iter().enumerate() {
            match action {
                Binding::Value(value) => statement.bind_value(index, value)?,
                Binding::Null(sql_type) => statement.bind_null(index, *sql_type)?,
            }
        }
        Ok(())
    }

    pub fn add_batch(&mut self) -> Result<()> {
        let statement = self.statement.as_mut().ok_or_else(not_prepared)?;
        statement.add_batch()?;
        Ok(())
    }

    /// Runs the query and keeps the cursor so it is closed on release.
    pub async fn execute_query(&mut self) -> Result<&mut C::Cursor> {
        let statement = self.statement.as_mut().ok_or_else(not_prepared)?;
        let cursor = self.conn.get_mut().execute_query(statement).await?;
        self.stage = Stage::Executed;
        Ok(self.cursor.insert(cursor))
    }

    pub async fn execute_update(&mut self) -> Result<u64> {
        let statement = self.statement.as_mut().ok_or_else(not_prepared)?;
        let count = self.conn.get_mut().execute_update(statement).await?;
        self.stage = Stage::Executed;
        Ok(count)
    }

    pub async fn generated_keys(&mut self) -> Result<&mut C::Cursor> {
        let statement = self.statement.as_mut().ok_or_else(not_prepared)?;
        let cursor = self.conn.get_mut().generated_keys(statement).await?;
        Ok(self.cursor.insert(cursor))
    }

    pub async fn execute_batch(&mut self) -> Result<Vec<u64>> {
        let statement = self.statement.as_mut().ok_or_else(not_prepared)?;
        let outcome = self.conn.get_mut().execute_batch(statement).await;
        self.stage = Stage::Executed;
        outcome.map_err(|BatchError { counts, source }| Error::BatchPartialFailure {
            failed_index: counts.len(),
            counts,
            source,
        })
    }

    /// Releases everything this scope holds. Every step runs even if an earlier one fails;
    /// the first failure is returned.
    pub async fn release(&mut self) -> Result<()> {
        if self.stage == Stage::Released {
            return Ok(());
        }
        self.stage = Stage::Released;

        let mut first: Option<sqlx::Error> = None;

        if let Some(mut cursor) = self.cursor.take() {
            if let Err(e) = crate::driver::Cursor::close(&mut cursor) {
                first.get_or_insert(e);
            }
        }
        if let Some(statement) = self.statement.take() {
            if let Err(e) = self.conn.get_mut().close_statement(statement).await {
                first.get_or_insert(e);
            }
        }
        if self.conn.is_owned() {
            if let Err(e) = self.conn.get_mut().close().await {
                first.get_or_insert(e);
            }
        }

        match first {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Releases, then hands back the outcome of the work done in this scope.
    ///
    /// When the work failed its error wins over a release failure, which is only logged.
    pub async fn finish<T>(mut self, outcome: Result<T>) -> Result<T> {
        let released = self.release().await;
        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_error)) => {
                warn!(error = %release_error, "release failed after an earlier error");
                Err(e)
            }
        }
    }
}

/// Releases a connection that never reached an executor.
pub(crate) async fn abandon<C: Connection, T>(
    conn: ConnectionRef<'_, C>,
    error: Error,
) -> Result<T> {
    StatementScope::new(conn).finish(Err(error)).await
}
