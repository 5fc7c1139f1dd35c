//! In-memory driver that journals every call it receives.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bind::Binding;
use crate::driver::{
    BatchError, Connection, ConnectionSource, Cursor, DriverResult, GeneratedKeys, Statement,
};
use crate::value::{SqlType, Value};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Prepare(String, GeneratedKeys),
    Bind(usize, Value),
    BindNull(usize, SqlType),
    AddBatch,
    Timeout(Option<Duration>),
    ExecuteQuery,
    ExecuteUpdate,
    GeneratedKeys,
    ExecuteBatch,
    CloseCursor,
    CloseStatement,
    CloseConnection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailAt {
    Prepare,
    Execute,
}

pub(crate) type Journal = Arc<Mutex<Vec<Call>>>;

/// Scripted connection: `columns`/`rows` answer queries, `affected` answers writes.
pub(crate) struct MockConnection {
    pub journal: Journal,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub affected: u64,
    pub keys: Vec<Value>,
    pub fail_at: Option<FailAt>,
    /// Index of the batch parameter set that fails
    pub batch_failure: Option<usize>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            journal: Arc::new(Mutex::new(Vec::new())),
            columns: Vec::new(),
            rows: Vec::new(),
            affected: 0,
            keys: Vec::new(),
            fail_at: None,
            batch_failure: None,
        }
    }

    pub fn with_rows(mut self, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self.rows = rows;
        self
    }

    pub fn with_affected(mut self, affected: u64) -> Self {
        self.affected = affected;
        self
    }

    pub fn with_keys(mut self, keys: Vec<Value>) -> Self {
        self.keys = keys;
        self
    }

    pub fn failing_at(mut self, fail_at: FailAt) -> Self {
        self.fail_at = Some(fail_at);
        self
    }

    pub fn failing_batch_at(mut self, index: usize) -> Self {
        self.batch_failure = Some(index);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.journal.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == call)
            .count()
    }

    pub fn prepared_sql(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Prepare(sql, _) => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn bound_values(&self) -> Vec<(usize, Binding)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Bind(i, v) => Some((i, Binding::Value(v))),
                Call::BindNull(i, t) => Some((i, Binding::Null(t))),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.journal.lock().unwrap().push(call);
    }

    fn cursor(&self, columns: Vec<String>, rows: Vec<Vec<Value>>) -> MockCursor {
        MockCursor {
            journal: self.journal.clone(),
            columns,
            rows: rows.into(),
        }
    }
}

pub(crate) struct MockStatement {
    journal: Journal,
    params: Vec<Option<Binding>>,
    batch: Vec<Vec<Option<Binding>>>,
}

impl MockStatement {
    fn set(&mut self, index: usize, binding: Binding) {
        if self.params.len() <= index {
            self.params.resize(index + 1, None);
        }
        self.params[index] = Some(binding);
    }
}

impl Statement for MockStatement {
    fn bind_value(&mut self, index: usize, value: &Value) -> DriverResult<()> {
        self.journal
            .lock()
            .unwrap()
            .push(Call::Bind(index, value.clone()));
        self.set(index, Binding::Value(value.clone()));
        Ok(())
    }

    fn bind_null(&mut self, index: usize, sql_type: SqlType) -> DriverResult<()> {
        self.journal
            .lock()
            .unwrap()
            .push(Call::BindNull(index, sql_type));
        self.set(index, Binding::Null(sql_type));
        Ok(())
    }

    fn add_batch(&mut self) -> DriverResult<()> {
        self.journal.lock().unwrap().push(Call::AddBatch);
        self.batch.push(std::mem::take(&mut self.params));
        Ok(())
    }

    fn set_query_timeout(&mut self, timeout: Option<Duration>) {
        self.journal.lock().unwrap().push(Call::Timeout(timeout));
    }
}

pub(crate) struct MockCursor {
    journal: Journal,
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
}

impl Cursor for MockCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> DriverResult<Option<Vec<Value>>> {
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.journal.lock().unwrap().push(Call::CloseCursor);
        Ok(())
    }
}

fn failure(message: &str) -> sqlx::Error {
    sqlx::Error::Protocol(message.to_string())
}

#[async_trait]
impl Connection for MockConnection {
    type Statement = MockStatement;
    type Cursor = MockCursor;

    async fn prepare(&mut self, sql: &str, keys: GeneratedKeys) -> DriverResult<MockStatement> {
        self.record(Call::Prepare(sql.to_string(), keys));
        if self.fail_at == Some(FailAt::Prepare) {
            return Err(failure("syntax error"));
        }
        Ok(MockStatement {
            journal: self.journal.clone(),
            params: Vec::new(),
            batch: Vec::new(),
        })
    }

    async fn execute_query(&mut self, _statement: &mut MockStatement) -> DriverResult<MockCursor> {
        self.record(Call::ExecuteQuery);
        if self.fail_at == Some(FailAt::Execute) {
            return Err(failure("execute failed"));
        }
        Ok(self.cursor(self.columns.clone(), self.rows.clone()))
    }

    async fn execute_update(&mut self, _statement: &mut MockStatement) -> DriverResult<u64> {
        self.record(Call::ExecuteUpdate);
        if self.fail_at == Some(FailAt::Execute) {
            return Err(failure("Duplicate entry '1' for key 'PRIMARY'"));
        }
        Ok(self.affected)
    }

    async fn generated_keys(&mut self, _statement: &mut MockStatement) -> DriverResult<MockCursor> {
        self.record(Call::GeneratedKeys);
        let rows = self.keys.iter().map(|k| vec![k.clone()]).collect();
        Ok(self.cursor(vec!["GENERATED_KEY".to_string()], rows))
    }

    async fn execute_batch(
        &mut self,
        statement: &mut MockStatement,
    ) -> Result<Vec<u64>, BatchError> {
        self.record(Call::ExecuteBatch);
        let mut counts = Vec::new();
        for (index, _params) in std::mem::take(&mut statement.batch).into_iter().enumerate() {
            if self.batch_failure == Some(index) {
                return Err(BatchError {
                    counts,
                    source: failure("Duplicate entry for key 'uniq_email'"),
                });
            }
            counts.push(self.affected);
        }
        Ok(counts)
    }

    async fn close_statement(&mut self, _statement: MockStatement) -> DriverResult<()> {
        self.record(Call::CloseStatement);
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.record(Call::CloseConnection);
        Ok(())
    }
}

/// Source that hands out clones of a scripted connection sharing one journal.
pub(crate) struct MockSource {
    pub journal: Journal,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub affected: u64,
}

impl MockSource {
    pub fn new(template: &MockConnection) -> Self {
        Self {
            journal: template.journal.clone(),
            columns: template.columns.clone(),
            rows: template.rows.clone(),
            affected: template.affected,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.journal.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionSource for MockSource {
    type Connection = MockConnection;

    async fn acquire(&self) -> DriverResult<MockConnection> {
        let mut conn = MockConnection::new();
        conn.journal = self.journal.clone();
        conn.columns = self.columns.clone();
        conn.rows = self.rows.clone();
        conn.affected = self.affected;
        Ok(conn)
    }
}
