//! MySQL driver built on SQLx.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::{MySqlArguments, MySqlConnection, MySqlQueryResult, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{
    Column as _, Connection as _, Executor, MySql, MySqlPool, Row as _, TypeInfo as _,
    ValueRef as _,
};
use std::future::Future;
use std::io;
use std::time::Duration;

use crate::bind::Binding;
use crate::crud::GENERATED_KEY;
use crate::driver::{
    BatchError, Connection, ConnectionSource, Cursor, DriverResult, GeneratedKeys, Statement,
};
use crate::value::{SqlType, Value};

type MySqlQuery<'q> = Query<'q, MySql, MySqlArguments>;

enum Link {
    Direct(MySqlConnection),
    Pooled(PoolConnection<MySql>),
}

/// A MySQL connection usable by the executors.
///
/// Wraps either a dedicated connection, which [`Connection::close`] closes, or a pooled
/// one, which is handed back to its pool instead.
pub struct MySqlSession {
    link: Option<Link>,
}

impl MySqlSession {
    /// Opens a dedicated connection.
    pub async fn connect(url: &str) -> DriverResult<Self> {
        Ok(MySqlConnection::connect(url).await?.into())
    }

    pub fn is_closed(&self) -> bool {
        self.link.is_none()
    }

    fn link(&mut self) -> DriverResult<&mut MySqlConnection> {
        match self.link.as_mut() {
            Some(Link::Direct(conn)) => Ok(conn),
            Some(Link::Pooled(conn)) => Ok(&mut **conn),
            None => Err(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "session is closed",
            ))),
        }
    }
}

impl From<MySqlConnection> for MySqlSession {
    fn from(conn: MySqlConnection) -> Self {
        Self {
            link: Some(Link::Direct(conn)),
        }
    }
}

impl From<PoolConnection<MySql>> for MySqlSession {
    fn from(conn: PoolConnection<MySql>) -> Self {
        Self {
            link: Some(Link::Pooled(conn)),
        }
    }
}

/// A statement prepared on the server, with its parameters kept until execution.
pub struct SessionStatement {
    sql: String,
    columns: Vec<String>,
    keys: GeneratedKeys,
    params: Vec<Option<Binding>>,
    batch: Vec<Vec<Option<Binding>>>,
    timeout: Option<Duration>,
    last_write: Option<MySqlQueryResult>,
}

impl SessionStatement {
    fn set(&mut self, index: usize, binding: Binding) {
        if self.params.len() <= index {
            self.params.resize(index + 1, None);
        }
        self.params[index] = Some(binding);
    }
}

impl Statement for SessionStatement {
    fn bind_value(&mut self, index: usize, value: &Value) -> DriverResult<()> {
        self.set(index, Binding::Value(value.clone()));
        Ok(())
    }

    fn bind_null(&mut self, index: usize, sql_type: SqlType) -> DriverResult<()> {
        self.set(index, Binding::Null(sql_type));
        Ok(())
    }

    fn add_batch(&mut self) -> DriverResult<()> {
        self.batch.push(std::mem::take(&mut self.params));
        Ok(())
    }

    fn set_query_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }
}

/// Buffered result rows.
pub struct SessionCursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<Value>>,
}

impl Cursor for SessionCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> DriverResult<Option<Vec<Value>>> {
        Ok(self.rows.next())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.rows = Vec::new().into_iter();
        Ok(())
    }
}

fn bind_value<'q>(query: MySqlQuery<'q>, value: &Value) -> MySqlQuery<'q> {
    match value.clone() {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(b),
        Value::Int(n) => query.bind(n),
        Value::UInt(n) => query.bind(n),
        Value::Float(f) => query.bind(f),
        Value::Text(s) => query.bind(s),
        Value::Bytes(b) => query.bind(b),
        Value::Date(d) => query.bind(d),
        Value::Time(t) => query.bind(t),
        Value::DateTime(dt) => query.bind(dt),
        Value::Timestamp(ts) => query.bind(ts),
    }
}

fn bind_null(query: MySqlQuery<'_>, sql_type: SqlType) -> MySqlQuery<'_> {
    match sql_type {
        SqlType::Boolean => query.bind(None::<bool>),
        SqlType::SmallInt => query.bind(None::<i16>),
        SqlType::Integer => query.bind(None::<i32>),
        SqlType::BigInt => query.bind(None::<i64>),
        SqlType::Real => query.bind(None::<f32>),
        SqlType::Double => query.bind(None::<f64>),
        SqlType::Varchar | SqlType::Other => query.bind(None::<String>),
        SqlType::Binary => query.bind(None::<Vec<u8>>),
        SqlType::Date => query.bind(None::<NaiveDate>),
        SqlType::Time => query.bind(None::<NaiveTime>),
        SqlType::Timestamp => query.bind(None::<NaiveDateTime>),
    }
}

fn build<'q>(sql: &'q str, params: &[Option<Binding>]) -> DriverResult<MySqlQuery<'q>> {
    let mut query = sqlx::query::<MySql>(sql);
    for (index, param) in params.iter().enumerate() {
        query = match param {
            Some(Binding::Value(value)) => bind_value(query, value),
            Some(Binding::Null(sql_type)) => bind_null(query, *sql_type),
            None => {
                return Err(sqlx::Error::Protocol(format!(
                    "parameter {} was never bound",
                    index + 1
                )))
            }
        };
    }
    Ok(query)
}

async fn with_timeout<T, F>(limit: Option<Duration>, work: F) -> DriverResult<T>
where
    F: Future<Output = DriverResult<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| {
            sqlx::Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("statement timed out after {limit:?}"),
            ))
        })?,
        None => work.await,
    }
}

/// How a cell of a given MySQL type is read into a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Bool,
    Int,
    UInt,
    Year,
    Bit,
    Float,
    Double,
    Date,
    Time,
    DateTime,
    Timestamp,
    Bytes,
    /// DECIMAL, JSON, ENUM, SET and the character types
    Text,
}

fn cell_kind(type_name: &str) -> CellKind {
    let type_name = type_name.to_ascii_uppercase();
    match type_name.as_str() {
        "BOOLEAN" => CellKind::Bool,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => CellKind::Int,
        name if name.ends_with("UNSIGNED") => CellKind::UInt,
        "YEAR" => CellKind::Year,
        "BIT" => CellKind::Bit,
        "FLOAT" => CellKind::Float,
        "DOUBLE" => CellKind::Double,
        "DATE" => CellKind::Date,
        "TIME" => CellKind::Time,
        "DATETIME" => CellKind::DateTime,
        "TIMESTAMP" => CellKind::Timestamp,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "GEOMETRY" => {
            CellKind::Bytes
        }
        _ => CellKind::Text,
    }
}

fn decode(row: &MySqlRow, index: usize) -> DriverResult<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let kind = cell_kind(raw.type_info().name());

    let value = match kind {
        CellKind::Bool => Value::Bool(row.try_get(index)?),
        CellKind::Int => Value::Int(row.try_get(index)?),
        CellKind::UInt => Value::UInt(row.try_get(index)?),
        CellKind::Year => Value::Int(i64::from(row.try_get_unchecked::<u16, _>(index)?)),
        CellKind::Bit => Value::UInt(row.try_get_unchecked(index)?),
        CellKind::Float => Value::Float(f64::from(row.try_get::<f32, _>(index)?)),
        CellKind::Double => Value::Float(row.try_get(index)?),
        CellKind::Date => Value::Date(row.try_get(index)?),
        CellKind::Time => Value::Time(row.try_get(index)?),
        CellKind::DateTime => Value::DateTime(row.try_get(index)?),
        CellKind::Timestamp => Value::Timestamp(row.try_get::<DateTime<Utc>, _>(index)?),
        CellKind::Bytes => Value::Bytes(row.try_get_unchecked(index)?),
        CellKind::Text => match row.try_get_unchecked::<String, _>(index) {
            Ok(text) => Value::Text(text),
            Err(_) => Value::Bytes(row.try_get_unchecked(index)?),
        },
    };
    Ok(value)
}

fn to_values(row: &MySqlRow) -> DriverResult<Vec<Value>> {
    (0..row.len()).map(|i| decode(row, i)).collect()
}

/// One key per inserted row; MySQL assigns consecutive ids to a multi-row insert.
fn generated_key_rows(last_insert_id: u64, rows_affected: u64) -> Vec<Vec<Value>> {
    if last_insert_id == 0 {
        return Vec::new();
    }
    (0..rows_affected)
        .map(|offset| vec![Value::UInt(last_insert_id + offset)])
        .collect()
}

#[async_trait]
impl Connection for MySqlSession {
    type Statement = SessionStatement;
    type Cursor = SessionCursor;

    async fn prepare(&mut self, sql: &str, keys: GeneratedKeys) -> DriverResult<SessionStatement> {
        let conn = self.link()?;
        let prepared = Executor::prepare(&mut *conn, sql).await?;
        let columns = sqlx::Statement::columns(&prepared)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        Ok(SessionStatement {
            sql: sql.to_string(),
            columns,
            keys,
            params: Vec::new(),
            batch: Vec::new(),
            timeout: None,
            last_write: None,
        })
    }

    async fn execute_query(&mut self, statement: &mut SessionStatement) -> DriverResult<SessionCursor> {
        let conn = self.link()?;
        let query = build(&statement.sql, &statement.params)?;
        let rows = with_timeout(statement.timeout, query.fetch_all(&mut *conn)).await?;

        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => statement.columns.clone(),
        };
        let rows = rows.iter().map(to_values).collect::<DriverResult<Vec<_>>>()?;
        Ok(SessionCursor {
            columns,
            rows: rows.into_iter(),
        })
    }

    async fn execute_update(&mut self, statement: &mut SessionStatement) -> DriverResult<u64> {
        let conn = self.link()?;
        let query = build(&statement.sql, &statement.params)?;
        let result = with_timeout(statement.timeout, query.execute(&mut *conn)).await?;
        let count = result.rows_affected();
        statement.last_write = Some(result);
        Ok(count)
    }

    async fn generated_keys(&mut self, statement: &mut SessionStatement) -> DriverResult<SessionCursor> {
        let rows = match (&statement.last_write, statement.keys) {
            (Some(result), GeneratedKeys::Return) => {
                generated_key_rows(result.last_insert_id(), result.rows_affected())
            }
            _ => Vec::new(),
        };
        Ok(SessionCursor {
            columns: vec![GENERATED_KEY.to_string()],
            rows: rows.into_iter(),
        })
    }

    async fn execute_batch(
        &mut self,
        statement: &mut SessionStatement,
    ) -> Result<Vec<u64>, BatchError> {
        let sets = std::mem::take(&mut statement.batch);
        let mut counts = Vec::with_capacity(sets.len());
        let conn = match self.link() {
            Ok(conn) => conn,
            Err(source) => return Err(BatchError { counts, source }),
        };

        for params in &sets {
            let outcome = match build(&statement.sql, params) {
                Ok(query) => with_timeout(statement.timeout, query.execute(&mut *conn)).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(result) => counts.push(result.rows_affected()),
                Err(source) => return Err(BatchError { counts, source }),
            }
        }
        Ok(counts)
    }

    async fn close_statement(&mut self, _statement: SessionStatement) -> DriverResult<()> {
        // the server-side statement stays in the connection's statement cache
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        match self.link.take() {
            Some(Link::Direct(conn)) => conn.close().await,
            // dropping a pooled connection returns it to the pool
            Some(Link::Pooled(conn)) => {
                drop(conn);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConnectionSource for MySqlPool {
    type Connection = MySqlSession;

    async fn acquire(&self) -> DriverResult<MySqlSession> {
        Ok(sqlx::Pool::acquire(self).await?.into())
    }
}
