//! Single-use statement executors.
//!
//! An executor owns a parsed template and its bindings and runs exactly once: every
//! `execute*` method takes `self`, so binding after execution does not compile. Whatever
//! the outcome, the statement, any cursor and an owned connection are released before the
//! result is returned.

use std::time::Duration;

use tracing::debug;

use crate::bind::{Binding, Bindings};
use crate::builder::NamedSql;
use crate::driver::{Connection, ConnectionRef, GeneratedKeys};
use crate::error::{Error, Result};
use crate::handlers::ResultSetHandler;
use crate::result::ResultSet;
use crate::scope::StatementScope;
use crate::value::{SqlType, Value};

/// Runs a read and hands the cursor to a [`ResultSetHandler`].
#[derive(Debug, Default)]
pub struct Query;

/// Runs a write and returns the affected-row count.
#[derive(Debug, Default)]
pub struct Update;

/// Runs a write whose generated keys can be read back.
#[derive(Debug, Default)]
pub struct Insert;

/// Runs one statement over many parameter sets.
#[derive(Debug, Default)]
pub struct Batch {
    rows: Vec<Vec<Binding>>,
    names: Option<Vec<String>>,
}

pub type QueryExecutor<'c, C> = StatementExecutor<'c, C, Query>;
pub type UpdateExecutor<'c, C> = StatementExecutor<'c, C, Update>;
pub type InsertExecutor<'c, C> = StatementExecutor<'c, C, Insert>;
pub type BatchExecutor<'c, C> = StatementExecutor<'c, C, Batch>;

/// Affected rows of an insert together with its handled generated keys.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOutcome<K> {
    pub rows_affected: u64,
    pub keys: K,
}

/// A named-parameter statement bound to a connection, in one of the execution modes
/// [`Query`], [`Update`], [`Insert`] or [`Batch`].
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx::MySqlPool;
/// use sqlx_named_runner::{QueryRunner, ScalarHandler};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = MySqlPool::connect("mysql://localhost/test").await?;
/// let runner = QueryRunner::with_source(pool);
///
/// let mut query = runner.query("SELECT name FROM account WHERE id = :id").await?;
/// query.bind("id", 42)?;
/// let name: Option<String> = query.execute(&ScalarHandler::new()).await?;
/// # Ok(())
/// # }
/// ```
pub struct StatementExecutor<'c, C: Connection, M> {
    conn: ConnectionRef<'c, C>,
    named: NamedSql,
    bindings: Bindings,
    timeout: Option<Duration>,
    mode: M,
}

impl<'c, C: Connection, M: Default> StatementExecutor<'c, C, M> {
    /// Parses `sql` for an execution over `conn`.
    ///
    /// An owned `conn` is dropped without being closed if `sql` is rejected, so the
    /// public owned entry points parse before taking the connection over.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if `sql` is blank.
    pub(crate) fn new(conn: ConnectionRef<'c, C>, sql: &str) -> Result<Self> {
        Ok(Self::from_template(conn, parse_template(sql)?))
    }

    pub(crate) fn from_template(conn: ConnectionRef<'c, C>, named: NamedSql) -> Self {
        Self {
            conn,
            named,
            bindings: Bindings::new(),
            timeout: None,
            mode: M::default(),
        }
    }
}

/// Checks and parses statement text before any connection is involved.
pub(crate) fn parse_template(sql: &str) -> Result<NamedSql> {
    if sql.trim().is_empty() {
        return Err(Error::usage("SQL statement is null or blank string"));
    }
    NamedSql::parse(sql)
}

impl<'c, C: Connection, M> StatementExecutor<'c, C, M> {
    /// Binds `value` to every occurrence of `:name`.
    ///
    /// The leading `:` is optional. Binding a name again replaces the earlier value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if `name` is blank; nothing reaches the connection.
    pub fn bind(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.bindings.bind(name, value)?;
        Ok(self)
    }

    /// Binds a NULL of `sql_type` to every occurrence of `:name`.
    pub fn bind_null(&mut self, name: &str, sql_type: SqlType) -> Result<&mut Self> {
        self.bindings.bind_null(name, sql_type)?;
        Ok(self)
    }

    pub(crate) fn with_bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = bindings;
        self
    }

    /// Limits how long the driver may run the statement. `None` removes the limit.
    pub fn query_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// The statement as sent to the driver.
    pub fn sql(&self) -> &str {
        self.named.sql()
    }

    /// Parameter name of each positional marker.
    pub fn parameter_order(&self) -> &[String] {
        self.named.order()
    }

    fn into_scope(self) -> (StatementScope<'c, C>, Prepared, M) {
        let prepared = Prepared {
            named: self.named,
            bindings: self.bindings,
            timeout: self.timeout,
        };
        (StatementScope::new(self.conn), prepared, self.mode)
    }
}

/// What an executor hands to its scope.
struct Prepared {
    named: NamedSql,
    bindings: Bindings,
    timeout: Option<Duration>,
}

impl Prepared {
    /// Resolves the bindings, then prepares and binds the statement.
    async fn apply<C: Connection>(
        &self,
        scope: &mut StatementScope<'_, C>,
        keys: GeneratedKeys,
    ) -> Result<()> {
        let actions = self.bindings.resolve(self.named.order())?;
        for name in self.bindings.unused(self.named.order()) {
            debug!(name, "binding is not used by the statement");
        }
        scope.prepare(self.named.sql(), keys, self.timeout).await?;
        scope.bind_all(&actions)
    }
}

impl<'c, C: Connection> StatementExecutor<'c, C, Query> {
    /// Runs the query and maps its rows with `handler`.
    ///
    /// # Errors
    ///
    /// [`Error::MissingBinding`] if a placeholder is unbound, or whatever the driver or the
    /// handler fails with. Resources are released in every case.
    pub async fn execute<H: ResultSetHandler>(self, handler: &H) -> Result<H::Output> {
        let (mut scope, prepared, _) = self.into_scope();
        let outcome: Result<H::Output> = async {
            prepared.apply(&mut scope, GeneratedKeys::Ignore).await?;
            let cursor = scope.execute_query().await?;
            debug!(sql = prepared.named.sql(), "query executed");
            handler.handle(&mut ResultSet::new(cursor))
        }
        .await;
        scope.finish(outcome).await
    }
}

impl<'c, C: Connection> StatementExecutor<'c, C, Update> {
    /// Runs the write and returns the number of affected rows; zero is not an error.
    pub async fn execute(self) -> Result<u64> {
        let (mut scope, prepared, _) = self.into_scope();
        let outcome: Result<u64> = async {
            prepared.apply(&mut scope, GeneratedKeys::Ignore).await?;
            let count = scope.execute_update().await?;
            debug!(sql = prepared.named.sql(), rows_affected = count, "update executed");
            Ok(count)
        }
        .await;
        scope.finish(outcome).await
    }
}

impl<'c, C: Connection> StatementExecutor<'c, C, Insert> {
    /// Runs the insert without reading generated keys.
    pub async fn execute(self) -> Result<u64> {
        let (mut scope, prepared, _) = self.into_scope();
        let outcome: Result<u64> = async {
            prepared.apply(&mut scope, GeneratedKeys::Ignore).await?;
            let count = scope.execute_update().await?;
            debug!(sql = prepared.named.sql(), rows_affected = count, "insert executed");
            Ok(count)
        }
        .await;
        scope.finish(outcome).await
    }

    /// Runs the insert and maps the generated keys with `handler`.
    ///
    /// The keys arrive as a result set with one column, `GENERATED_KEY`, and one row per
    /// generated value.
    ///
    /// ```rust,no_run
    /// # use sqlx_named_runner::{QueryRunner, ScalarHandler};
    /// # async fn example(runner: QueryRunner<sqlx::MySqlPool>) -> sqlx_named_runner::Result<()> {
    /// let mut insert = runner.insert("INSERT INTO account (name) VALUES (:name)").await?;
    /// insert.bind("name", "A")?;
    /// let outcome = insert.execute_returning_keys(&ScalarHandler::<i64>::new()).await?;
    /// assert_eq!(outcome.rows_affected, 1);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute_returning_keys<H: ResultSetHandler>(
        self,
        handler: &H,
    ) -> Result<InsertOutcome<H::Output>> {
        let (mut scope, prepared, _) = self.into_scope();
        let outcome: Result<InsertOutcome<H::Output>> = async {
            prepared.apply(&mut scope, GeneratedKeys::Return).await?;
            let rows_affected = scope.execute_update().await?;
            debug!(sql = prepared.named.sql(), rows_affected, "insert executed");
            let cursor = scope.generated_keys().await?;
            let keys = handler.handle(&mut ResultSet::new(cursor))?;
            Ok(InsertOutcome { rows_affected, keys })
        }
        .await;
        scope.finish(outcome).await
    }
}

impl<'c, C: Connection> StatementExecutor<'c, C, Batch> {
    /// Closes the current parameter set and starts an empty one.
    ///
    /// # Errors
    ///
    /// [`Error::MissingBinding`] if a placeholder is unbound, and [`Error::Usage`] if the
    /// set binds different names than the first set of the batch.
    pub fn add_batch(&mut self) -> Result<&mut Self> {
        let row: Vec<Binding> = self
            .bindings
            .resolve(self.named.order())?
            .into_iter()
            .cloned()
            .collect();

        let mut names: Vec<String> = self.bindings.names().map(str::to_owned).collect();
        names.sort_unstable();
        match &self.mode.names {
            Some(first) if *first != names => {
                return Err(Error::usage(format!(
                    "parameter set {} binds [{}] but the batch started with [{}]",
                    self.mode.rows.len(),
                    names.join(", "),
                    first.join(", ")
                )));
            }
            Some(_) => {}
            None => self.mode.names = Some(names),
        }

        self.mode.rows.push(row);
        self.bindings = Bindings::new();
        Ok(self)
    }

    /// Number of parameter sets added so far.
    pub fn batch_len(&self) -> usize {
        self.mode.rows.len()
    }

    /// Runs every parameter set and returns their affected-row counts in order.
    ///
    /// # Errors
    ///
    /// [`Error::BatchPartialFailure`] when a set fails: the counts of the sets applied
    /// before it are kept and later sets are not run. [`Error::Usage`] if no set was
    /// added or bindings were made after the last [`add_batch`](Self::add_batch).
    pub async fn execute(self) -> Result<Vec<u64>> {
        let pending = self.bindings.len();
        let (mut scope, prepared, batch) = self.into_scope();
        let outcome: Result<Vec<u64>> = async {
            if pending > 0 {
                return Err(Error::usage(
                    "bindings were made after the last add_batch and would be dropped",
                ));
            }
            if batch.rows.is_empty() {
                return Err(Error::usage("batch has no parameter sets"));
            }
            scope
                .prepare(prepared.named.sql(), GeneratedKeys::Ignore, prepared.timeout)
                .await?;
            for row in &batch.rows {
                let actions: Vec<&Binding> = row.iter().collect();
                scope.bind_all(&actions)?;
                scope.add_batch()?;
            }
            let counts = scope.execute_batch().await?;
            debug!(sql = prepared.named.sql(), sets = counts.len(), "batch executed");
            Ok(counts)
        }
        .await;
        scope.finish(outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::tests::TestBean;
    use crate::handlers::{ArrayHandler, BeanHandler, ScalarHandler};
    use crate::testing::{Call, FailAt, MockConnection};

    fn query<'c>(conn: &'c mut MockConnection, sql: &str) -> QueryExecutor<'c, MockConnection> {
        StatementExecutor::new(ConnectionRef::Borrowed(conn), sql).unwrap()
    }

    #[derive(Debug, Default, PartialEq)]
    struct Account {
        id: i64,
        name: String,
    }

    crate::bean!(Account { id, name });

    #[tokio::test]
    async fn test_query_maps_row_to_bean() {
        let mut conn = MockConnection::new().with_rows(
            &["id", "name"],
            vec![vec![Value::Int(42), Value::Text("A".into())]],
        );

        let mut exec = query(&mut conn, "select * from account where id = :id");
        exec.bind("id", 42).unwrap();
        let account = exec.execute(&BeanHandler::<Account>::new()).await.unwrap();

        assert_eq!(
            account,
            Some(Account {
                id: 42,
                name: "A".into()
            })
        );
        assert_eq!(conn.prepared_sql(), ["select * from account where id = ?"]);
        assert_eq!(conn.bound_values(), [(0, Binding::Value(Value::Int(42)))]);
        assert_eq!(conn.count(&Call::CloseCursor), 1);
        assert_eq!(conn.count(&Call::CloseStatement), 1);
        assert_eq!(conn.count(&Call::CloseConnection), 0);
    }

    #[tokio::test]
    async fn test_query_zero_rows_is_absent() {
        let mut conn = MockConnection::new().with_rows(&["one", "two"], vec![]);
        let mut exec = query(&mut conn, "SELECT one, two FROM t WHERE one = :one");
        exec.bind("one", "x").unwrap();
        let bean = exec.execute(&BeanHandler::<TestBean>::new()).await.unwrap();
        assert_eq!(bean, None);
    }

    #[tokio::test]
    async fn test_repeated_name_binds_every_slot() {
        let mut conn = MockConnection::new();
        let mut exec = query(&mut conn, "SELECT * FROM t WHERE a = :id OR b = :id");
        exec.bind(":id", 7).unwrap();
        assert_eq!(exec.parameter_order(), ["id", "id"]);
        exec.execute(&ArrayHandler).await.unwrap();

        assert_eq!(
            conn.bound_values(),
            [
                (0, Binding::Value(Value::Int(7))),
                (1, Binding::Value(Value::Int(7)))
            ]
        );
    }

    #[tokio::test]
    async fn test_blank_name_fails_before_touching_connection() {
        let mut conn = MockConnection::new();
        let mut exec = query(&mut conn, "SELECT * FROM t WHERE id = :id");
        assert!(matches!(exec.bind("", 1), Err(Error::Usage(_))));
        drop(exec);
        assert!(conn.calls().is_empty());
    }

    #[tokio::test]
    async fn test_blank_sql_is_usage_error() {
        let mut conn = MockConnection::new();
        let exec = UpdateExecutor::new(ConnectionRef::Borrowed(&mut conn), "   ");
        assert!(matches!(exec, Err(Error::Usage(_))));
    }

    #[tokio::test]
    async fn test_extra_name_still_reports_missing_placeholder() {
        let conn = MockConnection::new();
        let journal = conn.journal.clone();
        let mut exec: UpdateExecutor<'_, MockConnection> =
            StatementExecutor::new(ConnectionRef::Owned(conn), "DELETE FROM t WHERE id = :id")
                .unwrap();
        exec.bind("other", 1).unwrap();

        match exec.execute().await.unwrap_err() {
            Error::MissingBinding(names) => assert_eq!(names, ["id"]),
            other => panic!("unexpected error: {other}"),
        }
        let calls = journal.lock().unwrap().clone();
        assert_eq!(calls, [Call::CloseConnection]);
    }

    #[tokio::test]
    async fn test_update_with_no_matching_rows_returns_zero() {
        let mut conn = MockConnection::new().with_affected(0);
        let mut exec: UpdateExecutor<'_, MockConnection> = StatementExecutor::new(
            ConnectionRef::Borrowed(&mut conn),
            "UPDATE account SET name = :name WHERE id = :id",
        )
        .unwrap();
        exec.bind("name", "B").unwrap().bind("id", 1).unwrap();
        assert_eq!(exec.execute().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_typed_null_uses_null_bind() {
        let mut conn = MockConnection::new().with_affected(1);
        let mut exec: UpdateExecutor<'_, MockConnection> = StatementExecutor::new(
            ConnectionRef::Borrowed(&mut conn),
            "UPDATE account SET email = :email WHERE id = :id",
        )
        .unwrap();
        exec.bind_null("email", SqlType::Varchar)
            .unwrap()
            .bind("id", 3)
            .unwrap();
        exec.execute().await.unwrap();

        assert_eq!(
            conn.bound_values(),
            [
                (0, Binding::Null(SqlType::Varchar)),
                (1, Binding::Value(Value::Int(3)))
            ]
        );
    }

    #[tokio::test]
    async fn test_release_once_on_success_and_driver_failure() {
        for fail in [None, Some(FailAt::Execute)] {
            let mut conn = MockConnection::new().with_rows(&["id"], vec![vec![Value::Int(1)]]);
            conn.fail_at = fail;
            let journal = conn.journal.clone();

            let exec: QueryExecutor<'_, MockConnection> =
                StatementExecutor::new(ConnectionRef::Owned(conn), "SELECT id FROM t").unwrap();
            let outcome = exec.execute(&ScalarHandler::<i64>::new()).await;
            assert_eq!(outcome.is_err(), fail.is_some());

            let calls = journal.lock().unwrap().clone();
            assert_eq!(calls.iter().filter(|c| **c == Call::CloseStatement).count(), 1);
            assert_eq!(calls.iter().filter(|c| **c == Call::CloseConnection).count(), 1);
        }
    }

    #[tokio::test]
    async fn test_release_once_when_handler_fails() {
        let conn = MockConnection::new().with_rows(&["id"], vec![vec![Value::Text("x".into())]]);
        let journal = conn.journal.clone();

        let exec: QueryExecutor<'_, MockConnection> =
            StatementExecutor::new(ConnectionRef::Owned(conn), "SELECT id FROM t").unwrap();
        let err = exec.execute(&ScalarHandler::<i64>::new()).await.unwrap_err();
        assert!(matches!(err, Error::Mapping { .. }));

        let calls = journal.lock().unwrap().clone();
        let tail: Vec<&Call> = calls.iter().rev().take(3).collect();
        assert_eq!(
            tail,
            [&Call::CloseConnection, &Call::CloseStatement, &Call::CloseCursor]
        );
    }

    #[tokio::test]
    async fn test_insert_returns_generated_keys() {
        let mut conn = MockConnection::new()
            .with_affected(1)
            .with_keys(vec![Value::UInt(17)]);
        let mut exec: InsertExecutor<'_, MockConnection> = StatementExecutor::new(
            ConnectionRef::Borrowed(&mut conn),
            "INSERT INTO account (name) VALUES (:name)",
        )
        .unwrap();
        exec.bind("name", "A").unwrap();
        let outcome = exec
            .execute_returning_keys(&ScalarHandler::<i64>::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            InsertOutcome {
                rows_affected: 1,
                keys: Some(17)
            }
        );
        assert_eq!(
            conn.calls()[0],
            Call::Prepare(
                "INSERT INTO account (name) VALUES (?)".into(),
                GeneratedKeys::Return
            )
        );
    }

    #[tokio::test]
    async fn test_insert_duplicate_key_propagates_driver_error() {
        let mut conn = MockConnection::new().failing_at(FailAt::Execute);
        let mut exec: InsertExecutor<'_, MockConnection> = StatementExecutor::new(
            ConnectionRef::Borrowed(&mut conn),
            "INSERT INTO account (id) VALUES (:id)",
        )
        .unwrap();
        exec.bind("id", 1).unwrap();
        let err = exec.execute().await.unwrap_err();
        assert!(err.to_string().contains("Duplicate entry"));
        assert_eq!(conn.count(&Call::CloseStatement), 1);
    }

    fn batch(conn: &mut MockConnection) -> BatchExecutor<'_, MockConnection> {
        StatementExecutor::new(
            ConnectionRef::Borrowed(conn),
            "INSERT INTO account (email) VALUES (:email)",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_batch_returns_count_per_set() {
        let mut conn = MockConnection::new().with_affected(1);
        let mut exec = batch(&mut conn);
        for email in ["a@x", "b@x", "c@x"] {
            exec.bind("email", email).unwrap();
            exec.add_batch().unwrap();
        }
        assert_eq!(exec.batch_len(), 3);
        assert_eq!(exec.execute().await.unwrap(), [1, 1, 1]);
        assert_eq!(conn.count(&Call::AddBatch), 3);
        assert_eq!(conn.prepared_sql(), ["INSERT INTO account (email) VALUES (?)"]);
    }

    #[tokio::test]
    async fn test_batch_failure_keeps_applied_counts() {
        let mut conn = MockConnection::new().with_affected(1).failing_batch_at(1);
        let mut exec = batch(&mut conn);
        for email in ["a@x", "a@x", "c@x"] {
            exec.bind("email", email).unwrap();
            exec.add_batch().unwrap();
        }
        match exec.execute().await.unwrap_err() {
            Error::BatchPartialFailure {
                counts,
                failed_index,
                source,
            } => {
                assert_eq!(counts, [1]);
                assert_eq!(failed_index, 1);
                assert!(source.to_string().contains("Duplicate entry"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(conn.count(&Call::CloseStatement), 1);
    }

    #[tokio::test]
    async fn test_batch_sets_must_bind_same_names() {
        let mut conn = MockConnection::new();
        let mut exec = batch(&mut conn);
        exec.bind("email", "a@x").unwrap();
        exec.add_batch().unwrap();
        exec.bind("email", "b@x").unwrap().bind("name", "B").unwrap();
        assert!(matches!(exec.add_batch(), Err(Error::Usage(_))));
    }

    #[tokio::test]
    async fn test_empty_batch_and_dangling_bindings_are_rejected() {
        let mut conn = MockConnection::new();
        let err = batch(&mut conn).execute().await.unwrap_err();
        assert!(matches!(err, Error::Usage(_)));

        let mut exec = batch(&mut conn);
        exec.bind("email", "a@x").unwrap();
        exec.add_batch().unwrap();
        exec.bind("email", "b@x").unwrap();
        assert!(matches!(exec.execute().await, Err(Error::Usage(_))));
        assert_eq!(conn.count(&Call::ExecuteBatch), 0);
    }

    #[tokio::test]
    async fn test_query_timeout_reaches_statement() {
        let mut conn = MockConnection::new();
        let mut exec = query(&mut conn, "SELECT 1");
        exec.query_timeout(Some(Duration::from_millis(250)));
        exec.execute(&ArrayHandler).await.unwrap();
        assert_eq!(conn.count(&Call::Timeout(Some(Duration::from_millis(250)))), 1);
    }
}
