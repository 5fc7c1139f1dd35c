use std::time::Duration;

use crate::crud::{self, DeleteEntityExecutor, ReadEntityExecutor, UpdateEntityExecutor};
use crate::driver::{Connection, ConnectionRef, ConnectionSource};
use crate::entity::Entity;
use crate::error::Result;
use crate::executor::{
    parse_template, BatchExecutor, InsertExecutor, QueryExecutor, StatementExecutor,
    UpdateExecutor,
};
use crate::scope::abandon;

/// Settings applied to every statement a [`QueryRunner`] creates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Statement timeout passed to the driver (`None` = no limit)
    pub query_timeout: Option<Duration>,
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set query timeout
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }
}

/// Entry point for named-parameter statements and entity CRUD.
///
/// Every operation comes in up to three forms:
///
/// * `*_with(&mut conn, ..)` borrows a connection and leaves it open.
/// * `*_owned(conn, ..)` takes a connection and closes it once the statement is done.
/// * `query(..)`, `update(..)`, ... acquire a connection from the runner's
///   [`ConnectionSource`] and close it once the statement is done.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx::MySqlPool;
/// use sqlx_named_runner::{MySqlSession, QueryRunner};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = MySqlPool::connect("mysql://localhost/test").await?;
/// let mut session = MySqlSession::from(pool.acquire().await?);
///
/// let runner = QueryRunner::new();
/// let mut update = runner.update_with(&mut session, "DELETE FROM account WHERE id = :id")?;
/// update.bind("id", 42)?;
/// let deleted = update.execute().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryRunner<S = ()> {
    source: S,
    config: RunnerConfig,
}

impl QueryRunner<()> {
    /// A runner without a connection source; only the `*_with` and `*_owned` forms apply.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> QueryRunner<S> {
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn configured<'c, C: Connection, M>(
        &self,
        mut exec: StatementExecutor<'c, C, M>,
    ) -> StatementExecutor<'c, C, M> {
        exec.query_timeout(self.config.query_timeout);
        exec
    }

    fn executor<'c, C: Connection, M: Default>(
        &self,
        conn: &'c mut C,
        sql: &str,
    ) -> Result<StatementExecutor<'c, C, M>> {
        Ok(self.configured(StatementExecutor::new(ConnectionRef::Borrowed(conn), sql)?))
    }

    /// Closes `conn` before returning if `sql` is rejected.
    async fn owned_executor<'c, C: Connection + 'c, M: Default>(
        &self,
        conn: C,
        sql: &str,
    ) -> Result<StatementExecutor<'c, C, M>> {
        match parse_template(sql) {
            Ok(named) => Ok(self.configured(StatementExecutor::from_template(
                ConnectionRef::Owned(conn),
                named,
            ))),
            Err(e) => abandon(ConnectionRef::Owned(conn), e).await,
        }
    }

    pub fn query_with<'c, C: Connection>(
        &self,
        conn: &'c mut C,
        sql: &str,
    ) -> Result<QueryExecutor<'c, C>> {
        self.executor(conn, sql)
    }

    pub async fn query_owned<'c, C: Connection + 'c>(
        &self,
        conn: C,
        sql: &str,
    ) -> Result<QueryExecutor<'c, C>> {
        self.owned_executor(conn, sql).await
    }

    pub fn update_with<'c, C: Connection>(
        &self,
        conn: &'c mut C,
        sql: &str,
    ) -> Result<UpdateExecutor<'c, C>> {
        self.executor(conn, sql)
    }

    pub async fn update_owned<'c, C: Connection + 'c>(
        &self,
        conn: C,
        sql: &str,
    ) -> Result<UpdateExecutor<'c, C>> {
        self.owned_executor(conn, sql).await
    }

    pub fn insert_with<'c, C: Connection>(
        &self,
        conn: &'c mut C,
        sql: &str,
    ) -> Result<InsertExecutor<'c, C>> {
        self.executor(conn, sql)
    }

    pub async fn insert_owned<'c, C: Connection + 'c>(
        &self,
        conn: C,
        sql: &str,
    ) -> Result<InsertExecutor<'c, C>> {
        self.owned_executor(conn, sql).await
    }

    pub fn batch_with<'c, C: Connection>(
        &self,
        conn: &'c mut C,
        sql: &str,
    ) -> Result<BatchExecutor<'c, C>> {
        self.executor(conn, sql)
    }

    pub async fn batch_owned<'c, C: Connection + 'c>(
        &self,
        conn: C,
        sql: &str,
    ) -> Result<BatchExecutor<'c, C>> {
        self.owned_executor(conn, sql).await
    }

    /// Inserts `entity`, writing a generated key back into it.
    pub async fn create_with<C: Connection, T: Entity>(
        &self,
        conn: &mut C,
        entity: &mut T,
    ) -> Result<u64> {
        crud::create(ConnectionRef::Borrowed(conn), entity, self.config.query_timeout).await
    }

    pub async fn create_owned<C: Connection, T: Entity>(
        &self,
        conn: C,
        entity: &mut T,
    ) -> Result<u64> {
        crud::create(ConnectionRef::Owned(conn), entity, self.config.query_timeout).await
    }

    pub fn read_with<'c, C: Connection, T: Entity + Default>(
        &self,
        conn: &'c mut C,
    ) -> ReadEntityExecutor<'c, C, T> {
        ReadEntityExecutor::new(ConnectionRef::Borrowed(conn), self.config.query_timeout)
    }

    pub fn read_owned<'c, C: Connection + 'c, T: Entity + Default>(
        &self,
        conn: C,
    ) -> ReadEntityExecutor<'c, C, T> {
        ReadEntityExecutor::new(ConnectionRef::Owned(conn), self.config.query_timeout)
    }

    pub fn update_entity_with<'c, C: Connection, T: Entity>(
        &self,
        conn: &'c mut C,
        entity: &T,
    ) -> UpdateEntityExecutor<'c, C, T> {
        UpdateEntityExecutor::new(ConnectionRef::Borrowed(conn), entity, self.config.query_timeout)
    }

    pub fn update_entity_owned<'c, C: Connection + 'c, T: Entity>(
        &self,
        conn: C,
        entity: &T,
    ) -> UpdateEntityExecutor<'c, C, T> {
        UpdateEntityExecutor::new(ConnectionRef::Owned(conn), entity, self.config.query_timeout)
    }

    pub fn delete_with<'c, C: Connection, T: Entity>(
        &self,
        conn: &'c mut C,
    ) -> DeleteEntityExecutor<'c, C, T> {
        DeleteEntityExecutor::new(ConnectionRef::Borrowed(conn), self.config.query_timeout)
    }

    pub fn delete_owned<'c, C: Connection + 'c, T: Entity>(
        &self,
        conn: C,
    ) -> DeleteEntityExecutor<'c, C, T> {
        DeleteEntityExecutor::new(ConnectionRef::Owned(conn), self.config.query_timeout)
    }
}

impl<S> QueryRunner<S>
where
    S: ConnectionSource,
    S::Connection: 'static,
{
    /// A runner that acquires a connection per statement from `source`.
    pub fn with_source(source: S) -> Self {
        Self {
            source,
            config: RunnerConfig::default(),
        }
    }

    /// Parses `sql` first so a bad statement never takes a connection.
    async fn acquired<M: Default>(
        &self,
        sql: &str,
    ) -> Result<StatementExecutor<'static, S::Connection, M>> {
        let named = parse_template(sql)?;
        let conn = self.source.acquire().await?;
        Ok(self.configured(StatementExecutor::from_template(ConnectionRef::Owned(conn), named)))
    }

    pub async fn query(&self, sql: &str) -> Result<QueryExecutor<'static, S::Connection>> {
        self.acquired(sql).await
    }

    pub async fn update(&self, sql: &str) -> Result<UpdateExecutor<'static, S::Connection>> {
        self.acquired(sql).await
    }

    pub async fn insert(&self, sql: &str) -> Result<InsertExecutor<'static, S::Connection>> {
        self.acquired(sql).await
    }

    pub async fn batch(&self, sql: &str) -> Result<BatchExecutor<'static, S::Connection>> {
        self.acquired(sql).await
    }

    pub async fn create<T: Entity>(&self, entity: &mut T) -> Result<u64> {
        let conn = self.source.acquire().await?;
        self.create_owned(conn, entity).await
    }

    pub async fn read<T: Entity + Default>(
        &self,
    ) -> Result<ReadEntityExecutor<'static, S::Connection, T>> {
        Ok(self.read_owned(self.source.acquire().await?))
    }

    pub async fn update_entity<T: Entity>(
        &self,
        entity: &T,
    ) -> Result<UpdateEntityExecutor<'static, S::Connection, T>> {
        Ok(self.update_entity_owned(self.source.acquire().await?, entity))
    }

    pub async fn delete<T: Entity>(
        &self,
    ) -> Result<DeleteEntityExecutor<'static, S::Connection, T>> {
        Ok(self.delete_owned(self.source.acquire().await?))
    }
}
