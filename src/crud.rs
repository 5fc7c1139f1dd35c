//! CRUD statements generated from [`Entity`] metadata.
//!
//! Builders accept `bind(property, value)` calls that are checked against the entity's
//! columns, then build their SQL once in `execute`. Every placeholder is named after its
//! column, so property and column names are both accepted when binding.

use std::marker::PhantomData;
use std::time::Duration;

use tracing::debug;

use crate::bind::{Binding, Bindings};
use crate::driver::{Connection, ConnectionRef};
use crate::entity::{ColumnDef, Entity, EntityMetadata};
use crate::error::{Error, Result};
use crate::executor::{InsertExecutor, QueryExecutor, UpdateExecutor};
use crate::handlers::{BeanHandler, BeanListHandler, ResultSetHandler, ScalarHandler};
use crate::scope::abandon;
use crate::value::Value;

/// Column label of generated-key result sets.
pub const GENERATED_KEY: &str = "GENERATED_KEY";

/// Placeholder prefix of WHERE conditions on UPDATE, keeping them apart from SET values.
const WHERE_PREFIX: &str = "where_";

fn binding_of<T: Entity>(def: &ColumnDef, entity: &T) -> Result<Binding> {
    match entity.get_property(&def.property) {
        Some(Value::Null) => Ok(Binding::Null(def.sql_type)),
        Some(value) => Ok(Binding::Value(value)),
        None => Err(Error::mapping(&def.column, &def.property, "property is not readable")),
    }
}

fn put(bindings: &mut Bindings, name: &str, binding: Binding) -> Result<()> {
    match binding {
        Binding::Value(value) => bindings.bind(name, value),
        Binding::Null(sql_type) => bindings.bind_null(name, sql_type),
    }
}

/// Column conditions joined with AND, in bind order.
#[derive(Debug, Default)]
struct Criteria {
    conditions: Vec<(&'static str, Value)>,
}

impl Criteria {
    fn bind(&mut self, meta: &'static EntityMetadata, property: &str, value: Value) -> Result<()> {
        if property.trim().is_empty() {
            return Err(Error::usage("Property is null or blank string"));
        }
        let def = meta.find(property).ok_or_else(|| {
            Error::usage(format!(
                "{property} is not a property of the entity {}",
                meta.table()
            ))
        })?;
        let column = def.column.as_str();
        match self.conditions.iter_mut().find(|(c, _)| *c == column) {
            Some(condition) => condition.1 = value,
            None => self.conditions.push((column, value)),
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// ` WHERE a = :a AND b IS NULL`, or nothing without conditions.
    fn where_clause(&self, prefix: &str) -> String {
        if self.conditions.is_empty() {
            return String::new();
        }
        let conditions: Vec<String> = self
            .conditions
            .iter()
            .map(|(column, value)| match value {
                Value::Null => format!("{column} IS NULL"),
                _ => format!("{column} = :{prefix}{column}"),
            })
            .collect();
        format!(" WHERE {}", conditions.join(" AND "))
    }

    fn bind_into(&self, bindings: &mut Bindings, prefix: &str) -> Result<()> {
        for (column, value) in &self.conditions {
            if !value.is_null() {
                bindings.bind(&format!("{prefix}{column}"), value.clone())?;
            }
        }
        Ok(())
    }
}

/// Inserts `entity` and writes a generated key back into it.
pub(crate) async fn create<C: Connection, T: Entity>(
    conn: ConnectionRef<'_, C>,
    entity: &mut T,
    timeout: Option<Duration>,
) -> Result<u64> {
    let meta = T::metadata();
    let plan = || -> Result<(String, Bindings)> {
        meta.validate()?;
        let columns: Vec<&ColumnDef> = meta.insertable_columns().collect();
        let names: Vec<&str> = columns.iter().map(|c| c.column.as_str()).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES (:{})",
            meta.table(),
            names.join(", "),
            names.join(", :")
        );
        let mut bindings = Bindings::new();
        for def in columns {
            put(&mut bindings, &def.column, binding_of(def, &*entity)?)?;
        }
        Ok((sql, bindings))
    };
    let (sql, bindings) = match plan() {
        Ok(plan) => plan,
        Err(e) => return abandon(conn, e).await,
    };
    debug!("INSERT: {}", sql);

    let mut exec = InsertExecutor::new(conn, &sql)?.with_bindings(bindings);
    exec.query_timeout(timeout);
    let Some(generated) = meta.generated_column() else {
        return exec.execute().await;
    };

    let outcome = exec
        .execute_returning_keys(&ScalarHandler::<Value>::new())
        .await?;
    if let Some(key) = outcome.keys {
        match entity.set_property(&generated.property, key) {
            Ok(true) => {}
            Ok(false) => {
                return Err(Error::mapping(
                    GENERATED_KEY,
                    &generated.property,
                    "property is not writable",
                ))
            }
            Err(e) => return Err(Error::mapping(GENERATED_KEY, &generated.property, e)),
        }
    }
    Ok(outcome.rows_affected)
}

/// Reads entities matching the bound properties.
///
/// ```rust,no_run
/// # use sqlx_named_runner::{entity, QueryRunner};
/// # #[derive(Debug, Default)] struct Account { id: i64, name: String }
/// # entity! { Account in "account" { #[generated] id, name } }
/// # async fn example(runner: QueryRunner<sqlx::MySqlPool>) -> sqlx_named_runner::Result<()> {
/// let mut read = runner.read::<Account>().await?;
/// read.bind("name", "A")?;
/// let accounts = read.execute_all().await?;
/// # Ok(())
/// # }
/// ```
pub struct ReadEntityExecutor<'c, C, T> {
    conn: ConnectionRef<'c, C>,
    criteria: Criteria,
    timeout: Option<Duration>,
    _entity: PhantomData<fn() -> T>,
}

impl<'c, C: Connection, T: Entity + Default> ReadEntityExecutor<'c, C, T> {
    pub(crate) fn new(conn: ConnectionRef<'c, C>, timeout: Option<Duration>) -> Self {
        Self {
            conn,
            criteria: Criteria::default(),
            timeout,
            _entity: PhantomData,
        }
    }

    /// Adds `property = value` to the WHERE clause. A NULL value matches with `IS NULL`.
    ///
    /// # Errors
    ///
    /// [`Error::Usage`] if `property` is blank or names neither a property nor a column.
    pub fn bind(&mut self, property: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.criteria.bind(T::metadata(), property, value.into())?;
        Ok(self)
    }

    pub fn query_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    fn plan(&self) -> Result<(String, Bindings)> {
        let meta = T::metadata();
        meta.validate()?;
        let sql = format!(
            "SELECT * FROM {}{}",
            meta.table(),
            self.criteria.where_clause("")
        );
        let mut bindings = Bindings::new();
        self.criteria.bind_into(&mut bindings, "")?;
        Ok((sql, bindings))
    }

    async fn run<H: ResultSetHandler>(self, handler: &H) -> Result<H::Output> {
        let (sql, bindings) = match self.plan() {
            Ok(plan) => plan,
            Err(e) => return abandon(self.conn, e).await,
        };
        debug!("SELECT: {}", sql);
        let mut exec = QueryExecutor::new(self.conn, &sql)?.with_bindings(bindings);
        exec.query_timeout(self.timeout);
        exec.execute(handler).await
    }

    /// The first matching entity, if any.
    pub async fn execute(self) -> Result<Option<T>> {
        let handler = BeanHandler::with_processor(T::metadata().column_to_property());
        self.run(&handler).await
    }

    pub async fn execute_all(self) -> Result<Vec<T>> {
        let handler = BeanListHandler::with_processor(T::metadata().column_to_property());
        self.run(&handler).await
    }
}

/// Writes the current property values of an entity to the rows matching the bound
/// properties.
///
/// Without any bound property every row of the table is updated.
pub struct UpdateEntityExecutor<'c, C, T> {
    conn: ConnectionRef<'c, C>,
    values: Vec<(&'static ColumnDef, Result<Binding>)>,
    excluded: Vec<&'static str>,
    criteria: Criteria,
    timeout: Option<Duration>,
    _entity: PhantomData<fn() -> T>,
}

impl<'c, C: Connection, T: Entity> UpdateEntityExecutor<'c, C, T> {
    /// Takes a snapshot of the entity's property values.
    pub(crate) fn new(conn: ConnectionRef<'c, C>, entity: &T, timeout: Option<Duration>) -> Self {
        let values = T::metadata()
            .insertable_columns()
            .map(|def| (def, binding_of(def, entity)))
            .collect();
        Self {
            conn,
            values,
            excluded: Vec::new(),
            criteria: Criteria::default(),
            timeout,
            _entity: PhantomData,
        }
    }

    /// Adds `property = value` to the WHERE clause.
    pub fn bind(&mut self, property: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.criteria.bind(T::metadata(), property, value.into())?;
        Ok(self)
    }

    /// Leaves a column out of the SET list.
    ///
    /// # Errors
    ///
    /// [`Error::Usage`] if `column` names neither a property nor a column.
    pub fn exclude(&mut self, column: &str) -> Result<&mut Self> {
        let meta = T::metadata();
        let def = meta.find(column).ok_or_else(|| {
            Error::usage(format!("{column} is not a column of the entity {}", meta.table()))
        })?;
        if !self.excluded.contains(&def.column.as_str()) {
            self.excluded.push(&def.column);
        }
        Ok(self)
    }

    pub fn query_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    fn plan(&mut self) -> Result<(String, Bindings)> {
        let meta = T::metadata();
        meta.validate()?;

        let mut bindings = Bindings::new();
        let mut assignments = Vec::new();
        for (def, binding) in std::mem::take(&mut self.values) {
            if self.excluded.contains(&def.column.as_str()) {
                continue;
            }
            put(&mut bindings, &def.column, binding?)?;
            assignments.push(format!("{0} = :{0}", def.column));
        }
        if assignments.is_empty() {
            return Err(Error::usage(format!(
                "every column of {} is excluded, nothing to update",
                meta.table()
            )));
        }
        self.criteria.bind_into(&mut bindings, WHERE_PREFIX)?;

        let sql = format!(
            "UPDATE {} SET {}{}",
            meta.table(),
            assignments.join(", "),
            self.criteria.where_clause(WHERE_PREFIX)
        );
        Ok((sql, bindings))
    }

    /// Returns the number of rows updated.
    pub async fn execute(mut self) -> Result<u64> {
        let (sql, bindings) = match self.plan() {
            Ok(plan) => plan,
            Err(e) => return abandon(self.conn, e).await,
        };
        debug!("UPDATE: {}", sql);
        let mut exec = UpdateExecutor::new(self.conn, &sql)?.with_bindings(bindings);
        exec.query_timeout(self.timeout);
        exec.execute().await
    }
}

/// Deletes the rows matching the bound properties. At least one property must be bound.
pub struct DeleteEntityExecutor<'c, C, T> {
    conn: ConnectionRef<'c, C>,
    criteria: Criteria,
    timeout: Option<Duration>,
    _entity: PhantomData<fn() -> T>,
}

impl<'c, C: Connection, T: Entity> DeleteEntityExecutor<'c, C, T> {
    pub(crate) fn new(conn: ConnectionRef<'c, C>, timeout: Option<Duration>) -> Self {
        Self {
            conn,
            criteria: Criteria::default(),
            timeout,
            _entity: PhantomData,
        }
    }

    pub fn bind(&mut self, property: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.criteria.bind(T::metadata(), property, value.into())?;
        Ok(self)
    }

    pub fn query_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    fn plan(&self) -> Result<(String, Bindings)> {
        if self.criteria.is_empty() {
            return Err(Error::usage(
                "No parameters were bound, so this would delete the whole table.",
            ));
        }
        let meta = T::metadata();
        meta.validate()?;
        let sql = format!(
            "DELETE FROM {}{}",
            meta.table(),
            self.criteria.where_clause("")
        );
        let mut bindings = Bindings::new();
        self.criteria.bind_into(&mut bindings, "")?;
        Ok((sql, bindings))
    }

    /// Returns the number of rows deleted.
    pub async fn execute(self) -> Result<u64> {
        let (sql, bindings) = match self.plan() {
            Ok(plan) => plan,
            Err(e) => return abandon(self.conn, e).await,
        };
        debug!("DELETE: {}", sql);
        let mut exec = UpdateExecutor::new(self.conn, &sql)?.with_bindings(bindings);
        exec.query_timeout(self.timeout);
        exec.execute().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::GeneratedKeys;
    use crate::entity::tests::Account;
    use crate::testing::{Call, MockConnection};
    use crate::value::SqlType;

    fn account() -> Account {
        Account {
            id: 0,
            name: "A".into(),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_create_binds_columns_and_fills_generated_key() {
        let mut conn = MockConnection::new()
            .with_affected(1)
            .with_keys(vec![Value::UInt(42)]);
        let mut entity = account();

        let count = create(ConnectionRef::Borrowed(&mut conn), &mut entity, None)
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(entity.id, 42);
        assert_eq!(
            conn.calls()[0],
            Call::Prepare(
                "INSERT INTO account (name, email_address) VALUES (?, ?)".into(),
                GeneratedKeys::Return
            )
        );
        assert_eq!(
            conn.bound_values(),
            [
                (0, Binding::Value(Value::Text("A".into()))),
                (1, Binding::Null(SqlType::Varchar))
            ]
        );
    }

    #[tokio::test]
    async fn test_read_by_property_maps_renamed_columns() {
        let mut conn = MockConnection::new().with_rows(
            &["id", "name", "email_address"],
            vec![vec![
                Value::Int(42),
                Value::Text("A".into()),
                Value::Text("a@example.com".into()),
            ]],
        );
        let mut read = ReadEntityExecutor::<_, Account>::new(ConnectionRef::Borrowed(&mut conn), None);
        read.bind("id", 42).unwrap();
        let found = read.execute().await.unwrap().unwrap();

        assert_eq!(found.id, 42);
        assert_eq!(found.email.as_deref(), Some("a@example.com"));
        assert_eq!(conn.prepared_sql(), ["SELECT * FROM account WHERE id = ?"]);
    }

    #[tokio::test]
    async fn test_read_closes_owned_connection() {
        let conn = MockConnection::new().with_rows(&["id"], vec![]);
        let journal = conn.journal.clone();
        let mut read = ReadEntityExecutor::<_, Account>::new(ConnectionRef::Owned(conn), None);
        read.bind("name", "something").unwrap();

        assert_eq!(read.execute().await.unwrap(), None);
        let calls = journal.lock().unwrap().clone();
        assert_eq!(calls.iter().filter(|c| **c == Call::CloseStatement).count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == Call::CloseConnection).count(), 1);
    }

    #[tokio::test]
    async fn test_read_all_without_conditions() {
        let mut conn = MockConnection::new().with_rows(
            &["id", "name"],
            vec![
                vec![Value::Int(1), Value::Text("A".into())],
                vec![Value::Int(2), Value::Text("B".into())],
            ],
        );
        let read = ReadEntityExecutor::<_, Account>::new(ConnectionRef::Borrowed(&mut conn), None);
        let all = read.execute_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(conn.prepared_sql(), ["SELECT * FROM account"]);
    }

    #[test]
    fn test_bind_rejects_unknown_and_blank_properties() {
        let mut conn = MockConnection::new();
        let mut read = ReadEntityExecutor::<_, Account>::new(ConnectionRef::Borrowed(&mut conn), None);
        assert!(matches!(read.bind("password", "x"), Err(Error::Usage(_))));
        assert!(matches!(read.bind(" ", "x"), Err(Error::Usage(_))));
        assert!(read.bind("EMAIL_ADDRESS", "x").is_ok());
    }

    #[tokio::test]
    async fn test_update_uses_where_prefix_and_exclusions() {
        let mut conn = MockConnection::new().with_affected(1);
        let mut entity = account();
        entity.id = 42;

        let mut update =
            UpdateEntityExecutor::new(ConnectionRef::Borrowed(&mut conn), &entity, None);
        update.bind("id", 42).unwrap();
        update.exclude("email").unwrap();
        assert_eq!(update.execute().await.unwrap(), 1);

        assert_eq!(
            conn.prepared_sql(),
            ["UPDATE account SET name = ? WHERE id = ?"]
        );
        assert_eq!(
            conn.bound_values(),
            [
                (0, Binding::Value(Value::Text("A".into()))),
                (1, Binding::Value(Value::Int(42)))
            ]
        );
    }

    #[tokio::test]
    async fn test_update_everything_excluded_is_usage_error() {
        let conn = MockConnection::new();
        let journal = conn.journal.clone();
        let entity = account();
        let mut update = UpdateEntityExecutor::new(ConnectionRef::Owned(conn), &entity, None);
        update.exclude("name").unwrap().exclude("email_address").unwrap();

        assert!(matches!(update.execute().await, Err(Error::Usage(_))));
        assert_eq!(journal.lock().unwrap().clone(), [Call::CloseConnection]);
    }

    #[tokio::test]
    async fn test_delete_without_conditions_is_refused() {
        let mut conn = MockConnection::new();
        let delete = DeleteEntityExecutor::<_, Account>::new(ConnectionRef::Borrowed(&mut conn), None);
        match delete.execute().await.unwrap_err() {
            Error::Usage(message) => assert!(message.contains("would delete the whole table")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(conn.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_with_null_condition() {
        let mut conn = MockConnection::new().with_affected(2);
        let mut delete =
            DeleteEntityExecutor::<_, Account>::new(ConnectionRef::Borrowed(&mut conn), None);
        delete.bind("name", "A").unwrap().bind("email", Value::Null).unwrap();
        assert_eq!(delete.execute().await.unwrap(), 2);
        assert_eq!(
            conn.prepared_sql(),
            ["DELETE FROM account WHERE name = ? AND email_address IS NULL"]
        );
    }
}
