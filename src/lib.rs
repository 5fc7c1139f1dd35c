//! # sqlx-named-runner
//!
//! A statement runner for SQLx with named parameters, pluggable result handlers and
//! entity CRUD, releasing every driver resource on success and failure alike.
//!
//! ## Features
//!
//! - **Named Placeholders**: Use `:param_name` instead of `?`; one name may appear many times
//! - **Result Handlers**: Turn a result set into arrays, maps, scalars or beans through [`ResultSetHandler`]
//! - **Entity CRUD**: `create`, `read`, `update` and `delete` generated from [`entity!`] metadata
//! - **Batches**: Many parameter sets against one prepared statement, with per-set counts
//! - **Connection Ownership**: Borrowed connections stay open; owned or acquired ones are closed after execution
//!
//! ## Quick Start
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! sqlx = { version = "0.8", features = ["mysql", "runtime-tokio"] }
//! sqlx-named-runner = "0.1"
//! ```
//!
//! ## Examples
//!
//! ### Querying into Beans
//!
//! ```rust,no_run
//! use sqlx::MySqlPool;
//! use sqlx_named_runner::{bean, BeanListHandler, QueryRunner};
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! bean!(User { id, name });
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = MySqlPool::connect("mysql://localhost/test").await?;
//! let runner = QueryRunner::with_source(pool);
//!
//! let mut query = runner
//!     .query("SELECT id, name FROM users WHERE age >= :min_age AND age < :min_age + 10")
//!     .await?;
//! query.bind("min_age", 18)?;
//!
//! let users: Vec<User> = query.execute(&BeanListHandler::new()).await?;
//! for user in users {
//!     println!("{}: {}", user.id, user.name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Entity CRUD
//!
//! ```rust,no_run
//! use sqlx::MySqlPool;
//! use sqlx_named_runner::{entity, QueryRunner};
//!
//! #[derive(Debug, Default)]
//! struct Account {
//!     id: i64,
//!     name: String,
//!     email: Option<String>,
//! }
//!
//! entity! {
//!     Account in "account" {
//!         #[generated] id,
//!         name,
//!         email => "email_address",
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let pool = MySqlPool::connect("mysql://localhost/test").await?;
//! let runner = QueryRunner::with_source(pool);
//!
//! let mut account = Account { name: "alice".into(), ..Default::default() };
//! runner.create(&mut account).await?;
//!
//! let mut read = runner.read::<Account>().await?;
//! read.bind("id", account.id)?;
//! let found = read.execute().await?;
//! assert_eq!(found.map(|a| a.name), Some("alice".to_string()));
//!
//! let mut delete = runner.delete::<Account>().await?;
//! delete.bind("id", account.id)?;
//! delete.execute().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Using a Connection You Keep
//!
//! ```rust,no_run
//! use sqlx::MySqlPool;
//! use sqlx_named_runner::{MySqlSession, QueryRunner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let pool = MySqlPool::connect("mysql://localhost/test").await?;
//! let mut session = MySqlSession::from(pool.acquire().await?);
//! let runner = QueryRunner::new();
//!
//! let mut debit = runner.update_with(
//!     &mut session,
//!     "UPDATE accounts SET balance = balance - :amount WHERE id = :id",
//! )?;
//! debit.bind("amount", 100)?.bind("id", 1)?;
//! debit.execute().await?;
//!
//! // the session is still open here
//! # Ok(())
//! # }
//! ```
//!
//! ## How It Works
//!
//! 1. **Parse**: Named placeholders (`:name`) are rewritten to positional `?` and their order recorded
//! 2. **Bind**: Values are collected by name and resolved to positions when the statement runs
//! 3. **Execute**: The statement is prepared, bound, run and handed to a handler; cursor,
//!    statement and (if owned) connection are then released in that order
//!
//! ## Limitations
//!
//! - The bundled driver targets MySQL
//! - Placeholder names must match `[a-zA-Z0-9_]+`
//!
//! ## License
//!
//! Licensed under either of Apache License, Version 2.0 or MIT license at your option.

pub mod bean;
pub mod bind;
pub mod builder;
pub mod crud;
pub mod driver;
pub mod entity;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod mysql;
pub mod result;
pub mod runner;
mod scope;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use bean::{Bean, BeanProcessor};
pub use bind::{Binding, Bindings};
pub use builder::{build_query, NamedSql};
pub use crud::{DeleteEntityExecutor, ReadEntityExecutor, UpdateEntityExecutor, GENERATED_KEY};
pub use driver::{
    BatchError, Connection, ConnectionRef, ConnectionSource, Cursor, DriverResult, GeneratedKeys,
    Statement,
};
pub use entity::{ColumnDef, Entity, EntityMetadata};
pub use error::{Error, Result};
pub use executor::{
    BatchExecutor, InsertExecutor, InsertOutcome, QueryExecutor, StatementExecutor,
    UpdateExecutor,
};
pub use handlers::{
    ArrayHandler, ArrayListHandler, BeanHandler, BeanListHandler, MapHandler, MapListHandler,
    ResultSetHandler, ScalarHandler,
};
pub use mysql::MySqlSession;
pub use result::{Columns, ResultSet, Row};
pub use runner::{QueryRunner, RunnerConfig};
pub use value::{CoercionError, FromValue, SqlType, ToValue, Value};

/// Convenience re-exports for common use cases
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::handlers::*;
    pub use crate::{bean, entity};
    pub use crate::{Bean, Entity, QueryRunner, RunnerConfig, Value};
}
