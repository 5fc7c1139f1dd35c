//! Strategies that turn a [`ResultSet`] into the shape the caller wants.

use std::collections::HashMap;
use std::marker::PhantomData;

use crate::bean::{Bean, BeanProcessor};
use crate::error::{Error, Result};
use crate::result::ResultSet;
use crate::value::{FromValue, Value};

/// Converts a live result set into a value.
///
/// Handlers receive the cursor positioned before the first row. Single-row handlers read at
/// most one row and return `None` when there is none; list handlers drain the cursor.
///
/// Any `Fn(&mut ResultSet<'_>) -> Result<T>` is a handler as well:
///
/// ```
/// use sqlx_named_runner::{ResultSet, ResultSetHandler, Result};
///
/// fn count_rows(rs: &mut ResultSet<'_>) -> Result<usize> {
///     let mut n = 0;
///     while rs.next()?.is_some() {
///         n += 1;
///     }
///     Ok(n)
/// }
///
/// fn assert_handler<H: ResultSetHandler>(_: &H) {}
/// assert_handler(&count_rows);
/// ```
pub trait ResultSetHandler {
    type Output;

    fn handle(&self, rs: &mut ResultSet<'_>) -> Result<Self::Output>;
}

impl<F, T> ResultSetHandler for F
where
    F: Fn(&mut ResultSet<'_>) -> Result<T>,
{
    type Output = T;

    fn handle(&self, rs: &mut ResultSet<'_>) -> Result<T> {
        self(rs)
    }
}

/// First row as its column values.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayHandler;

impl ResultSetHandler for ArrayHandler {
    type Output = Option<Vec<Value>>;

    fn handle(&self, rs: &mut ResultSet<'_>) -> Result<Self::Output> {
        Ok(rs.next()?.map(|row| row.into_values()))
    }
}

/// Every row as its column values.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayListHandler;

impl ResultSetHandler for ArrayListHandler {
    type Output = Vec<Vec<Value>>;

    fn handle(&self, rs: &mut ResultSet<'_>) -> Result<Self::Output> {
        let mut rows = Vec::new();
        while let Some(row) = rs.next()? {
            rows.push(row.into_values());
        }
        Ok(rows)
    }
}

/// First row as a bean. Zero rows give `None`, never a default bean.
#[derive(Debug, Clone)]
pub struct BeanHandler<T> {
    processor: BeanProcessor,
    _bean: PhantomData<fn() -> T>,
}

impl<T: Bean + Default> BeanHandler<T> {
    pub fn new() -> Self {
        Self::with_processor(BeanProcessor::new())
    }

    pub fn with_processor(processor: BeanProcessor) -> Self {
        Self {
            processor,
            _bean: PhantomData,
        }
    }
}

impl<T: Bean + Default> Default for BeanHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Bean + Default> ResultSetHandler for BeanHandler<T> {
    type Output = Option<T>;

    fn handle(&self, rs: &mut ResultSet<'_>) -> Result<Self::Output> {
        match rs.next()? {
            Some(row) => self.processor.to_bean(row).map(Some),
            None => Ok(None),
        }
    }
}

/// Every row as a bean.
#[derive(Debug, Clone)]
pub struct BeanListHandler<T> {
    processor: BeanProcessor,
    _bean: PhantomData<fn() -> T>,
}

impl<T: Bean + Default> BeanListHandler<T> {
    pub fn new() -> Self {
        Self::with_processor(BeanProcessor::new())
    }

    pub fn with_processor(processor: BeanProcessor) -> Self {
        Self {
            processor,
            _bean: PhantomData,
        }
    }
}

impl<T: Bean + Default> Default for BeanListHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Bean + Default> ResultSetHandler for BeanListHandler<T> {
    type Output = Vec<T>;

    fn handle(&self, rs: &mut ResultSet<'_>) -> Result<Self::Output> {
        let mut beans = Vec::new();
        while let Some(row) = rs.next()? {
            beans.push(self.processor.to_bean(row)?);
        }
        Ok(beans)
    }
}

#[derive(Debug, Clone)]
enum ScalarColumn {
    Index(usize),
    Name(String),
}

/// One column of the first row, converted to `T`.
///
/// Reads the first column unless [`ScalarHandler::column`] or [`ScalarHandler::index`]
/// picks another. Zero rows and a NULL cell both give `None`.
///
/// ```
/// use sqlx_named_runner::ScalarHandler;
///
/// let count = ScalarHandler::<i64>::column("total");
/// let first = ScalarHandler::<String>::new();
/// # let _ = (count, first);
/// ```
#[derive(Debug, Clone)]
pub struct ScalarHandler<T = Value> {
    column: ScalarColumn,
    _scalar: PhantomData<fn() -> T>,
}

impl<T: FromValue> ScalarHandler<T> {
    pub fn new() -> Self {
        Self::index(0)
    }

    /// Reads the column with this name, ignoring case.
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            column: ScalarColumn::Name(name.into()),
            _scalar: PhantomData,
        }
    }

    /// Reads the column at this 0-based ordinal.
    pub fn index(ordinal: usize) -> Self {
        Self {
            column: ScalarColumn::Index(ordinal),
            _scalar: PhantomData,
        }
    }
}

impl<T: FromValue> Default for ScalarHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: FromValue> ResultSetHandler for ScalarHandler<T> {
    type Output = Option<T>;

    fn handle(&self, rs: &mut ResultSet<'_>) -> Result<Self::Output> {
        let Some(row) = rs.next()? else {
            return Ok(None);
        };
        let ordinal = match &self.column {
            ScalarColumn::Index(i) => Some(*i).filter(|i| *i < row.len()),
            ScalarColumn::Name(name) => row.columns().ordinal(name),
        };
        let Some(ordinal) = ordinal else {
            return Err(Error::usage(format!(
                "result has no column {}",
                match &self.column {
                    ScalarColumn::Index(i) => i.to_string(),
                    ScalarColumn::Name(name) => format!("'{name}'"),
                }
            )));
        };
        let column = row.columns().name(ordinal).unwrap_or_default().to_string();
        let value = row.into_values().swap_remove(ordinal);
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(value)
            .map(Some)
            .map_err(|e| Error::mapping(column, std::any::type_name::<T>(), e))
    }
}

/// First row as column name → value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapHandler;

impl ResultSetHandler for MapHandler {
    type Output = Option<HashMap<String, Value>>;

    fn handle(&self, rs: &mut ResultSet<'_>) -> Result<Self::Output> {
        Ok(rs.next()?.map(|row| {
            row.into_pairs()
                .map(|(column, value)| (column.to_string(), value))
                .collect()
        }))
    }
}

/// Every row as column name → value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapListHandler;

impl ResultSetHandler for MapListHandler {
    type Output = Vec<HashMap<String, Value>>;

    fn handle(&self, rs: &mut ResultSet<'_>) -> Result<Self::Output> {
        let mut rows = Vec::new();
        while let Some(row) = rs.next()? {
            rows.push(
                row.into_pairs()
                    .map(|(column, value)| (column.to_string(), value))
                    .collect(),
            );
        }
        Ok(rows)
    }
}
