use std::collections::HashMap;

use crate::driver::Cursor;
use crate::error::Result;
use crate::value::Value;

/// Column names of a result with a case-insensitive name → ordinal index.
#[derive(Debug, Clone, Default)]
pub struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (ordinal, name) in names.iter().enumerate() {
            // first occurrence wins for duplicate labels
            index.entry(name.to_lowercase()).or_insert(ordinal);
        }
        Self { names, index }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, ordinal: usize) -> Option<&str> {
        self.names.get(ordinal).map(String::as_str)
    }

    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_lowercase()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// A live cursor handed to a [`crate::handlers::ResultSetHandler`].
pub struct ResultSet<'a> {
    cursor: &'a mut dyn Cursor,
    columns: Columns,
}

impl<'a> ResultSet<'a> {
    pub fn new(cursor: &'a mut dyn Cursor) -> Self {
        let columns = Columns::new(cursor.columns().to_vec());
        Self { cursor, columns }
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    /// Advances the cursor. The returned row borrows the result set, so it cannot be
    /// held across the next advance.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Row<'_>>> {
        let values = self.cursor.next_row()?;
        Ok(values.map(|values| Row {
            columns: &self.columns,
            values,
        }))
    }
}

/// One result row.
#[derive(Debug)]
pub struct Row<'a> {
    columns: &'a Columns,
    values: Vec<Value>,
}

impl<'a> Row<'a> {
    pub fn columns(&self) -> &'a Columns {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, ordinal: usize) -> Option<&Value> {
        self.values.get(ordinal)
    }

    /// Looks a column up by name, ignoring case.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.ordinal(name).and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// `(column name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &Value)> + '_ {
        self.columns.iter().zip(self.values.iter())
    }

    pub(crate) fn into_pairs(self) -> impl Iterator<Item = (&'a str, Value)> {
        self.columns.iter().zip(self.values)
    }
}
