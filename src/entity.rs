//! Table and column metadata of entity types.

use crate::bean::{Bean, BeanProcessor};
use crate::error::{Error, Result};
use crate::value::{FromValue, SqlType};

/// One persisted field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub column: String,
    pub property: String,
    /// Type sent when the property is NULL
    pub sql_type: SqlType,
    /// Filled in by the database; never written by INSERT or UPDATE
    pub generated: bool,
}

impl ColumnDef {
    pub fn new(column: impl Into<String>, property: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            column: column.into(),
            property: property.into(),
            sql_type,
            generated: false,
        }
    }

    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }
}

/// Table name plus column ↔ property pairs of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    table: String,
    columns: Vec<ColumnDef>,
}

impl EntityMetadata {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Columns an INSERT or UPDATE writes.
    pub fn insertable_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| !c.generated)
    }

    pub fn generated_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.generated)
    }

    /// Finds a column by property name, or by column name ignoring case.
    pub fn find(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.property == name)
            .or_else(|| self.columns.iter().find(|c| c.column.eq_ignore_ascii_case(name)))
    }

    /// Rejects metadata no statement can be built from.
    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            return Err(Error::usage("entity has a blank table name"));
        }
        if self.insertable_columns().next().is_none() {
            return Err(Error::usage(format!(
                "entity of table '{}' has no insertable columns",
                self.table
            )));
        }
        for (i, def) in self.columns.iter().enumerate() {
            let bindable = !def.column.is_empty()
                && def
                    .column
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !bindable {
                return Err(Error::usage(format!(
                    "column '{}' of table '{}' cannot be used as a parameter name",
                    def.column, self.table
                )));
            }
            let duplicate = self.columns[..i]
                .iter()
                .any(|other| other.column.eq_ignore_ascii_case(&def.column));
            if duplicate {
                return Err(Error::usage(format!(
                    "column '{}' of table '{}' is mapped more than once",
                    def.column, self.table
                )));
            }
        }
        Ok(())
    }

    /// A bean processor that maps every column to its property.
    pub fn column_to_property(&self) -> BeanProcessor {
        self.columns
            .iter()
            .fold(BeanProcessor::new(), |processor, def| {
                processor.with_override(&def.column, def.property.clone())
            })
    }
}

/// A bean persisted in one table.
pub trait Entity: Bean {
    /// Resolved once per type.
    fn metadata() -> &'static EntityMetadata;
}

/// [`SqlType`] of the field selected by `field`.
#[doc(hidden)]
pub fn sql_type_of<E, V: FromValue>(_field: impl Fn(&E) -> &V) -> SqlType {
    V::sql_type()
}

/// Implements [`Entity`] and [`Bean`](crate::Bean) for a struct.
///
/// The table defaults to the type name. A field maps to the column of the same name unless
/// renamed with `=> "column"`, and `#[generated]` marks the database-assigned key.
///
/// ```
/// use sqlx_named_runner::{entity, Entity};
///
/// #[derive(Debug, Default)]
/// struct Account {
///     id: i64,
///     name: String,
///     email: Option<String>,
/// }
///
/// entity! {
///     Account in "account" {
///         #[generated] id,
///         name,
///         email => "email_address",
///     }
/// }
///
/// let meta = Account::metadata();
/// assert_eq!(meta.table(), "account");
/// assert_eq!(meta.find("email").unwrap().column, "email_address");
/// assert_eq!(meta.generated_column().unwrap().property, "id");
/// ```
#[macro_export]
macro_rules! entity {
    ($ty:ident { $($body:tt)* }) => {
        $crate::entity!(@impl $ty, stringify!($ty), { $($body)* });
    };
    ($ty:ident in $table:literal { $($body:tt)* }) => {
        $crate::entity!(@impl $ty, $table, { $($body)* });
    };
    (@impl $ty:ident, $table:expr, {
        $( $(#[$flag:ident])? $field:ident $(=> $column:literal)? ),* $(,)?
    }) => {
        $crate::bean!($ty { $($field),* });

        impl $crate::entity::Entity for $ty {
            fn metadata() -> &'static $crate::entity::EntityMetadata {
                static METADATA: ::std::sync::OnceLock<$crate::entity::EntityMetadata> =
                    ::std::sync::OnceLock::new();
                METADATA.get_or_init(|| {
                    $crate::entity::EntityMetadata::new(
                        $table,
                        vec![$(
                            $crate::entity::ColumnDef {
                                column: $crate::__column_name!($field $(, $column)?).to_string(),
                                property: stringify!($field).to_string(),
                                sql_type: $crate::entity::sql_type_of(|e: &$ty| &e.$field),
                                generated: $crate::__generated_flag!($($flag)?),
                            }
                        ),*],
                    )
                })
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __column_name {
    ($field:ident) => {
        stringify!($field)
    };
    ($field:ident, $column:literal) => {
        $column
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __generated_flag {
    () => {
        false
    };
    (generated) => {
        true
    };
}
