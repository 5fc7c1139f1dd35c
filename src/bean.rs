//! Property access by name, and population of beans from result rows.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::result::Row;
use crate::value::{CoercionError, Value};

/// Named read/write access to the properties of a struct.
///
/// Normally implemented with the [`bean!`](crate::bean!) macro, which generates the
/// accessor table from a list of field names.
pub trait Bean {
    /// Every accessible property, in declaration order.
    fn property_names() -> &'static [&'static str];

    /// `None` when `name` is not a property.
    fn get_property(&self, name: &str) -> Option<Value>;

    /// Returns `Ok(false)` when `name` is not a property.
    fn set_property(&mut self, name: &str, value: Value) -> std::result::Result<bool, CoercionError>;
}

/// Implements [`Bean`] for a struct from a list of its fields.
///
/// Every listed field must implement [`FromValue`](crate::value::FromValue) and
/// `Clone + Into<Value>`.
///
/// ```
/// use sqlx_named_runner::{bean, Bean, Value};
///
/// #[derive(Debug, Default)]
/// struct Account {
///     id: i64,
///     name: String,
/// }
///
/// bean!(Account { id, name });
///
/// let mut account = Account::default();
/// account.set_property("name", Value::from("A")).unwrap();
/// assert_eq!(account.get_property("name"), Some(Value::from("A")));
/// assert_eq!(Account::property_names(), ["id", "name"]);
/// ```
#[macro_export]
macro_rules! bean {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::bean::Bean for $ty {
            fn property_names() -> &'static [&'static str] {
                &[$(stringify!($field)),*]
            }

            fn get_property(&self, name: &str) -> ::std::option::Option<$crate::value::Value> {
                match name {
                    $(stringify!($field) => ::std::option::Option::Some(
                        $crate::value::ToValue::to_value(&self.$field),
                    ),)*
                    _ => ::std::option::Option::None,
                }
            }

            #[allow(unused_variables)]
            fn set_property(
                &mut self,
                name: &str,
                value: $crate::value::Value,
            ) -> ::std::result::Result<bool, $crate::value::CoercionError> {
                match name {
                    $(stringify!($field) => {
                        self.$field = $crate::value::FromValue::from_value(value)?;
                        ::std::result::Result::Ok(true)
                    })*
                    _ => ::std::result::Result::Ok(false),
                }
            }
        }
    };
}

/// Writes row columns into bean properties.
///
/// A column maps to the property whose name equals it ignoring case, unless an override
/// names the property explicitly. Columns without a property are skipped, and NULL
/// columns leave the property at its default.
#[derive(Debug, Clone, Default)]
pub struct BeanProcessor {
    overrides: HashMap<String, String>,
}

impl BeanProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `column` to `property` regardless of their names.
    pub fn with_override(mut self, column: &str, property: impl Into<String>) -> Self {
        self.overrides.insert(column.to_lowercase(), property.into());
        self
    }

    fn property_for<T: Bean>(&self, column: &str) -> Option<&'static str> {
        let wanted = self.overrides.get(&column.to_lowercase());
        T::property_names().iter().copied().find(|property| match wanted {
            Some(wanted) => *property == wanted.as_str(),
            None => property.eq_ignore_ascii_case(column),
        })
    }

    pub fn populate<T: Bean>(&self, row: Row<'_>, bean: &mut T) -> Result<()> {
        for (column, value) in row.into_pairs() {
            if value.is_null() {
                continue;
            }
            let Some(property) = self.property_for::<T>(column) else {
                continue;
            };
            match bean.set_property(property, value) {
                Ok(true) => {}
                Ok(false) => return Err(Error::mapping(column, property, "property is not writable")),
                Err(e) => return Err(Error::mapping(column, property, e)),
            }
        }
        Ok(())
    }

    pub fn to_bean<T: Bean + Default>(&self, row: Row<'_>) -> Result<T> {
        let mut bean = T::default();
        self.populate(row, &mut bean)?;
        Ok(bean)
    }
}
