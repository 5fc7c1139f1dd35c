use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::value::{SqlType, Value};

/// What a parameter name is bound to.
///
/// `Null` is an explicit, typed NULL. It is distinct from a name that was never bound.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Value(Value),
    Null(SqlType),
}

/// Name → binding registry filled by the caller before execution.
///
/// Names may be given with or without the leading `:`. Binding a name twice keeps the
/// last value. Insertion order does not matter: [`Bindings::resolve`] walks the
/// template's parameter order.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<String, Binding>,
}

fn normalize(name: &str) -> Result<&str> {
    let name = name.strip_prefix(':').unwrap_or(name);
    if name.trim().is_empty() {
        return Err(Error::usage("Parameter name is null or blank string"));
    }
    Ok(name)
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let name = normalize(name)?;
        self.values.insert(name.to_owned(), Binding::Value(value.into()));
        Ok(())
    }

    pub fn bind_null(&mut self, name: &str, sql_type: SqlType) -> Result<()> {
        let name = normalize(name)?;
        self.values.insert(name.to_owned(), Binding::Null(sql_type));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.values.get(name.strip_prefix(':').unwrap_or(name))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bound names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Resolves one binding per positional slot.
    ///
    /// A name that occurs `n` times in `order` yields `n` references to the same stored
    /// binding. Every unbound name is reported in a single [`Error::MissingBinding`].
    pub fn resolve<'a>(&'a self, order: &[String]) -> Result<Vec<&'a Binding>> {
        let mut resolved = Vec::with_capacity(order.len());
        let mut missing: Vec<String> = Vec::new();

        for name in order {
            match self.values.get(name) {
                Some(binding) => resolved.push(binding),
                None if !missing.contains(name) => missing.push(name.clone()),
                None => {}
            }
        }

        if missing.is_empty() {
            Ok(resolved)
        } else {
            Err(Error::MissingBinding(missing))
        }
    }

    /// Bound names that `order` never uses.
    pub fn unused<'a>(&'a self, order: &'a [String]) -> impl Iterator<Item = &'a str> + 'a {
        self.names()
            .filter(move |name| !order.iter().any(|o| o == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bind_rejects_blank_names() {
        let mut bindings = Bindings::new();
        assert!(matches!(bindings.bind("", 1), Err(Error::Usage(_))));
        assert!(matches!(bindings.bind("  ", 1), Err(Error::Usage(_))));
        assert!(matches!(bindings.bind(":", 1), Err(Error::Usage(_))));
        assert!(matches!(
            bindings.bind_null("", SqlType::Integer),
            Err(Error::Usage(_))
        ));
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_last_bind_wins() {
        let mut bindings = Bindings::new();
        bindings.bind("id", 1).unwrap();
        bindings.bind(":id", 2).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings.get("id"), Some(&Binding::Value(Value::Int(2))));
    }

    #[test]
    fn test_bind_null_is_typed() {
        let mut bindings = Bindings::new();
        bindings.bind_null("email", SqlType::Varchar).unwrap();
        assert_eq!(bindings.get(":email"), Some(&Binding::Null(SqlType::Varchar)));
    }

    #[test]
    fn test_resolve_repeated_name_yields_one_action_per_slot() {
        let mut bindings = Bindings::new();
        bindings.bind("id", 42).unwrap();
        bindings.bind("name", "A").unwrap();

        let resolved = bindings.resolve(&order(&["id", "name", "id"])).unwrap();
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0], &Binding::Value(Value::Int(42)));
        assert_eq!(resolved[1], &Binding::Value(Value::Text("A".into())));
        assert_eq!(resolved[2], resolved[0]);
    }

    #[test]
    fn test_resolve_reports_all_missing_names_once() {
        let mut bindings = Bindings::new();
        bindings.bind("other", 1).unwrap();

        let err = bindings.resolve(&order(&["a", "b", "a"])).unwrap_err();
        match err {
            Error::MissingBinding(names) => assert_eq!(names, ["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_with_no_bindings_fails() {
        let bindings = Bindings::new();
        assert!(matches!(
            bindings.resolve(&order(&["id"])),
            Err(Error::MissingBinding(_))
        ));
        assert!(bindings.resolve(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_unused_names() {
        let mut bindings = Bindings::new();
        bindings.bind("id", 1).unwrap();
        bindings.bind("extra", 2).unwrap();
        let order = order(&["id"]);
        let unused: Vec<&str> = bindings.unused(&order).collect();
        assert_eq!(unused, ["extra"]);
    }
}
