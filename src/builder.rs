use regex::{Captures, Regex};
use std::sync::OnceLock;

/// The driver-native positional marker every named placeholder is rewritten to.
pub const POSITIONAL_MARKER: &str = "?";

// Alternatives are tried left to right at each position, so quoted text, comments,
// `::` runs and `\:` escapes are consumed whole before a bare `:name` can match inside them.
// `--` only opens a comment when whitespace follows it.
const PLACEHOLDER_PATTERN: &str = concat!(
    r"'(?:[^'\\]|\\.)*'",
    r#"|"(?:[^"\\]|\\.)*""#,
    r"|`[^`]*`",
    r"|--(?:[ \t\x0B\f][^\n]*)?",
    r"|#[^\n]*",
    r"|/\*(?s:.)*?\*/",
    r"|::+[A-Za-z0-9_]*",
    r"|\\(:[A-Za-z0-9_]*)",
    r"|:([A-Za-z0-9_]+)",
);

fn placeholder_regex() -> crate::Result<&'static Regex> {
    static REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(PLACEHOLDER_PATTERN))
        .as_ref()
        .map_err(|e| crate::Error::Parse(e.clone()))
}

/// A SQL template with its named placeholders rewritten to positional ones.
///
/// `order` has one entry per positional slot, so a name used twice appears twice.
/// The template is scanned once, when the `NamedSql` is built; binding never re-scans it.
///
/// A placeholder is `:` followed by one or more of `[A-Za-z0-9_]`. Text inside single,
/// double or backtick quotes and inside `-- `, `#` and `/* */` comments is copied untouched,
/// and so is a run of two or more colons (`::`), which lets casts and literal colons through.
/// Outside quotes, `\:name` is an escaped marker: the backslash is dropped and `:name` is
/// sent as written. A `:` with no identifier after it is ordinary text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSql {
    sql: String,
    order: Vec<String>,
}

impl NamedSql {
    /// Scans `template` and builds the positional SQL and parameter order.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlx_named_runner::builder::NamedSql;
    ///
    /// let named = NamedSql::parse("SELECT * FROM users WHERE id = :id OR parent_id = :id")?;
    /// assert_eq!(named.sql(), "SELECT * FROM users WHERE id = ? OR parent_id = ?");
    /// assert_eq!(named.order(), ["id", "id"]);
    /// # Ok::<(), sqlx_named_runner::Error>(())
    /// ```
    pub fn parse(template: &str) -> crate::Result<Self> {
        let mut order = Vec::new();
        let sql = placeholder_regex()?
            .replace_all(template, |caps: &Captures<'_>| {
                if let Some(name) = caps.get(2) {
                    order.push(name.as_str().to_owned());
                    POSITIONAL_MARKER.to_owned()
                } else if let Some(escaped) = caps.get(1) {
                    escaped.as_str().to_owned()
                } else {
                    caps[0].to_owned()
                }
            })
            .into_owned();
        Ok(Self { sql, order })
    }

    /// The positional SQL handed to the driver.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameter names in positional order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Distinct parameter names, in order of first use.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(self.order.len());
        for name in &self.order {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }
}

/// Converts named placeholders (`:name`) to positional placeholders (`?`) for MySQL.
///
/// # Examples
///
/// ```
/// use sqlx_named_runner::builder::build_query;
///
/// let sql = build_query("SELECT * FROM users WHERE id = :id AND name = :name")?;
/// assert_eq!(sql, "SELECT * FROM users WHERE id = ? AND name = ?");
/// # Ok::<(), sqlx_named_runner::Error>(())
/// ```
pub fn build_query(template: &str) -> crate::Result<String> {
    Ok(NamedSql::parse(template)?.sql)
}
