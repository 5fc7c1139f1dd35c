//! Values exchanged with the driver, and the coercions used when they are written into
//! Rust properties.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::fmt;

/// A single SQL value, either bound into a statement or read from a result column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    Bool(bool),
    /// Any signed integer column (TINYINT through BIGINT)
    Int(i64),
    /// Any unsigned integer column
    UInt(u64),
    /// FLOAT and DOUBLE columns
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Timestamp without time zone
    DateTime(NaiveDateTime),
    /// Timestamp in UTC
    Timestamp(DateTime<Utc>),
}

impl Value {
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the variant, used in coercion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::UInt(_) => "UNSIGNED INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BINARY",
            Value::Date(_) => "DATE",
            Value::Time(_) => "TIME",
            Value::DateTime(_) => "DATETIME",
            Value::Timestamp(_) => "TIMESTAMP",
        }
    }
}

/// The SQL type of an explicit null binding.
///
/// Drivers use it to send a typed NULL instead of an untyped one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Varchar,
    Binary,
    Date,
    Time,
    Timestamp,
    /// No specific type; the driver picks its default
    Other,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::Double => "DOUBLE",
            SqlType::Varchar => "VARCHAR",
            SqlType::Binary => "BINARY",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Other => "OTHER",
        };
        f.write_str(name)
    }
}

macro_rules! value_from {
    ($variant:ident: $($ty:ty),+) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )+
    };
}

value_from!(Int: i8, i16, i32, i64);
value_from!(UInt: u8, u16, u32, u64);
value_from!(Float: f32, f64);
value_from!(Bool: bool);
value_from!(Text: String, &str);
value_from!(Bytes: Vec<u8>, &[u8]);
value_from!(Date: NaiveDate);
value_from!(Time: NaiveTime);
value_from!(DateTime: NaiveDateTime);
value_from!(Timestamp: DateTime<Utc>);

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Reads a property value out of a struct field.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

impl<T: Clone + Into<Value>> ToValue for T {
    fn to_value(&self) -> Value {
        self.clone().into()
    }
}

/// A value that cannot be converted to the requested Rust type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionError {
    pub from: &'static str,
    pub to: &'static str,
}

impl fmt::Display for CoercionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot convert {} to {}", self.from, self.to)
    }
}

impl std::error::Error for CoercionError {}

fn mismatch<T>(value: &Value, to: &'static str) -> Result<T, CoercionError> {
    Err(CoercionError {
        from: value.kind(),
        to,
    })
}

/// Converts a driver value into a property type.
///
/// Only conversions that are lossless for the given value succeed: an integer converts
/// to a narrower integer when it fits, to a float when it is exactly representable, and
/// a DATE widens to a midnight DATETIME. Everything else is a [`CoercionError`].
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, CoercionError>;

    /// The type sent with a NULL of this property.
    fn sql_type() -> SqlType;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, CoercionError> {
        Ok(value)
    }

    fn sql_type() -> SqlType {
        SqlType::Other
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn sql_type() -> SqlType {
        T::sql_type()
    }
}

macro_rules! int_from_value {
    ($($ty:ty => $sql:ident),+) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, CoercionError> {
                    let converted = match value {
                        Value::Int(n) => <$ty>::try_from(n).ok(),
                        Value::UInt(n) => <$ty>::try_from(n).ok(),
                        _ => None,
                    };
                    converted.map_or_else(|| mismatch(&value, stringify!($ty)), Ok)
                }

                fn sql_type() -> SqlType {
                    SqlType::$sql
                }
            }
        )+
    };
}

int_from_value!(
    i8 => SmallInt, i16 => SmallInt, i32 => Integer, i64 => BigInt,
    u8 => SmallInt, u16 => Integer, u32 => BigInt, u64 => BigInt
);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(n) if (n as f64) as i128 == i128::from(n) => Ok(n as f64),
            Value::UInt(n) if (n as f64) as u128 == u128::from(n) => Ok(n as f64),
            ref other => mismatch(other, "f64"),
        }
    }

    fn sql_type() -> SqlType {
        SqlType::Double
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Float(f) if !f.is_finite() || f64::from(f as f32) == f => Ok(f as f32),
            Value::Int(n) if (n as f32) as i128 == i128::from(n) => Ok(n as f32),
            Value::UInt(n) if (n as f32) as u128 == u128::from(n) => Ok(n as f32),
            ref other => mismatch(other, "f32"),
        }
    }

    fn sql_type() -> SqlType {
        SqlType::Real
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(0) | Value::UInt(0) => Ok(false),
            Value::Int(1) | Value::UInt(1) => Ok(true),
            ref other => mismatch(other, "bool"),
        }
    }

    fn sql_type() -> SqlType {
        SqlType::Boolean
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Text(s) => Ok(s),
            ref other => mismatch(other, "String"),
        }
    }

    fn sql_type() -> SqlType {
        SqlType::Varchar
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            ref other => mismatch(other, "Vec<u8>"),
        }
    }

    fn sql_type() -> SqlType {
        SqlType::Binary
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Date(d) => Ok(d),
            ref other => mismatch(other, "NaiveDate"),
        }
    }

    fn sql_type() -> SqlType {
        SqlType::Date
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Time(t) => Ok(t),
            ref other => mismatch(other, "NaiveTime"),
        }
    }

    fn sql_type() -> SqlType {
        SqlType::Time
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            Value::Timestamp(ts) => Ok(ts.naive_utc()),
            Value::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            ref other => mismatch(other, "NaiveDateTime"),
        }
    }

    fn sql_type() -> SqlType {
        SqlType::Timestamp
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            Value::DateTime(dt) => Ok(dt.and_utc()),
            Value::Date(d) => Ok(d.and_time(NaiveTime::MIN).and_utc()),
            ref other => mismatch(other, "DateTime<Utc>"),
        }
    }

    fn sql_type() -> SqlType {
        SqlType::Timestamp
    }
}
