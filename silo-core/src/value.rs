use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value as Json;
use std::fmt;
use time::{Date, PrimitiveDateTime};

/// An application or wire value flowing through the conversion pipeline.
///
/// `Expression` is the raw-expression escape hatch: instead of being
/// formatted by the registry it is delegated verbatim to the dialect,
/// which recognizes the operator (e.g. `:plain` for a literal SQL
/// fragment).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Date(Date),
    DateTime(PrimitiveDateTime),
    Json(Json),
    Array(Vec<Value>),
    Expression(Expression),
}

/// A dialect operator escape: `operator` names the dialect operation and
/// `args` are its operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub operator: String,
    pub args: Vec<Value>,
}

impl Value {
    /// A raw SQL fragment, emitted verbatim by every dialect.
    pub fn plain(sql: impl Into<String>) -> Self {
        Value::Expression(Expression {
            operator: ":plain".into(),
            args: vec![Value::String(sql.into())],
        })
    }

    pub fn expression(operator: impl Into<String>, args: Vec<Value>) -> Self {
        Value::Expression(Expression {
            operator: operator.into(),
            args,
        })
    }

    /// The formatter-registry key describing this value's own shape, used
    /// when no column type is declared.
    pub fn type_key(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(..) => "boolean",
            Value::Integer(..) => "integer",
            Value::Float(..) => "float",
            Value::Decimal(..) => "decimal",
            Value::String(..) => "string",
            Value::Date(..) => "date",
            Value::DateTime(..) => "datetime",
            Value::Json(..) => "json",
            Value::Array(..) => "array",
            Value::Expression(..) => "_default_",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Float(v) => Some(*v as i64),
            Value::String(v) => v.trim().parse().ok(),
            Value::Boolean(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            Value::Decimal(v) => v.to_f64(),
            Value::String(v) => v.trim().parse().ok(),
            Value::Boolean(v) => Some(*v as i64 as f64),
            _ => None,
        }
    }

    /// Truthiness across the lexical spellings engines use for booleans.
    pub fn as_boolean(&self) -> bool {
        match self {
            Value::Boolean(v) => *v,
            Value::Integer(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Decimal(v) => !v.is_zero(),
            Value::String(v) => matches!(
                v.trim().to_lowercase().as_str(),
                "1" | "t" | "true" | "y" | "yes" | "on"
            ),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Date(v) => write!(f, "{v}"),
            Value::DateTime(v) => write!(f, "{v}"),
            Value::Json(v) => write!(f, "{v}"),
            Value::Array(values) => {
                let mut first = true;
                for value in values {
                    if !first {
                        f.write_str(", ")?;
                    }
                    first = false;
                    write!(f, "{value}")?;
                }
                Ok(())
            }
            Value::Expression(e) => f.write_str(&e.operator),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Date> for Value {
    fn from(value: Date) -> Self {
        Value::Date(value)
    }
}

impl From<PrimitiveDateTime> for Value {
    fn from(value: PrimitiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<Json> for Value {
    fn from(value: Json) -> Self {
        Value::Json(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}
