use crate::{DatabaseError, Result, Value};
use std::fmt;
use std::str::FromStr;

/// The engine-independent type names used by schema columns and as keys of
/// the formatter registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnType {
    Id,
    Serial,
    #[default]
    String,
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Null,
    Json,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Id => "id",
            ColumnType::Serial => "serial",
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Decimal => "decimal",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Null => "null",
            ColumnType::Json => "json",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "id" => ColumnType::Id,
            "serial" => ColumnType::Serial,
            "string" => ColumnType::String,
            "integer" => ColumnType::Integer,
            "float" => ColumnType::Float,
            "decimal" => ColumnType::Decimal,
            "boolean" => ColumnType::Boolean,
            "date" => ColumnType::Date,
            "datetime" => ColumnType::DateTime,
            "null" => ColumnType::Null,
            "json" => ColumnType::Json,
            _ => {
                return Err(DatabaseError::new(format!(
                    "Unknown portable type `'{s}'`."
                )))
            }
        })
    }
}

/// Portable description of a table column.
///
/// `native` keeps the engine's own type name as reported by introspection
/// and is informational only; everything the layer acts on goes through
/// the portable `kind`.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
    pub native: Option<String>,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub nullable: bool,
    pub default: Option<Value>,
    pub is_array: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
            native: None,
            length: None,
            precision: None,
            nullable: true,
            default: None,
            is_array: false,
        }
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }
}
