use crate::{Column, DatabaseError, Dialect, Result, Value};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashMap;
use std::sync::Arc;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

pub(crate) static DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");
pub(crate) static DATETIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Wire value to application value.
pub type CastHandler = Arc<dyn Fn(&Value, Option<&Column>) -> Result<Value> + Send + Sync>;

/// Application value to SQL literal.
pub type DatasourceHandler =
    Arc<dyn Fn(&Value, Option<&Column>, &dyn Dialect) -> Result<String> + Send + Sync>;

/// The bidirectional conversion registry.
///
/// Both directions are keyed by the portable type name, with `_default_`
/// as the fallback entry. Null values short-circuit: casting one yields
/// `Value::Null` whatever the declared type, and formatting one always
/// goes through the `null` entry. Expression values never reach a
/// handler, they are delegated to the dialect.
#[derive(Clone)]
pub struct Formatters {
    cast: HashMap<String, CastHandler>,
    datasource: HashMap<String, DatasourceHandler>,
}

impl Formatters {
    pub fn new() -> Self {
        Self {
            cast: HashMap::new(),
            datasource: HashMap::new(),
        }
    }

    /// The registry preloaded with the portable handlers every engine
    /// shares. Adapters then override the entries their engine spells
    /// differently.
    pub fn defaults() -> Self {
        let mut formatters = Self::new();

        let cast_integer: CastHandler =
            Arc::new(|value, _| Ok(Value::Integer(value.as_integer().unwrap_or_default())));
        formatters.set_cast("id", cast_integer.clone());
        formatters.set_cast("serial", cast_integer.clone());
        formatters.set_cast("integer", cast_integer);
        formatters.set_cast(
            "float",
            Arc::new(|value, _| Ok(Value::Float(value.as_float().unwrap_or_default()))),
        );
        formatters.set_cast(
            "decimal",
            Arc::new(|value, column| {
                let precision = column.and_then(|c| c.precision).unwrap_or(2);
                let mut decimal = to_decimal(value).unwrap_or_default().round_dp(precision);
                decimal.rescale(precision);
                Ok(Value::Decimal(decimal))
            }),
        );
        formatters.set_cast(
            "boolean",
            Arc::new(|value, _| Ok(Value::Boolean(value.as_boolean()))),
        );
        formatters.set_cast(
            "string",
            Arc::new(|value, _| Ok(Value::String(value.to_string()))),
        );
        formatters.set_cast("date", Arc::new(|value, _| Ok(Value::Date(to_date(value)?))));
        formatters.set_cast(
            "datetime",
            Arc::new(|value, _| Ok(Value::DateTime(to_datetime(value)?))),
        );
        formatters.set_cast(
            "json",
            Arc::new(|value, _| {
                Ok(match value {
                    Value::Json(..) => value.clone(),
                    Value::String(text) => serde_json::from_str(text)
                        .map(Value::Json)
                        .unwrap_or(Value::Null),
                    _ => value.clone(),
                })
            }),
        );
        formatters.set_cast("_default_", Arc::new(|value, _| Ok(value.clone())));

        let plain_integer: DatasourceHandler = Arc::new(|value, _, _| {
            let mut buffer = itoa::Buffer::new();
            Ok(buffer.format(value.as_integer().unwrap_or_default()).into())
        });
        formatters.set_datasource("id", plain_integer.clone());
        formatters.set_datasource("serial", plain_integer.clone());
        formatters.set_datasource("integer", plain_integer);
        formatters.set_datasource(
            "float",
            Arc::new(|value, _, _| {
                let mut buffer = ryu::Buffer::new();
                Ok(buffer.format(value.as_float().unwrap_or_default()).into())
            }),
        );
        formatters.set_datasource(
            "decimal",
            Arc::new(|value, column, _| {
                let precision = column.and_then(|c| c.precision).unwrap_or(2);
                let mut decimal = to_decimal(value).unwrap_or_default().round_dp(precision);
                decimal.rescale(precision);
                Ok(decimal.to_string())
            }),
        );
        formatters.set_datasource(
            "boolean",
            Arc::new(|value, _, _| {
                Ok(if value.as_boolean() { "TRUE" } else { "FALSE" }.into())
            }),
        );
        formatters.set_datasource(
            "date",
            Arc::new(|value, _, dialect| {
                let date = to_date(value)?;
                let text = date
                    .format(&DATE_FORMAT)
                    .map_err(|e| DatabaseError::new(e.to_string()))?;
                Ok(dialect.quote(&text))
            }),
        );
        formatters.set_datasource(
            "datetime",
            Arc::new(|value, _, dialect| {
                let datetime = to_datetime(value)?;
                let text = datetime
                    .format(&DATETIME_FORMAT)
                    .map_err(|e| DatabaseError::new(e.to_string()))?;
                Ok(dialect.quote(&text))
            }),
        );
        formatters.set_datasource(
            "json",
            Arc::new(|value, _, dialect| {
                let text = match value {
                    Value::Json(json) => json.to_string(),
                    _ => value.to_string(),
                };
                Ok(dialect.quote(&text))
            }),
        );
        formatters.set_datasource("null", Arc::new(|_, _, _| Ok("NULL".into())));
        let quoted: DatasourceHandler =
            Arc::new(|value, _, dialect| Ok(dialect.quote(&value.to_string())));
        formatters.set_datasource("string", quoted.clone());
        formatters.set_datasource("_default_", quoted);

        formatters
    }

    pub fn set_cast(&mut self, kind: impl Into<String>, handler: CastHandler) {
        self.cast.insert(kind.into(), handler);
    }

    pub fn set_datasource(&mut self, kind: impl Into<String>, handler: DatasourceHandler) {
        self.datasource.insert(kind.into(), handler);
    }

    /// Convert a wire value into its application representation for the
    /// portable type `kind`.
    pub fn cast(&self, kind: &str, value: &Value, column: Option<&Column>) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self.cast.get(kind).or_else(|| self.cast.get("_default_")) {
            Some(handler) => handler(value, column),
            None => Ok(value.clone()),
        }
    }

    /// Render an application value as an SQL literal for the portable
    /// type `kind`.
    pub fn format(
        &self,
        kind: &str,
        value: &Value,
        column: Option<&Column>,
        dialect: &dyn Dialect,
    ) -> Result<String> {
        if let Value::Expression(expression) = value {
            return dialect.format_operator(expression);
        }
        let kind = if value.is_null() { "null" } else { kind };
        match self
            .datasource
            .get(kind)
            .or_else(|| self.datasource.get("_default_"))
        {
            Some(handler) => handler(value, column, dialect),
            None => Ok(value.to_string()),
        }
    }
}

impl Default for Formatters {
    fn default() -> Self {
        Self::defaults()
    }
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Decimal(v) => Some(*v),
        Value::Integer(v) => Some(Decimal::from(*v)),
        Value::Float(v) => Decimal::from_f64(*v),
        Value::String(v) => v.trim().parse().ok(),
        Value::Boolean(v) => Some(Decimal::from(*v as i64)),
        _ => None,
    }
}

fn to_datetime(value: &Value) -> Result<PrimitiveDateTime> {
    match value {
        Value::DateTime(v) => Ok(*v),
        Value::Date(v) => Ok(PrimitiveDateTime::new(*v, Time::MIDNIGHT)),
        Value::String(text) => {
            let text = text.trim();
            PrimitiveDateTime::parse(text, &DATETIME_FORMAT)
                .or_else(|_| {
                    Date::parse(text, &DATE_FORMAT)
                        .map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT))
                })
                .map_err(|_| invalid_date(value))
        }
        Value::Integer(timestamp) => {
            let datetime = OffsetDateTime::from_unix_timestamp(*timestamp)
                .map_err(|_| invalid_date(value))?;
            Ok(PrimitiveDateTime::new(datetime.date(), datetime.time()))
        }
        _ => Err(invalid_date(value)),
    }
}

fn to_date(value: &Value) -> Result<Date> {
    match value {
        Value::Date(v) => Ok(*v),
        Value::DateTime(v) => Ok(v.date()),
        _ => Ok(to_datetime(value)?.date()),
    }
}

fn invalid_date(value: &Value) -> DatabaseError {
    DatabaseError::new(format!("Invalid date `{value}`, can't be parsed."))
}
