use crate::SqliteDialect;
use rusqlite::types::ValueRef;
use silo_core::{
    Adapter, Column, ColumnType, Connection, DatabaseError, Dialect, Features, Formatters, Result,
    RowLabeled, RowNames, Value, parse_native_type, unquote_single,
};
use std::sync::Arc;

/// SQLite connection settings. The database is a filesystem path, with
/// the in-memory database as the default.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub database: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            database: ":memory:".into(),
        }
    }
}

impl SqliteConfig {
    pub fn path(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }

    /// Builds a configuration from a connection URL, like
    /// `sqlite:///var/data/app.db` or `sqlite::memory:`.
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|error| DatabaseError::new(format!("Invalid connection URL `'{url}'`: {error}")))?;
        if parsed.scheme() != "sqlite" {
            return Err(DatabaseError::new(format!(
                "Invalid connection URL `'{url}'`: expected the `sqlite` scheme."
            )));
        }
        let path = urlencoding::decode(parsed.path())
            .map_err(|error| DatabaseError::new(format!("Invalid connection URL: {error}")))?;
        if path.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self::path(path.into_owned()))
    }
}

pub struct SqliteAdapter {
    client: Option<rusqlite::Connection>,
    dialect: SqliteDialect,
}

impl SqliteAdapter {
    pub fn connect(config: &SqliteConfig) -> Result<Self> {
        let client = if config.database == ":memory:" {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&config.database)
        }
        .map_err(translate)?;
        log::debug!("sqlite: opened {}", config.database);
        Ok(Self {
            client: Some(client),
            dialect: SqliteDialect,
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::connect(&SqliteConfig::default())
    }

    /// A ready connection over an in-memory database.
    pub fn connection(config: &SqliteConfig) -> Result<Connection> {
        Ok(Connection::new(Box::new(Self::connect(config)?)))
    }

    fn client(&self) -> Result<&rusqlite::Connection> {
        self.client
            .as_ref()
            .ok_or_else(|| DatabaseError::new("The connection has been closed."))
    }
}

fn translate(error: rusqlite::Error) -> DatabaseError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let message = message
                .clone()
                .unwrap_or_else(|| failure.to_string());
            DatabaseError::with_code(message, failure.extended_code)
        }
        _ => DatabaseError::new(error.to_string()),
    }
}

fn decode(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(v) => Value::String(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::String(String::from_utf8_lossy(v).into_owned()),
    }
}

impl Adapter for SqliteAdapter {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn features(&self) -> Features {
        Features {
            arrays: false,
            transactions: true,
            savepoints: true,
            booleans: true,
            server_default: false,
        }
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn execute(&mut self, sql: &str) -> Result<u64> {
        let client = self.client()?;
        client.execute_batch(sql).map_err(translate)?;
        Ok(client.changes())
    }

    fn query(&mut self, sql: &str) -> Result<Vec<RowLabeled>> {
        let client = self.client()?;
        let mut statement = client.prepare(sql).map_err(translate)?;
        let labels: RowNames = Arc::from(
            statement
                .column_names()
                .into_iter()
                .map(str::to_owned)
                .collect::<Vec<_>>(),
        );
        let count = labels.len();
        let mut rows = statement.query([]).map_err(translate)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(translate)? {
            let mut values = Vec::with_capacity(count);
            for index in 0..count {
                values.push(decode(row.get_ref(index).map_err(translate)?));
            }
            result.push(RowLabeled::new(labels.clone(), values.into_boxed_slice()));
        }
        Ok(result)
    }

    fn last_insert_id(&mut self, _sequence: Option<&str>) -> Result<Option<i64>> {
        let id = self.client()?.last_insert_rowid();
        Ok((id != 0).then_some(id))
    }

    fn sources(&mut self) -> Result<Vec<String>> {
        let rows = self.query("SELECT \"name\" FROM \"sqlite_master\" WHERE \"type\" = 'table'")?;
        Ok(rows
            .iter()
            .filter_map(|row| row.first().and_then(Value::as_str).map(str::to_owned))
            .collect())
    }

    fn fields(&mut self, source: &str) -> Result<Vec<Column>> {
        let mut name = String::new();
        self.dialect.write_identifier(&mut name, source);
        let rows = self.query(&format!("PRAGMA table_info({name})"))?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let column_name = row
                .get_column("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let declared = match row.get_column("type") {
                Some(Value::String(v)) => v.clone(),
                _ => String::new(),
            };
            let native = parse_native_type(&declared);
            let kind = self.dialect.mapped(&native.name, native.length);
            let mut column = Column::new(column_name, kind);
            column.native = Some(native.name);
            column.length = native.length;
            column.precision = native.precision;
            column.nullable = row
                .get_column("notnull")
                .and_then(Value::as_integer)
                .unwrap_or(0)
                == 0;
            column.default = normalize_default(kind, row.get_column("dflt_value"));
            columns.push(column);
        }
        Ok(columns)
    }

    fn encoding(&mut self) -> Result<String> {
        let rows = self.query("PRAGMA encoding")?;
        let encoding = rows
            .first()
            .and_then(RowLabeled::first)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        Ok(to_portable_encoding(&encoding).unwrap_or(encoding))
    }

    fn set_encoding(&mut self, encoding: &str) -> Result<()> {
        let encoding = to_native_encoding(encoding)
            .unwrap_or_else(|| encoding.to_owned())
            .to_uppercase();
        self.execute(&format!("PRAGMA encoding=\"{encoding}\""))?;
        Ok(())
    }

    fn install_formatters(&self, formatters: &mut Formatters) {
        // SQLite stores booleans as integers
        formatters.set_datasource(
            "boolean",
            Arc::new(|value, _, _| Ok(if value.as_boolean() { "1" } else { "0" }.into())),
        );
    }

    fn connected(&self) -> bool {
        self.client.is_some()
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .map_err(|(_, error)| translate(error))?;
        }
        Ok(())
    }
}

fn to_portable_encoding(native: &str) -> Option<String> {
    Some(
        match native {
            "utf-8" => "utf8",
            "utf-16" => "utf16",
            "utf-16le" => "utf16le",
            "utf-16be" => "utf16be",
            _ => return None,
        }
        .to_owned(),
    )
}

fn to_native_encoding(portable: &str) -> Option<String> {
    Some(
        match portable {
            "utf8" => "utf-8",
            "utf16" => "utf-16",
            "utf16le" => "utf-16le",
            "utf16be" => "utf-16be",
            _ => return None,
        }
        .to_owned(),
    )
}

/// Align introspected defaults with the portable types: strings are
/// unquoted, booleans compare against `'1'`, a `CURRENT_TIMESTAMP`
/// datetime default is dropped.
fn normalize_default(kind: ColumnType, default: Option<&Value>) -> Option<Value> {
    let text = match default {
        Some(Value::String(v)) => v.as_str(),
        Some(Value::Null) | None => return None,
        Some(other) => return Some(other.clone()),
    };
    match kind {
        ColumnType::String => Some(Value::String(
            unquote_single(text).unwrap_or_else(|| text.to_owned()),
        )),
        ColumnType::Boolean => Some(Value::Boolean(text == "1")),
        ColumnType::DateTime => {
            if text == "CURRENT_TIMESTAMP" {
                None
            } else {
                Some(Value::String(text.to_owned()))
            }
        }
        _ => Some(Value::String(text.to_owned())),
    }
}
