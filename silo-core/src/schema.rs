use crate::{
    Column, Condition, Connection, CreateTable, DatabaseError, Delete, DropTable, Insert,
    Relation, Result, Truncate, Update, Value,
};
use std::collections::{BTreeMap, HashMap};

/// Resolves source names to schemas when a query walks relations. The
/// indirection keeps schemas free of reference cycles: relations store
/// the target's source name, never the schema itself.
pub trait SchemaProvider {
    fn schema(&self, source: &str) -> Option<&Schema>;
}

impl SchemaProvider for HashMap<String, Schema> {
    fn schema(&self, source: &str) -> Option<&Schema> {
        self.get(source)
    }
}

impl SchemaProvider for BTreeMap<String, Schema> {
    fn schema(&self, source: &str) -> Option<&Schema> {
        self.get(source)
    }
}

/// The portable description of one table: its columns, primary key and
/// named relations, plus the CRUD surface operating on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    source: Option<String>,
    key: String,
    columns: Vec<Column>,
    relations: BTreeMap<String, Relation>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    pub fn new() -> Self {
        Self {
            source: None,
            key: "id".into(),
            columns: Vec::new(),
            relations: BTreeMap::new(),
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Register a named relation.
    pub fn bind(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn primary_key(&self) -> &str {
        &self.key
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_named(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, &Relation)> {
        self.relations
            .iter()
            .map(|(name, relation)| (name.as_str(), relation))
    }

    pub fn relation(&self, name: &str) -> Result<&Relation> {
        self.relations
            .get(name)
            .ok_or_else(|| DatabaseError::new(format!("Unexisting relation `'{name}'`.")))
    }

    fn require_source(&self) -> Result<&str> {
        self.source
            .as_deref()
            .ok_or_else(|| DatabaseError::new("Missing table name for this schema."))
    }

    /// Render `value` as a literal for the column `name`, falling back to
    /// the value's own shape for undeclared fields.
    fn literal(&self, connection: &Connection, name: &str, value: &Value) -> Result<String> {
        let column = self.column_named(name);
        // array columns format as a whole, not by their element kind
        let kind = if matches!(value, Value::Array(_))
            || column.is_some_and(|column| column.is_array)
        {
            "array"
        } else {
            column
                .map(|column| column.kind.as_str())
                .unwrap_or_else(|| value.type_key())
        };
        connection.format(kind, value, column)
    }

    pub fn create(&self, connection: &mut Connection) -> Result<()> {
        let create = CreateTable {
            table: self.require_source()?.to_owned(),
            if_not_exists: true,
            columns: self.columns.clone(),
            primary_key: self
                .column_named(&self.key)
                .map(|column| column.name.clone()),
        };
        let mut sql = String::new();
        connection.dialect().write_create_table(&mut sql, &create)?;
        connection.execute(&sql)?;
        Ok(())
    }

    pub fn drop(&self, connection: &mut Connection) -> Result<()> {
        let drop = DropTable {
            table: self.require_source()?.to_owned(),
            if_exists: true,
            cascade: false,
            restrict: false,
        };
        let mut sql = String::new();
        connection.dialect().write_drop_table(&mut sql, &drop);
        connection.execute(&sql)?;
        Ok(())
    }

    /// Insert one record. An absent primary key becomes a raw `DEFAULT`
    /// marker when the engine fills defaults server side, an explicit
    /// NULL otherwise, so the column list keeps the same shape either
    /// way.
    pub fn insert(&self, connection: &mut Connection, data: &BTreeMap<String, Value>) -> Result<u64> {
        let table = self.require_source()?.to_owned();
        let mut data = data.clone();
        if !data.contains_key(&self.key) {
            let marker = if connection.features().server_default {
                Value::plain("DEFAULT")
            } else {
                Value::Null
            };
            data.insert(self.key.clone(), marker);
        }
        let mut columns = Vec::with_capacity(data.len());
        let mut row = Vec::with_capacity(data.len());
        for (name, value) in &data {
            row.push(self.literal(connection, name, value)?);
            columns.push(name.clone());
        }
        let insert = Insert {
            table,
            columns,
            values: vec![row],
        };
        let mut sql = String::new();
        connection.dialect().write_insert(&mut sql, &insert);
        connection.execute(&sql)
    }

    pub fn update(
        &self,
        connection: &mut Connection,
        data: &BTreeMap<String, Value>,
        conditions: Vec<Condition>,
    ) -> Result<u64> {
        let table = self.require_source()?.to_owned();
        let mut assignments = Vec::with_capacity(data.len());
        for (name, value) in data {
            assignments.push((name.clone(), self.literal(connection, name, value)?));
        }
        let update = Update {
            table,
            assignments,
            conditions,
        };
        let mut sql = String::new();
        connection.dialect().write_update(&mut sql, &update)?;
        connection.execute(&sql)
    }

    pub fn delete(&self, connection: &mut Connection, conditions: Vec<Condition>) -> Result<u64> {
        let delete = Delete {
            table: self.require_source()?.to_owned(),
            conditions,
        };
        let mut sql = String::new();
        connection.dialect().write_delete(&mut sql, &delete)?;
        connection.execute(&sql)
    }

    pub fn truncate(&self, connection: &mut Connection) -> Result<u64> {
        let truncate = Truncate {
            table: self.require_source()?.to_owned(),
        };
        let mut sql = String::new();
        connection.dialect().write_truncate(&mut sql, &truncate);
        connection.execute(&sql)
    }

    /// Insert each item, assigning back the generated key to items whose
    /// extraction carried none.
    pub fn bulk_insert<T>(
        &self,
        connection: &mut Connection,
        items: &mut [T],
        extract: impl Fn(&T) -> BTreeMap<String, Value>,
        mut assign_key: impl FnMut(&mut T, Value),
    ) -> Result<()> {
        for item in items.iter_mut() {
            let data = extract(item);
            let generated = !data.contains_key(&self.key);
            self.insert(connection, &data)?;
            if generated {
                if let Some(id) = self.last_insert_id(connection)? {
                    assign_key(item, Value::Integer(id));
                }
            }
        }
        Ok(())
    }

    /// Update each item, keyed by the primary key its extraction carries.
    pub fn bulk_update<T>(
        &self,
        connection: &mut Connection,
        items: &[T],
        extract: impl Fn(&T) -> BTreeMap<String, Value>,
    ) -> Result<()> {
        for item in items {
            let mut data = extract(item);
            let id = match data.remove(&self.key) {
                Some(value) if !value.is_null() => value,
                _ => {
                    return Err(DatabaseError::new("Can't update an entity missing ID data."));
                }
            };
            self.update(connection, &data, vec![Condition::eq(&*self.key, id)])?;
        }
        Ok(())
    }

    /// Cast a wire row into application values, column by column.
    /// Undeclared fields pass through untouched.
    pub fn cast_row(
        &self,
        connection: &Connection,
        row: &crate::RowLabeled,
    ) -> Result<BTreeMap<String, Value>> {
        let mut data = BTreeMap::new();
        for (name, value) in row.names().iter().zip(row.values()) {
            let value = match self.column_named(name) {
                Some(column) => connection.cast(column.kind.as_str(), value, Some(column))?,
                None => value.clone(),
            };
            data.insert(name.clone(), value);
        }
        Ok(data)
    }

    /// The id generated by the last insert on this source.
    pub fn last_insert_id(&self, connection: &mut Connection) -> Result<Option<i64>> {
        let sequence = format!("{}_{}_seq", self.require_source()?, self.key);
        connection.last_insert_id(Some(&sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Adapter, ColumnType, Dialect, Features, GenericSqlDialect, RowLabeled};
    use std::sync::{Arc, Mutex};

    struct Recorder {
        executed: Arc<Mutex<Vec<String>>>,
        server_default: bool,
        dialect: GenericSqlDialect,
    }

    impl Recorder {
        fn connection(server_default: bool) -> (Connection, Arc<Mutex<Vec<String>>>) {
            let executed = Arc::new(Mutex::new(Vec::new()));
            let adapter = Recorder {
                executed: executed.clone(),
                server_default,
                dialect: GenericSqlDialect,
            };
            (Connection::new(Box::new(adapter)), executed)
        }
    }

    impl Adapter for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn features(&self) -> Features {
            Features {
                arrays: false,
                transactions: true,
                savepoints: true,
                booleans: true,
                server_default: self.server_default,
            }
        }

        fn dialect(&self) -> &dyn Dialect {
            &self.dialect
        }

        fn execute(&mut self, sql: &str) -> Result<u64> {
            self.executed.lock().unwrap().push(sql.to_owned());
            Ok(1)
        }

        fn query(&mut self, sql: &str) -> Result<Vec<RowLabeled>> {
            self.executed.lock().unwrap().push(sql.to_owned());
            Ok(Vec::new())
        }

        fn last_insert_id(&mut self, _sequence: Option<&str>) -> Result<Option<i64>> {
            Ok(Some(7))
        }

        fn sources(&mut self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn fields(&mut self, _source: &str) -> Result<Vec<Column>> {
            Ok(Vec::new())
        }

        fn connected(&self) -> bool {
            true
        }

        fn disconnect(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn gallery() -> Schema {
        Schema::new()
            .source("gallery")
            .column(Column::new("id", ColumnType::Serial))
            .column(Column::new("name", ColumnType::String).length(128))
    }

    #[test]
    fn insert_fills_the_missing_key_with_null() {
        let (mut connection, executed) = Recorder::connection(false);
        let data = BTreeMap::from([("name".to_owned(), Value::from("Foo Gallery"))]);
        gallery().insert(&mut connection, &data).unwrap();
        assert_eq!(
            *executed.lock().unwrap(),
            [r#"INSERT INTO "gallery" ("id", "name") VALUES (NULL, 'Foo Gallery')"#]
        );
    }

    #[test]
    fn array_values_format_through_the_array_entry() {
        let (mut connection, executed) = Recorder::connection(false);
        connection.formatters_mut().set_datasource(
            "array",
            Arc::new(|value, _, dialect| {
                let body = match value {
                    Value::Array(items) => items
                        .iter()
                        .map(|item| item.to_string())
                        .collect::<Vec<_>>()
                        .join(","),
                    other => other.to_string(),
                };
                Ok(dialect.quote(&format!("{{{body}}}")))
            }),
        );
        let schema = Schema::new()
            .source("sample")
            .column(Column::new("id", ColumnType::Serial))
            .column(Column::new("tags", ColumnType::Integer).array());
        let data = BTreeMap::from([(
            "tags".to_owned(),
            Value::Array(vec![Value::Integer(1), Value::Integer(2)]),
        )]);
        schema.insert(&mut connection, &data).unwrap();
        assert_eq!(
            *executed.lock().unwrap(),
            [r#"INSERT INTO "sample" ("id", "tags") VALUES (NULL, '{1,2}')"#]
        );
    }

    #[test]
    fn insert_uses_the_server_default_when_available() {
        let (mut connection, executed) = Recorder::connection(true);
        let data = BTreeMap::from([("name".to_owned(), Value::from("Foo Gallery"))]);
        gallery().insert(&mut connection, &data).unwrap();
        assert_eq!(
            *executed.lock().unwrap(),
            [r#"INSERT INTO "gallery" ("id", "name") VALUES (DEFAULT, 'Foo Gallery')"#]
        );
    }

    #[test]
    fn update_formats_by_declared_type() {
        let (mut connection, executed) = Recorder::connection(false);
        let data = BTreeMap::from([("name".to_owned(), Value::from("Bar"))]);
        gallery()
            .update(&mut connection, &data, vec![Condition::eq("id", 1)])
            .unwrap();
        assert_eq!(
            *executed.lock().unwrap(),
            [r#"UPDATE "gallery" SET "name" = 'Bar' WHERE "id" = 1"#]
        );
    }

    #[test]
    fn bulk_update_requires_an_id() {
        let (mut connection, _) = Recorder::connection(false);
        let rows = [BTreeMap::from([("name".to_owned(), Value::from("Bar"))])];
        let error = gallery()
            .bulk_update(&mut connection, &rows, Clone::clone)
            .unwrap_err();
        assert_eq!(error.message, "Can't update an entity missing ID data.");
    }

    #[test]
    fn bulk_insert_assigns_generated_keys() {
        let (mut connection, _) = Recorder::connection(false);
        let mut rows = vec![BTreeMap::from([("name".to_owned(), Value::from("Baz"))])];
        gallery()
            .bulk_insert(&mut connection, &mut rows, Clone::clone, |row, id| {
                row.insert("id".to_owned(), id);
            })
            .unwrap();
        assert_eq!(rows[0].get("id"), Some(&Value::Integer(7)));
    }

    #[test]
    fn crud_requires_a_source() {
        let (mut connection, _) = Recorder::connection(false);
        let error = Schema::new().create(&mut connection).unwrap_err();
        assert_eq!(error.message, "Missing table name for this schema.");
    }

    #[test]
    fn relation_lookup_errors_on_unknown_names() {
        let schema = gallery().bind("images", Relation::has_many("image", ("id", "gallery_id")));
        assert!(schema.relation("images").is_ok());
        assert_eq!(
            schema.relation("nope").unwrap_err().message,
            "Unexisting relation `'nope'`."
        );
    }

    #[test]
    fn last_insert_id_builds_the_sequence_name() {
        let (mut connection, _) = Recorder::connection(false);
        assert_eq!(
            gallery().last_insert_id(&mut connection).unwrap(),
            Some(7)
        );
    }

    #[test]
    fn create_and_drop_render_ddl() {
        let (mut connection, executed) = Recorder::connection(false);
        let schema = gallery();
        schema.create(&mut connection).unwrap();
        schema.drop(&mut connection).unwrap();
        assert_eq!(
            *executed.lock().unwrap(),
            [
                r#"CREATE TABLE IF NOT EXISTS "gallery" ("id" INTEGER, "name" VARCHAR(128), PRIMARY KEY ("id"))"#,
                r#"DROP TABLE IF EXISTS "gallery""#
            ]
        );
    }
}
