use silo_core::{Column, ColumnType, CreateTable, Dialect, Result, Truncate};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn as_dyn(&self) -> &dyn Dialect {
        self
    }

    fn write_column_type(&self, out: &mut String, column: &Column) {
        match column.kind {
            // SQLite only autoincrements INTEGER PRIMARY KEY columns,
            // handled in write_create_table.
            ColumnType::Id | ColumnType::Serial | ColumnType::Integer => out.push_str("INTEGER"),
            ColumnType::Float => out.push_str("REAL"),
            ColumnType::Boolean => out.push_str("BOOLEAN"),
            ColumnType::Date => out.push_str("DATE"),
            ColumnType::DateTime => out.push_str("DATETIME"),
            ColumnType::Json | ColumnType::Null => out.push_str("TEXT"),
            _ => {
                let mut portable = String::new();
                silo_core::GenericSqlDialect.write_column_type(&mut portable, column);
                out.push_str(&portable);
            }
        }
    }

    fn write_create_table(&self, out: &mut String, create: &CreateTable) -> Result<()> {
        out.push_str("CREATE TABLE ");
        if create.if_not_exists {
            out.push_str("IF NOT EXISTS ");
        }
        self.write_identifier(out, &create.table);
        out.push_str(" (");
        let serial_key = |column: &Column| {
            column.kind == ColumnType::Serial
                && create.primary_key.as_deref() == Some(column.name.as_str())
        };
        let mut first = true;
        for column in &create.columns {
            if !first {
                out.push_str(", ");
            }
            first = false;
            if serial_key(column) {
                self.write_identifier(out, &column.name);
                out.push_str(" INTEGER PRIMARY KEY AUTOINCREMENT");
            } else {
                self.write_column_def(out, column)?;
            }
        }
        if let Some(key) = &create.primary_key {
            let handled = create.columns.iter().any(|column| serial_key(column));
            if !handled {
                out.push_str(", PRIMARY KEY (");
                self.write_identifier(out, key);
                out.push(')');
            }
        }
        out.push(')');
        Ok(())
    }

    // SQLite has no TRUNCATE statement.
    fn write_truncate(&self, out: &mut String, truncate: &Truncate) {
        out.push_str("DELETE FROM ");
        self.write_identifier(out, &truncate.table);
    }
}
