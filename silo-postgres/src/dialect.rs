use silo_core::{Column, ColumnType, Dialect};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn as_dyn(&self) -> &dyn Dialect {
        self
    }

    fn write_column_type(&self, out: &mut String, column: &Column) {
        let mut buffer = itoa::Buffer::new();
        match column.kind {
            ColumnType::Serial => out.push_str("SERIAL"),
            ColumnType::Id | ColumnType::Integer => out.push_str("INTEGER"),
            ColumnType::String => {
                out.push_str("VARCHAR(");
                out.push_str(buffer.format(column.length.unwrap_or(255)));
                out.push(')');
            }
            ColumnType::Float => out.push_str("REAL"),
            ColumnType::Decimal => {
                out.push_str("NUMERIC(");
                out.push_str(buffer.format(column.length.unwrap_or(10)));
                out.push(',');
                out.push_str(buffer.format(column.precision.unwrap_or(2)));
                out.push(')');
            }
            ColumnType::Boolean => out.push_str("BOOLEAN"),
            ColumnType::Date => out.push_str("DATE"),
            ColumnType::DateTime => out.push_str("TIMESTAMP"),
            ColumnType::Json => out.push_str("JSONB"),
            ColumnType::Null => out.push_str("TEXT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_core::{CreateTable, Result};

    #[test]
    fn serial_columns_use_the_serial_type() -> Result<()> {
        let create = CreateTable {
            table: "gallery".into(),
            if_not_exists: false,
            columns: vec![
                Column::new("id", ColumnType::Serial),
                Column::new("tags", ColumnType::String).length(64).array(),
                Column::new("payload", ColumnType::Json),
            ],
            primary_key: Some("id".into()),
        };
        let mut out = String::new();
        PostgresDialect.write_create_table(&mut out, &create)?;
        assert_eq!(
            out,
            r#"CREATE TABLE "gallery" ("id" SERIAL, "tags" VARCHAR(64)[], "payload" JSONB, PRIMARY KEY ("id"))"#
        );
        Ok(())
    }
}
