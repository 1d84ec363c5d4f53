use silo_core::{Column, ColumnType, Dialect, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn as_dyn(&self) -> &dyn Dialect {
        self
    }

    fn write_identifier(&self, out: &mut String, value: &str) {
        out.push('`');
        self.write_escaped(out, value, '`', "``");
        out.push('`');
    }

    // MySQL treats backslash as an escape character inside literals.
    fn quote(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('\'');
        for c in value.chars() {
            match c {
                '\\' => out.push_str(r"\\"),
                '\'' => out.push_str(r"\'"),
                _ => out.push(c),
            }
        }
        out.push('\'');
        out
    }

    fn write_column_type(&self, out: &mut String, column: &Column) {
        match column.kind {
            ColumnType::Id | ColumnType::Integer | ColumnType::Serial => out.push_str("INT"),
            ColumnType::String => {
                out.push_str("VARCHAR(");
                let mut buffer = itoa::Buffer::new();
                out.push_str(buffer.format(column.length.unwrap_or(255)));
                out.push(')');
            }
            ColumnType::Float => out.push_str("DOUBLE"),
            ColumnType::Decimal => {
                let mut buffer = itoa::Buffer::new();
                out.push_str("DECIMAL(");
                out.push_str(buffer.format(column.length.unwrap_or(10)));
                out.push(',');
                out.push_str(buffer.format(column.precision.unwrap_or(2)));
                out.push(')');
            }
            ColumnType::Boolean => out.push_str("TINYINT(1)"),
            ColumnType::Date => out.push_str("DATE"),
            ColumnType::DateTime => out.push_str("DATETIME"),
            ColumnType::Json => out.push_str("JSON"),
            ColumnType::Null => out.push_str("TEXT"),
        }
    }

    fn write_column_def(&self, out: &mut String, column: &Column) -> Result<()> {
        if column.kind == ColumnType::Serial {
            self.write_identifier(out, &column.name);
            out.push_str(" INT NOT NULL AUTO_INCREMENT");
            return Ok(());
        }
        self.write_identifier(out, &column.name);
        out.push(' ');
        self.write_column_type(out, column);
        if !column.nullable {
            out.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            out.push_str(" DEFAULT ");
            self.write_value(out, default)?;
        }
        Ok(())
    }

    fn mapped(&self, native: &str, length: Option<u32>) -> ColumnType {
        if native == "tinyint" && length == Some(1) {
            return ColumnType::Boolean;
        }
        match native {
            "int" | "integer" | "tinyint" | "smallint" | "mediumint" | "bigint" => {
                ColumnType::Integer
            }
            "float" | "real" | "double" => ColumnType::Float,
            "decimal" | "numeric" => ColumnType::Decimal,
            "boolean" | "bool" => ColumnType::Boolean,
            "date" => ColumnType::Date,
            "datetime" | "timestamp" => ColumnType::DateTime,
            "json" => ColumnType::Json,
            _ => ColumnType::String,
        }
    }
}
