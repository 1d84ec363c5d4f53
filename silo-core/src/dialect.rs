use crate::{
    Column, ColumnType, CompareOp, Condition, CreateTable, DatabaseError, Delete, DropTable,
    Expression, Insert, JoinClause, Result, Select, SelectField, TableRef, Truncate, Update, Value,
    formatter::{DATETIME_FORMAT, DATE_FORMAT},
    separated_by,
};

macro_rules! write_integer {
    ($out:ident, $value:expr) => {{
        let mut buffer = itoa::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}
macro_rules! write_float {
    ($out:ident, $value:expr) => {{
        let mut buffer = ryu::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}

/// SQL generation for one engine.
///
/// The default methods produce the portable rendition; each driver
/// overrides the handful of spots where its engine deviates (identifier
/// quoting, string escaping, column types, serial columns).
pub trait Dialect: Send + Sync {
    fn as_dyn(&self) -> &dyn Dialect;

    fn write_escaped(&self, out: &mut String, value: &str, search: char, replace: &str) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + 1;
            }
        }
        out.push_str(&value[position..]);
    }

    fn write_identifier(&self, out: &mut String, value: &str) {
        out.push('"');
        self.write_escaped(out, value, '"', r#""""#);
        out.push('"');
    }

    /// A possibly dotted name, each part quoted, `*` passed through.
    fn write_name(&self, out: &mut String, value: &str) {
        separated_by(
            out,
            value.split('.'),
            |out, part| {
                if part == "*" {
                    out.push('*');
                } else {
                    self.write_identifier(out, part);
                }
            },
            ".",
        );
    }

    /// A string literal. The portable form doubles single quotes.
    fn quote(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('\'');
        self.write_escaped(&mut out, value, '\'', "''");
        out.push('\'');
        out
    }

    fn is_operator(&self, name: &str) -> bool {
        name.starts_with(':')
    }

    /// Render an expression escape. `:plain` emits its argument verbatim,
    /// `:name` as a quoted name.
    fn format_operator(&self, expression: &Expression) -> Result<String> {
        let argument = expression
            .args
            .first()
            .and_then(Value::as_str)
            .unwrap_or_default();
        match expression.operator.as_str() {
            ":plain" => Ok(argument.to_owned()),
            ":name" => {
                let mut out = String::new();
                self.write_name(&mut out, argument);
                Ok(out)
            }
            operator => Err(DatabaseError::new(format!(
                "Unexisting operator `'{operator}'`."
            ))),
        }
    }

    /// A value rendered by its own shape, used where no declared column
    /// type routes it through the conversion registry.
    fn write_value(&self, out: &mut String, value: &Value) -> Result<()> {
        match value {
            Value::Null => out.push_str("NULL"),
            Value::Boolean(v) => out.push_str(if *v { "TRUE" } else { "FALSE" }),
            Value::Integer(v) => write_integer!(out, *v),
            Value::Float(v) => write_float!(out, *v),
            Value::Decimal(v) => out.push_str(&v.to_string()),
            Value::String(v) => out.push_str(&self.quote(v)),
            Value::Date(v) => {
                let text = v
                    .format(&DATE_FORMAT)
                    .map_err(|e| DatabaseError::new(e.to_string()))?;
                out.push_str(&self.quote(&text));
            }
            Value::DateTime(v) => {
                let text = v
                    .format(&DATETIME_FORMAT)
                    .map_err(|e| DatabaseError::new(e.to_string()))?;
                out.push_str(&self.quote(&text));
            }
            Value::Json(v) => out.push_str(&self.quote(&v.to_string())),
            Value::Array(values) => {
                out.push('(');
                let mut first = true;
                for value in values {
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    self.write_value(out, value)?;
                }
                out.push(')');
            }
            Value::Expression(e) => out.push_str(&self.format_operator(e)?),
        }
        Ok(())
    }

    fn write_condition(&self, out: &mut String, condition: &Condition) -> Result<()> {
        match condition {
            Condition::Compare { field, op, value } => {
                self.write_name(out, field);
                match (op, value) {
                    (CompareOp::Equal, Value::Null) => out.push_str(" IS NULL"),
                    (CompareOp::NotEqual, Value::Null) => out.push_str(" IS NOT NULL"),
                    (CompareOp::Equal, Value::Array(..)) => {
                        out.push_str(" IN ");
                        self.write_value(out, value)?;
                    }
                    (CompareOp::NotEqual, Value::Array(..)) => {
                        out.push_str(" NOT IN ");
                        self.write_value(out, value)?;
                    }
                    _ => {
                        out.push(' ');
                        out.push_str(op.as_sql());
                        out.push(' ');
                        self.write_value(out, value)?;
                    }
                }
            }
            Condition::NamePair { left, right } => {
                self.write_name(out, left);
                out.push_str(" = ");
                self.write_name(out, right);
            }
            Condition::Raw(sql) => out.push_str(sql),
        }
        Ok(())
    }

    fn write_conditions(&self, out: &mut String, conditions: &[Condition]) -> Result<()> {
        let mut first = true;
        for condition in conditions {
            if !first {
                out.push_str(" AND ");
            }
            first = false;
            self.write_condition(out, condition)?;
        }
        Ok(())
    }

    fn write_table_ref(&self, out: &mut String, table: &TableRef) {
        self.write_identifier(out, &table.name);
        if table.alias != table.name {
            out.push_str(" AS ");
            self.write_identifier(out, &table.alias);
        }
    }

    fn write_join(&self, out: &mut String, join: &JoinClause) {
        out.push_str(join.kind.as_sql());
        out.push(' ');
        self.write_table_ref(out, &join.table);
        if let Some(on) = &join.on {
            out.push_str(" ON ");
            self.write_name(out, &on.left);
            out.push_str(" = ");
            self.write_name(out, &on.right);
        }
    }

    fn write_select(&self, out: &mut String, select: &Select) -> Result<()> {
        out.push_str("SELECT ");
        if select.fields.is_empty() {
            out.push('*');
        } else {
            let mut first = true;
            for field in &select.fields {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                match field {
                    SelectField::Column(name) => self.write_name(out, name),
                    SelectField::Raw(sql) => out.push_str(sql),
                }
            }
        }
        out.push_str(" FROM ");
        self.write_table_ref(out, &select.from);
        for join in &select.joins {
            out.push(' ');
            self.write_join(out, join);
        }
        if !select.conditions.is_empty() {
            out.push_str(" WHERE ");
            self.write_conditions(out, &select.conditions)?;
        }
        if !select.group.is_empty() {
            out.push_str(" GROUP BY ");
            separated_by(out, &select.group, |out, name| self.write_name(out, name), ", ");
        }
        if !select.having.is_empty() {
            out.push_str(" HAVING ");
            self.write_conditions(out, &select.having)?;
        }
        if !select.order.is_empty() {
            out.push_str(" ORDER BY ");
            separated_by(
                out,
                &select.order,
                |out, (name, order)| {
                    self.write_name(out, name);
                    out.push(' ');
                    out.push_str(order.as_sql());
                },
                ", ",
            );
        }
        if let Some(limit) = select.limit {
            out.push_str(" LIMIT ");
            write_integer!(out, limit);
            if let Some(offset) = select.offset {
                out.push_str(" OFFSET ");
                write_integer!(out, offset);
            }
        }
        Ok(())
    }

    fn write_insert(&self, out: &mut String, insert: &Insert) {
        out.push_str("INSERT INTO ");
        self.write_identifier(out, &insert.table);
        out.push_str(" (");
        separated_by(
            out,
            &insert.columns,
            |out, name| self.write_identifier(out, name),
            ", ",
        );
        out.push_str(") VALUES ");
        let mut first = true;
        for row in &insert.values {
            if !first {
                out.push_str(", ");
            }
            first = false;
            out.push('(');
            separated_by(out, row, |out, literal| out.push_str(literal), ", ");
            out.push(')');
        }
    }

    fn write_update(&self, out: &mut String, update: &Update) -> Result<()> {
        out.push_str("UPDATE ");
        self.write_identifier(out, &update.table);
        out.push_str(" SET ");
        separated_by(
            out,
            &update.assignments,
            |out, (name, literal)| {
                self.write_identifier(out, name);
                out.push_str(" = ");
                out.push_str(literal);
            },
            ", ",
        );
        if !update.conditions.is_empty() {
            out.push_str(" WHERE ");
            self.write_conditions(out, &update.conditions)?;
        }
        Ok(())
    }

    fn write_delete(&self, out: &mut String, delete: &Delete) -> Result<()> {
        out.push_str("DELETE FROM ");
        self.write_identifier(out, &delete.table);
        if !delete.conditions.is_empty() {
            out.push_str(" WHERE ");
            self.write_conditions(out, &delete.conditions)?;
        }
        Ok(())
    }

    fn write_column_type(&self, out: &mut String, column: &Column) {
        match column.kind {
            ColumnType::Id | ColumnType::Serial | ColumnType::Integer => out.push_str("INTEGER"),
            ColumnType::String => {
                out.push_str("VARCHAR(");
                write_integer!(out, column.length.unwrap_or(255));
                out.push(')');
            }
            ColumnType::Float => out.push_str("FLOAT"),
            ColumnType::Decimal => {
                out.push_str("NUMERIC(");
                write_integer!(out, column.length.unwrap_or(10));
                out.push(',');
                write_integer!(out, column.precision.unwrap_or(2));
                out.push(')');
            }
            ColumnType::Boolean => out.push_str("BOOLEAN"),
            ColumnType::Date => out.push_str("DATE"),
            ColumnType::DateTime => out.push_str("TIMESTAMP"),
            ColumnType::Null | ColumnType::Json => out.push_str("TEXT"),
        }
    }

    fn write_column_def(&self, out: &mut String, column: &Column) -> Result<()> {
        self.write_identifier(out, &column.name);
        out.push(' ');
        self.write_column_type(out, column);
        if column.is_array {
            out.push_str("[]");
        }
        if !column.nullable {
            out.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            out.push_str(" DEFAULT ");
            self.write_value(out, default)?;
        }
        Ok(())
    }

    fn write_create_table(&self, out: &mut String, create: &CreateTable) -> Result<()> {
        out.push_str("CREATE TABLE ");
        if create.if_not_exists {
            out.push_str("IF NOT EXISTS ");
        }
        self.write_identifier(out, &create.table);
        out.push_str(" (");
        let mut first = true;
        for column in &create.columns {
            if !first {
                out.push_str(", ");
            }
            first = false;
            self.write_column_def(out, column)?;
        }
        if let Some(key) = &create.primary_key {
            out.push_str(", PRIMARY KEY (");
            self.write_identifier(out, key);
            out.push(')');
        }
        out.push(')');
        Ok(())
    }

    fn write_drop_table(&self, out: &mut String, drop: &DropTable) {
        out.push_str("DROP TABLE ");
        if drop.if_exists {
            out.push_str("IF EXISTS ");
        }
        self.write_identifier(out, &drop.table);
        if drop.cascade {
            out.push_str(" CASCADE");
        } else if drop.restrict {
            out.push_str(" RESTRICT");
        }
    }

    fn write_truncate(&self, out: &mut String, truncate: &Truncate) {
        out.push_str("TRUNCATE TABLE ");
        self.write_identifier(out, &truncate.table);
    }

    /// Map a native type name reported by introspection to the portable
    /// type it stands for. `length` disambiguates the spellings some
    /// engines overload, like MySQL's `tinyint(1)` booleans.
    fn mapped(&self, native: &str, _length: Option<u32>) -> ColumnType {
        match native {
            "int" | "integer" | "tinyint" | "smallint" | "mediumint" | "bigint" | "int2"
            | "int4" | "int8" => ColumnType::Integer,
            "serial" | "bigserial" => ColumnType::Serial,
            "float" | "real" | "double" | "double precision" => ColumnType::Float,
            "decimal" | "numeric" => ColumnType::Decimal,
            "boolean" | "bool" => ColumnType::Boolean,
            "date" => ColumnType::Date,
            "datetime" | "timestamp" | "timestamp without time zone"
            | "timestamp with time zone" => ColumnType::DateTime,
            "json" | "jsonb" => ColumnType::Json,
            _ => ColumnType::String,
        }
    }

    fn begin_sql(&self) -> &'static str {
        "BEGIN"
    }

    fn commit_sql(&self) -> &'static str {
        "COMMIT"
    }

    fn rollback_sql(&self) -> &'static str {
        "ROLLBACK"
    }

    fn savepoint_sql(&self, name: u32) -> String {
        format!("SAVEPOINT TRANS{name}")
    }

    fn rollback_to_sql(&self, name: u32) -> String {
        format!("ROLLBACK TO SAVEPOINT TRANS{name}")
    }
}

/// The portable rendition with no engine deviation, used by tests and as
/// a placeholder before a driver is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericSqlDialect;

impl Dialect for GenericSqlDialect {
    fn as_dyn(&self) -> &dyn Dialect {
        self
    }
}
