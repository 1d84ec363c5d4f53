use crate::{Column, Value};

/// A table reference with the alias picked by the alias engine. When the
/// alias equals the table name the writers emit the bare name.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

/// An equality constraint between two qualified column names.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOn {
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinType,
    pub table: TableRef,
    pub on: Option<JoinOn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Like,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Equal => "=",
            CompareOp::NotEqual => "!=",
            CompareOp::Less => "<",
            CompareOp::LessEqual => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreaterEqual => ">=",
            CompareOp::Like => "LIKE",
        }
    }
}

/// One predicate of a WHERE or HAVING clause. Predicates at the same
/// level are joined with AND.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `field op value`. An `Equal` against `Value::Null` renders as
    /// `IS NULL`, against an array as `IN (...)`.
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// `left = right` between two column names, both quoted.
    NamePair { left: String, right: String },
    /// Raw SQL emitted verbatim.
    Raw(String),
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Compare {
            field: field.into(),
            op: CompareOp::Equal,
            value: value.into(),
        }
    }

    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Condition::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Qualify an unqualified field name with `alias`.
    pub fn prefixed(self, alias: &str) -> Self {
        match self {
            Condition::Compare { field, op, value } if !field.contains('.') => {
                Condition::Compare {
                    field: format!("{alias}.{field}"),
                    op,
                    value,
                }
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// A portable SELECT. Fields are dotted names (`alias.column`, possibly
/// `alias.*`) or raw SQL fragments such as aggregate calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub fields: Vec<SelectField>,
    pub from: TableRef,
    pub joins: Vec<JoinClause>,
    pub conditions: Vec<Condition>,
    pub group: Vec<String>,
    pub having: Vec<Condition>,
    pub order: Vec<(String, Order)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectField {
    /// A dotted column name, quoted part by part.
    Column(String),
    /// A raw fragment emitted verbatim.
    Raw(String),
}

impl Select {
    pub fn from(table: TableRef) -> Self {
        Self {
            fields: Vec::new(),
            from: table,
            joins: Vec::new(),
            conditions: Vec::new(),
            group: Vec::new(),
            having: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

/// An INSERT whose values were already rendered as SQL literals by the
/// datasource pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Vec<String>>,
}

/// An UPDATE with literal-rendered assignments.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, String)>,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub table: String,
    pub if_not_exists: bool,
    pub columns: Vec<Column>,
    pub primary_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTable {
    pub table: String,
    pub if_exists: bool,
    pub cascade: bool,
    pub restrict: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Truncate {
    pub table: String,
}
