use crate::{
    Condition, Connection, DatabaseError, JoinClause, JoinOn, JoinType, Order, Relation, Result,
    RowLabeled, Schema, SchemaProvider, Select, SelectField, TableRef, Value,
};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

/// What `get()` hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnMode {
    /// Records built through the bound model, values cast to application
    /// types.
    #[default]
    Entity,
    /// Raw labeled rows, values exactly as the driver produced them.
    Array,
    /// Rows boxed into maps.
    Object,
}

impl FromStr for ReturnMode {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "entity" => ReturnMode::Entity,
            "array" => ReturnMode::Array,
            "object" => ReturnMode::Object,
            _ => {
                return Err(DatabaseError::new(format!(
                    "Invalid `'{s}'` mode as `'return'` value"
                )))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    pub return_mode: ReturnMode,
}

/// One materialized record in entity mode. `exists` is `Some(true)` when
/// the row carried every field of its source and `None` when a partial
/// field list leaves it undecided.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub data: BTreeMap<String, Value>,
    pub exists: Option<bool>,
}

/// Materializes records in entity mode.
pub trait Model {
    fn create(&self, schema: &Schema, data: BTreeMap<String, Value>, exists: Option<bool>)
        -> Record;
}

/// Named reusable query refinements, applied through `Query::find`.
pub trait Finders {
    fn apply(&self, name: &str, query: &mut Query<'_>) -> Result<()>;
}

/// The entity-mode result set. `count` carries the unpaginated total when
/// the query was limited.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub records: Vec<Record>,
    pub count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Collection(Collection),
    Rows(Vec<RowLabeled>),
    Maps(Vec<BTreeMap<String, Value>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchedItem {
    Record(Record),
    Row(RowLabeled),
    Map(BTreeMap<String, Value>),
}

impl Fetched {
    pub fn len(&self) -> usize {
        match self {
            Fetched::Collection(collection) => collection.records.len(),
            Fetched::Rows(rows) => rows.len(),
            Fetched::Maps(maps) => maps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_first(self) -> Option<FetchedItem> {
        match self {
            Fetched::Collection(collection) => {
                collection.records.into_iter().next().map(FetchedItem::Record)
            }
            Fetched::Rows(rows) => rows.into_iter().next().map(FetchedItem::Row),
            Fetched::Maps(maps) => maps.into_iter().next().map(FetchedItem::Map),
        }
    }
}

/// A configuration value handed to `Query::configure`.
#[derive(Debug, Clone)]
pub enum OptionValue {
    Names(Vec<String>),
    Conditions(Vec<Condition>),
    Orders(Vec<(String, Order)>),
    Number(u64),
}

#[derive(Default)]
struct PathTree(BTreeMap<String, PathTree>);

impl PathTree {
    fn insert(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split('.') {
            node = node.0.entry(segment.to_owned()).or_default();
        }
    }
}

/// The portable query builder.
///
/// Every relation path walked by `has()` gets a statement-unique alias:
/// the first occurrence of a table name keeps the bare name, later
/// occurrences get a `__{n}` suffix counting from 0. Alias assignment is
/// idempotent per path, so walking `a.b` and `a.b.c` shares the `a.b`
/// join.
pub struct Query<'a> {
    schema: &'a Schema,
    schemas: Option<&'a dyn SchemaProvider>,
    model: Option<&'a dyn Model>,
    finders: Option<&'a dyn Finders>,
    statement: Select,
    root: String,
    aliases: BTreeMap<String, String>,
    alias_counter: HashMap<String, usize>,
    has: Vec<(String, Vec<Condition>)>,
    embed: Vec<String>,
    page: Option<u64>,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl<'a> Query<'a> {
    pub fn new(schema: &'a Schema) -> Result<Self> {
        let source = schema
            .source_name()
            .ok_or_else(|| DatabaseError::new("Missing table name for this schema."))?
            .to_owned();
        let mut query = Self {
            schema,
            schemas: None,
            model: None,
            finders: None,
            statement: Select::from(TableRef::new(&source)),
            root: String::new(),
            aliases: BTreeMap::new(),
            alias_counter: HashMap::new(),
            has: Vec::new(),
            embed: Vec::new(),
            page: None,
            offset: None,
            limit: None,
        };
        let root = query.alias_for("", schema)?;
        query.statement.from = TableRef::aliased(source, &root);
        query.root = root;
        Ok(query)
    }

    /// Attach the schema provider used to resolve relation targets.
    pub fn schemas(mut self, schemas: &'a dyn SchemaProvider) -> Self {
        self.schemas = Some(schemas);
        self
    }

    /// Attach the model materializing entity-mode records.
    pub fn model(mut self, model: &'a dyn Model) -> Self {
        self.model = Some(model);
        self
    }

    /// Attach the finders instance consulted by `find()`.
    pub fn finders(mut self, finders: &'a dyn Finders) -> Self {
        self.finders = Some(finders);
        self
    }

    /// Delegate to the named finder of the bound finders instance.
    pub fn find(&mut self, name: &str) -> Result<&mut Self> {
        let finders = self
            .finders
            .ok_or_else(|| DatabaseError::new("No finders instance has been defined."))?;
        finders.apply(name, self)?;
        Ok(self)
    }

    /// The alias registered for `path`, the root one for `""`.
    pub fn alias(&self, path: &str) -> Result<&str> {
        self.aliases
            .get(path)
            .map(String::as_str)
            .ok_or_else(|| DatabaseError::new(format!("No alias has been defined for `'{path}'`.")))
    }

    /// Register an alias for `path` pointing at `schema`'s source, or
    /// return the one already registered.
    pub fn alias_for(&mut self, path: &str, schema: &Schema) -> Result<String> {
        if let Some(alias) = self.aliases.get(path) {
            return Ok(alias.clone());
        }
        let source = schema
            .source_name()
            .ok_or_else(|| DatabaseError::new("Missing table name for this schema."))?
            .to_owned();
        let alias = match self.alias_counter.get_mut(&source) {
            None => {
                self.alias_counter.insert(source.clone(), 0);
                source
            }
            Some(counter) => {
                let alias = format!("{source}__{counter}");
                *counter += 1;
                alias
            }
        };
        self.aliases.insert(path.to_owned(), alias.clone());
        Ok(alias)
    }

    pub fn fields(&mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        for field in fields {
            self.field(field);
        }
        self
    }

    /// Add one field. A bare column of the root schema is qualified with
    /// the root alias, a fragment containing parentheses is kept raw.
    pub fn field(&mut self, field: impl Into<String>) -> &mut Self {
        let field = field.into();
        let field = if field.contains('(') {
            SelectField::Raw(field)
        } else if !field.contains('.') && self.schema.column_named(&field).is_some() {
            SelectField::Column(format!("{}.{field}", self.root))
        } else {
            SelectField::Column(field)
        };
        self.statement.fields.push(field);
        self
    }

    pub fn where_(&mut self, conditions: Vec<Condition>) -> &mut Self {
        let root = self.root.clone();
        self.where_at(conditions, &root)
    }

    /// Alias for `where_`.
    pub fn conditions(&mut self, conditions: Vec<Condition>) -> &mut Self {
        self.where_(conditions)
    }

    /// Add conditions scoped to a given alias.
    pub fn where_at(&mut self, conditions: Vec<Condition>, alias: &str) -> &mut Self {
        for condition in conditions {
            self.statement.conditions.push(condition.prefixed(alias));
        }
        self
    }

    pub fn group(&mut self, field: impl Into<String>) -> &mut Self {
        let field = self.qualified(field.into());
        self.statement.group.push(field);
        self
    }

    pub fn having(&mut self, conditions: Vec<Condition>) -> &mut Self {
        let root = self.root.clone();
        for condition in conditions {
            self.statement.having.push(condition.prefixed(&root));
        }
        self
    }

    pub fn order(&mut self, field: impl Into<String>, order: Order) -> &mut Self {
        let field = self.qualified(field.into());
        self.statement.order.push((field, order));
        self
    }

    fn qualified(&self, field: String) -> String {
        if field.contains('.') {
            field
        } else {
            format!("{}.{field}", self.root)
        }
    }

    pub fn page(&mut self, page: u64) -> &mut Self {
        self.page = Some(page);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// Limit the result set, `0` meaning no limit at all.
    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = if limit > 0 { Some(limit) } else { None };
        self
    }

    /// Record the relations to eager-load after the fetch.
    pub fn embed(&mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.embed.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn embedded(&self) -> &[String] {
        &self.embed
    }

    /// Constrain the query to rows having a related record at `path`,
    /// with optional conditions on the related table.
    pub fn has(&mut self, path: impl Into<String>, conditions: Vec<Condition>) -> &mut Self {
        self.has.push((path.into(), conditions));
        self
    }

    /// Apply options by name, the way a query is built from
    /// configuration.
    pub fn configure(&mut self, options: Vec<(String, OptionValue)>) -> Result<&mut Self> {
        for (name, value) in options {
            match (name.as_str(), value) {
                ("fields", OptionValue::Names(names)) => {
                    self.fields(names);
                }
                ("where" | "conditions", OptionValue::Conditions(conditions)) => {
                    self.where_(conditions);
                }
                ("group", OptionValue::Names(names)) => {
                    for name in names {
                        self.group(name);
                    }
                }
                ("having", OptionValue::Conditions(conditions)) => {
                    self.having(conditions);
                }
                ("order", OptionValue::Orders(orders)) => {
                    for (field, order) in orders {
                        self.order(field, order);
                    }
                }
                ("page", OptionValue::Number(n)) => {
                    self.page(n);
                }
                ("offset", OptionValue::Number(n)) => {
                    self.offset(n);
                }
                ("limit", OptionValue::Number(n)) => {
                    self.limit(n);
                }
                ("embed", OptionValue::Names(names)) => {
                    self.embed(names);
                }
                (name, _) => {
                    return Err(DatabaseError::new(format!(
                        "Invalid option `'{name}'` as query option."
                    )))
                }
            }
        }
        Ok(self)
    }

    fn resolve(&self, source: &str) -> Result<&'a Schema> {
        let provider = self
            .schemas
            .ok_or_else(|| DatabaseError::new("No schema provider has been defined."))?;
        provider
            .schema(source)
            .ok_or_else(|| DatabaseError::new(format!("Unexisting schema `'{source}'`.")))
    }

    /// Drain the pending `has` paths into joins and scoped conditions.
    fn apply_has(&mut self) -> Result<()> {
        if self.has.is_empty() {
            return Ok(());
        }
        let has = std::mem::take(&mut self.has);
        let mut tree = PathTree::default();
        for (path, _) in &has {
            tree.insert(path);
        }
        let schema = self.schema;
        let root = self.root.clone();
        self.apply_joins(schema, &tree, "", &root)?;
        for (path, conditions) in has {
            let alias = self.alias(&path)?.to_owned();
            self.where_at(conditions, &alias);
        }
        Ok(())
    }

    fn apply_joins(
        &mut self,
        schema: &'a Schema,
        tree: &PathTree,
        base: &str,
        from_alias: &str,
    ) -> Result<()> {
        for (name, children) in &tree.0 {
            let relation = schema.relation(name)?;
            let path = if base.is_empty() {
                name.clone()
            } else {
                format!("{base}.{name}")
            };
            let (to_alias, target_source) = match relation {
                Relation::HasManyThrough { through, using } => {
                    let through_relation = schema.relation(through)?;
                    let through_path = format!("{path}.{through}");
                    let through_alias = self.join(&through_path, through_relation, from_alias)?;
                    let through_schema = self.resolve(direct_target(through_relation)?)?;
                    let to_relation = through_schema.relation(using)?;
                    let to_alias = self.join(&path, to_relation, &through_alias)?;
                    (to_alias, direct_target(to_relation)?)
                }
                _ => {
                    let to_alias = self.join(&path, relation, from_alias)?;
                    (to_alias, direct_target(relation)?)
                }
            };
            if !children.0.is_empty() {
                let target = self.resolve(target_source)?;
                self.apply_joins(target, children, &path, &to_alias)?;
            }
        }
        Ok(())
    }

    /// Register the LEFT JOIN materializing a direct relation at `path`,
    /// reusing the join when the path was walked before.
    fn join(&mut self, path: &str, relation: &Relation, from_alias: &str) -> Result<String> {
        if let Some(alias) = self.aliases.get(path) {
            return Ok(alias.clone());
        }
        let to_source = direct_target(relation)?;
        let to_schema = self.resolve(to_source)?;
        let to_alias = self.alias_for(path, to_schema)?;
        let on = relation.keys().map(|(from_key, to_key)| JoinOn {
            left: format!("{from_alias}.{from_key}"),
            right: format!("{to_alias}.{to_key}"),
        });
        self.statement.joins.push(JoinClause {
            kind: JoinType::Left,
            table: TableRef::aliased(to_source, &to_alias),
            on,
        });
        Ok(to_alias)
    }

    /// Materialize the current state into a statement, leaving the
    /// builder reusable: default fields, pagination and the join-driven
    /// GROUP BY only live on the returned copy.
    fn build(&mut self) -> Result<Select> {
        self.apply_has()?;
        let mut statement = self.statement.clone();
        if let Some(limit) = self.limit {
            statement.limit = Some(limit);
            let offset = match self.offset {
                Some(offset) => offset,
                None => (self.page.unwrap_or(1).saturating_sub(1)) * limit,
            };
            if offset > 0 {
                statement.offset = Some(offset);
            }
        }
        if statement.fields.is_empty() {
            statement
                .fields
                .push(SelectField::Column(format!("{}.*", self.root)));
        }
        if !statement.joins.is_empty() {
            let group = format!("{}.{}", self.root, self.schema.primary_key());
            if !statement.group.contains(&group) {
                statement.group.push(group);
            }
        }
        Ok(statement)
    }

    /// Render the current statement without executing it.
    pub fn to_sql(&mut self, connection: &Connection) -> Result<String> {
        let statement = self.build()?;
        let mut sql = String::new();
        connection.dialect().write_select(&mut sql, &statement)?;
        Ok(sql)
    }

    /// The number of distinct root records the query matches, ignoring
    /// pagination.
    pub fn count(&mut self, connection: &mut Connection) -> Result<u64> {
        self.apply_has()?;
        let mut counter = Select::from(self.statement.from.clone());
        let mut key = String::new();
        connection
            .dialect()
            .write_name(&mut key, &format!("{}.{}", self.root, self.schema.primary_key()));
        counter
            .fields
            .push(SelectField::Raw(format!("COUNT(DISTINCT {key})")));
        counter.joins = self.statement.joins.clone();
        counter.conditions = self.statement.conditions.clone();
        counter.group = self.statement.group.clone();
        counter.having = self.statement.having.clone();
        let mut sql = String::new();
        connection.dialect().write_select(&mut sql, &counter)?;
        let mut cursor = connection.query(&sql)?;
        Ok(cursor
            .next()
            .as_ref()
            .and_then(RowLabeled::first)
            .and_then(Value::as_integer)
            .unwrap_or(0) as u64)
    }

    /// Execute the query.
    pub fn get(&mut self, connection: &mut Connection, options: FetchOptions) -> Result<Fetched> {
        let statement = self.build()?;
        let all_fields = self.statement.fields.is_empty();
        let mut sql = String::new();
        connection.dialect().write_select(&mut sql, &statement)?;
        let cursor = connection.query(&sql)?;
        match options.return_mode {
            ReturnMode::Entity => {
                let model = self.model.ok_or_else(|| {
                    DatabaseError::new(
                        "Missing model for this query, set `'return'` to `'array'` to get row data.",
                    )
                })?;
                let exists = if all_fields { Some(true) } else { None };
                let mut records = Vec::new();
                for row in cursor {
                    let data = self.schema.cast_row(connection, &row)?;
                    records.push(model.create(self.schema, data, exists));
                }
                let count = if statement.limit.is_some() {
                    Some(self.count(connection)?)
                } else {
                    None
                };
                Ok(Fetched::Collection(Collection { records, count }))
            }
            ReturnMode::Array => Ok(Fetched::Rows(cursor.collect())),
            ReturnMode::Object => Ok(Fetched::Maps(
                cursor
                    .map(|row| {
                        row.names()
                            .iter()
                            .cloned()
                            .zip(row.values().iter().cloned())
                            .collect()
                    })
                    .collect(),
            )),
        }
    }

    /// Alias for `get()`.
    pub fn all(&mut self, connection: &mut Connection, options: FetchOptions) -> Result<Fetched> {
        self.get(connection, options)
    }

    /// Execute the query and keep the first result only.
    pub fn first(
        &mut self,
        connection: &mut Connection,
        options: FetchOptions,
    ) -> Result<Option<FetchedItem>> {
        Ok(self.get(connection, options)?.into_first())
    }
}

fn direct_target(relation: &Relation) -> Result<&str> {
    relation
        .to()
        .ok_or_else(|| DatabaseError::new("Can't join a hasManyThrough relation directly."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Column, ColumnType};

    fn gallery() -> Schema {
        Schema::new()
            .source("gallery")
            .column(Column::new("id", ColumnType::Serial))
            .column(Column::new("name", ColumnType::String))
            .bind("images", Relation::has_many("image", ("id", "gallery_id")))
    }

    #[test]
    fn root_alias_is_the_bare_table_name() {
        let schema = gallery();
        let query = Query::new(&schema).unwrap();
        assert_eq!(query.alias("").unwrap(), "gallery");
    }

    #[test]
    fn alias_lookup_of_an_unknown_path_is_an_error() {
        let schema = gallery();
        let query = Query::new(&schema).unwrap();
        assert_eq!(
            query.alias("images").unwrap_err().message,
            "No alias has been defined for `'images'`."
        );
    }

    #[test]
    fn repeated_table_names_get_counted_suffixes() {
        let schema = gallery();
        let other = Schema::new().source("image");
        let mut query = Query::new(&schema).unwrap();
        assert_eq!(query.alias_for("a", &other).unwrap(), "image");
        assert_eq!(query.alias_for("b", &other).unwrap(), "image__0");
        assert_eq!(query.alias_for("c", &other).unwrap(), "image__1");
        // idempotent per path
        assert_eq!(query.alias_for("b", &other).unwrap(), "image__0");
    }

    #[test]
    fn unknown_query_option_names_are_rejected() {
        let schema = gallery();
        let mut query = Query::new(&schema).unwrap();
        let error = match query.configure(vec![("nope".to_owned(), OptionValue::Number(1))]) {
            Err(error) => error,
            Ok(_) => panic!("unknown options must be rejected"),
        };
        assert_eq!(error.message, "Invalid option `'nope'` as query option.");
    }

    struct GalleryFinders;

    impl Finders for GalleryFinders {
        fn apply(&self, name: &str, query: &mut Query<'_>) -> Result<()> {
            match name {
                "active" => {
                    query.where_(vec![Condition::eq("name", "Foo Gallery")]);
                    Ok(())
                }
                _ => Err(DatabaseError::new(format!(
                    "Unexisting finder `'{name}'`."
                ))),
            }
        }
    }

    #[test]
    fn find_without_a_finders_instance_is_an_error() {
        let schema = gallery();
        let mut query = Query::new(&schema).unwrap();
        let error = match query.find("active") {
            Err(error) => error,
            Ok(_) => panic!("find must require a finders instance"),
        };
        assert_eq!(error.message, "No finders instance has been defined.");
    }

    #[test]
    fn find_delegates_to_the_named_finder() {
        let schema = gallery();
        let finders = GalleryFinders;
        let mut query = Query::new(&schema).unwrap().finders(&finders);
        query.find("active").unwrap();
        assert_eq!(
            query.statement.conditions,
            vec![Condition::eq("gallery.name", "Foo Gallery")]
        );
        let error = match query.find("recent") {
            Err(error) => error,
            Ok(_) => panic!("unknown finders must surface the delegate error"),
        };
        assert_eq!(error.message, "Unexisting finder `'recent'`.");
    }

    #[test]
    fn invalid_return_mode_is_rejected_at_parse() {
        let error = "stream".parse::<ReturnMode>().unwrap_err();
        assert_eq!(error.message, "Invalid `'stream'` mode as `'return'` value");
    }
}
