use indoc::indoc;
use silo_core::{
    Column, ColumnType, Condition, Connection, FetchOptions, Fetched, Model, Query, Record,
    Relation, ReturnMode, Schema, Value,
};
use silo_sqlite::{SqliteAdapter, SqliteConfig};
use std::collections::{BTreeMap, HashMap};

fn connection() -> Connection {
    let _ = env_logger::builder().is_test(true).try_init();
    SqliteAdapter::connection(&SqliteConfig::default()).unwrap()
}

fn gallery() -> Schema {
    Schema::new()
        .source("gallery")
        .column(Column::new("id", ColumnType::Serial))
        .column(Column::new("name", ColumnType::String).length(128).not_null())
        .bind("images", Relation::has_many("image", ("id", "gallery_id")))
}

fn image() -> Schema {
    Schema::new()
        .source("image")
        .column(Column::new("id", ColumnType::Serial))
        .column(Column::new("gallery_id", ColumnType::Integer))
        .column(Column::new("title", ColumnType::String).length(128))
        .bind("gallery", Relation::belongs_to("gallery", ("gallery_id", "id")))
}

fn record(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

struct PlainModel;

impl Model for PlainModel {
    fn create(
        &self,
        _schema: &Schema,
        data: BTreeMap<String, Value>,
        exists: Option<bool>,
    ) -> Record {
        Record { data, exists }
    }
}

#[test]
fn savepoints_scope_nested_rollbacks() {
    let mut connection = connection();
    let schema = gallery();
    schema.create(&mut connection).unwrap();

    connection.begin_transaction().unwrap();
    schema
        .insert(&mut connection, &record(&[("name", "Foo Gallery".into())]))
        .unwrap();
    connection.begin_transaction().unwrap();
    schema
        .insert(&mut connection, &record(&[("name", "Bar Gallery".into())]))
        .unwrap();
    // undoes only the inner unit
    connection.rollback().unwrap();
    connection.commit().unwrap();

    let mut query = Query::new(&schema).unwrap();
    assert_eq!(query.count(&mut connection).unwrap(), 1);
}

#[test]
fn rollback_to_a_lower_level_unwinds_several_savepoints() {
    let mut connection = connection();
    let schema = gallery();
    schema.create(&mut connection).unwrap();

    connection.begin_transaction().unwrap();
    for name in ["a", "b", "c"] {
        connection.begin_transaction().unwrap();
        schema
            .insert(&mut connection, &record(&[("name", name.into())]))
            .unwrap();
    }
    connection.rollback_to(1).unwrap();
    connection.commit().unwrap();
    assert_eq!(connection.transaction_level(), 0);

    let mut query = Query::new(&schema).unwrap();
    assert_eq!(query.count(&mut connection).unwrap(), 0);
}

#[test]
fn joined_fetch_casts_and_counts() {
    let mut connection = connection();
    let schemas = HashMap::from([
        ("gallery".to_owned(), gallery()),
        ("image".to_owned(), image()),
    ]);
    let gallery = &schemas["gallery"];
    let image = &schemas["image"];
    gallery.create(&mut connection).unwrap();
    image.create(&mut connection).unwrap();

    gallery
        .insert(&mut connection, &record(&[("name", "Foo Gallery".into())]))
        .unwrap();
    let gallery_id = gallery.last_insert_id(&mut connection).unwrap().unwrap();
    gallery
        .insert(&mut connection, &record(&[("name", "Bar Gallery".into())]))
        .unwrap();
    for title in ["Morning Snow", "Evening Rain"] {
        image
            .insert(
                &mut connection,
                &record(&[
                    ("gallery_id", Value::Integer(gallery_id)),
                    ("title", title.into()),
                ]),
            )
            .unwrap();
    }

    let model = PlainModel;
    let mut query = Query::new(gallery).unwrap().schemas(&schemas).model(&model);
    query.has("images", vec![Condition::eq("title", "Morning Snow")]);
    let fetched = query.get(&mut connection, FetchOptions::default()).unwrap();
    match fetched {
        Fetched::Collection(collection) => {
            assert_eq!(collection.records.len(), 1);
            let record = &collection.records[0];
            assert_eq!(record.data.get("id"), Some(&Value::Integer(gallery_id)));
            assert_eq!(
                record.data.get("name"),
                Some(&Value::String("Foo Gallery".into()))
            );
        }
        other => panic!("expected a collection, got {other:?}"),
    }

    // both galleries, no filter
    let mut query = Query::new(gallery).unwrap().schemas(&schemas);
    assert_eq!(query.count(&mut connection).unwrap(), 2);
}

#[test]
fn array_mode_with_an_aggregate_field() {
    let mut connection = connection();
    let schema = gallery();
    schema.create(&mut connection).unwrap();
    for name in ["a", "b", "c"] {
        schema
            .insert(&mut connection, &record(&[("name", name.into())]))
            .unwrap();
    }

    let mut query = Query::new(&schema).unwrap();
    query.field("COUNT(*)");
    let fetched = query
        .get(
            &mut connection,
            FetchOptions {
                return_mode: ReturnMode::Array,
            },
        )
        .unwrap();
    match fetched {
        Fetched::Rows(rows) => {
            assert_eq!(rows[0].first(), Some(&Value::Integer(3)));
        }
        other => panic!("expected rows, got {other:?}"),
    }
}

#[test]
fn introspection_normalizes_types_and_defaults() {
    let mut connection = connection();
    connection
        .execute(indoc! {r#"
            CREATE TABLE "sample" (
                "id" INTEGER PRIMARY KEY AUTOINCREMENT,
                "title" VARCHAR(128) NOT NULL DEFAULT 'untitled',
                "price" NUMERIC(10,2) DEFAULT '5.00',
                "active" BOOLEAN DEFAULT 1,
                "created" DATETIME DEFAULT CURRENT_TIMESTAMP
            )
        "#})
        .unwrap();

    let schema = connection.describe("sample").unwrap();

    let title = schema.column_named("title").unwrap();
    assert_eq!(title.kind, ColumnType::String);
    assert_eq!(title.length, Some(128));
    assert!(!title.nullable);
    assert_eq!(title.default, Some(Value::String("untitled".into())));

    let price = schema.column_named("price").unwrap();
    assert_eq!(price.kind, ColumnType::Decimal);
    assert_eq!(price.length, Some(10));
    assert_eq!(price.precision, Some(2));

    let active = schema.column_named("active").unwrap();
    assert_eq!(active.kind, ColumnType::Boolean);
    assert_eq!(active.default, Some(Value::Boolean(true)));

    let created = schema.column_named("created").unwrap();
    assert_eq!(created.kind, ColumnType::DateTime);
    assert_eq!(created.default, None);
}

#[test]
fn sources_list_created_tables() {
    let mut connection = connection();
    gallery().create(&mut connection).unwrap();
    let sources = connection.sources().unwrap();
    assert!(sources.contains(&"gallery".to_owned()));
}

#[test]
fn encoding_reports_the_portable_name() {
    let mut connection = connection();
    assert_eq!(connection.encoding().unwrap(), "utf8");
}

#[test]
fn booleans_format_as_integers() {
    let connection = connection();
    assert_eq!(
        connection.format("boolean", &Value::Boolean(true), None).unwrap(),
        "1"
    );
    assert_eq!(
        connection.format("boolean", &Value::Boolean(false), None).unwrap(),
        "0"
    );
}

#[test]
fn truncate_empties_the_table() {
    let mut connection = connection();
    let schema = gallery();
    schema.create(&mut connection).unwrap();
    schema
        .insert(&mut connection, &record(&[("name", "Foo Gallery".into())]))
        .unwrap();
    schema.truncate(&mut connection).unwrap();
    let mut query = Query::new(&schema).unwrap();
    assert_eq!(query.count(&mut connection).unwrap(), 0);
}
