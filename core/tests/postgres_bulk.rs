//! Runs against the database named by `DATABASE_URL`; every test returns early without one.
//!
//! Each test creates its own table inside a transaction that is rolled back at the end.

use std::collections::HashSet;

use chrono::NaiveDate;
use pgbulk::{
    connection_string, format_table_name, row, BulkConfig, BulkConnection, BulkExecutor,
    BulkOperationError, ColumnRef, PostgresClient, ReturnedRow, Row, SqlValue, TableSchema,
    TypeRegistry, BULK_CHUNK_SIZE,
};
use rust_decimal::Decimal;
use tokio_postgres::Transaction;
use uuid::Uuid;

const TABLE_DDL: &str = r#"
CREATE TABLE "{table}" (
    id serial PRIMARY KEY,
    v_array text[],
    v_bool boolean,
    v_date date,
    v_datetime timestamp,
    v_default integer DEFAULT 31337,
    v_float double precision,
    v_int integer,
    v_json json,
    v_jsonb jsonb,
    v_numeric numeric,
    v_text text
);
"#;

async fn client() -> Option<PostgresClient> {
    connection_string().ok()?;
    PostgresClient::new().await.ok()
}

async fn create_table(tx: &mut Transaction<'_>, prefix: &str) -> String {
    let table = format!("pgbulk_{}_{}", prefix, Uuid::new_v4().simple());
    tx.batch_execute(&TABLE_DDL.replace("{table}", &table)).await.unwrap();
    table
}

fn executor() -> BulkExecutor {
    BulkExecutor::new(BulkConfig::default()).unwrap().with_registry(TypeRegistry::new())
}

async fn select(tx: &mut Transaction<'_>, schema: &TableSchema, columns: &str) -> Vec<ReturnedRow> {
    let sql = format!("SELECT {} FROM {} ORDER BY id", columns, format_table_name(schema.name()));
    tx.query_literal(&sql).await.unwrap()
}

fn refs(columns: &[&str]) -> Vec<ColumnRef> {
    columns.iter().map(|column| ColumnRef::from(*column)).collect()
}

macro_rules! with_table {
    ($prefix:expr, |$tx:ident, $schema:ident, $executor:ident| $body:block) => {{
        let Some(client) = client().await else {
            eprintln!("database is not reachable, skipping");
            return;
        };
        let mut conn = client.get().await.unwrap();
        let mut $tx = conn.transaction().await.unwrap();
        let table = create_table(&mut $tx, $prefix).await;
        let $executor = executor();
        let $schema =
            TableSchema::introspect(&mut $tx, $executor.registry(), &table).await.unwrap();

        $body

        $tx.rollback().await.unwrap();
    }};
}

#[tokio::test]
async fn test_get_column_types() {
    with_table!("types", |tx, schema, executor| {
        let column_types = executor.registry().cached(schema.name()).unwrap();

        let expected = vec![
            ("id", "integer"),
            ("v_array", "text[]"),
            ("v_bool", "boolean"),
            ("v_date", "date"),
            ("v_datetime", "timestamp without time zone"),
            ("v_default", "integer"),
            ("v_float", "double precision"),
            ("v_int", "integer"),
            ("v_json", "json"),
            ("v_jsonb", "jsonb"),
            ("v_numeric", "numeric"),
            ("v_text", "text"),
        ];
        assert_eq!(column_types.iter().collect::<Vec<_>>(), expected);
        assert_eq!(schema.column_keys().count(), expected.len());
    });
}

#[tokio::test]
async fn test_insert_single() {
    with_table!("insert_single", |tx, schema, executor| {
        let rows = executor
            .insert(
                &mut tx,
                &schema,
                &[row! { "v_int" => 321, "v_text" => "123" }],
                &refs(&["id", "v_text", "v_int"]),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.len(), 3);
        assert!(row.try_get::<i32>("id").unwrap().is_some());
        assert_eq!(row.get("v_text"), Some("123"));
        assert_eq!(row.try_get::<i32>("v_int"), Ok(Some(321)));
    });
}

#[tokio::test]
async fn test_insert_no_returning() {
    with_table!("insert_no_returning", |tx, schema, executor| {
        let rows =
            executor.insert(&mut tx, &schema, &[row! { "v_int" => 1 }], &[]).await.unwrap();
        assert!(rows.is_empty());

        let stored = select(&mut tx, &schema, "id, v_int, v_default").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get("v_int"), Some("1"));
        assert_eq!(stored[0].get("v_default"), Some("31337"));
    });
}

#[tokio::test]
async fn test_insert_unknown_column_leaves_table_unchanged() {
    with_table!("insert_unknown", |tx, schema, executor| {
        let result = executor
            .insert(&mut tx, &schema, &[row! { "v_int" => 1, "unknown_column" => 2 }], &[])
            .await;

        let error = result.unwrap_err();
        assert!(matches!(error, BulkOperationError::InvalidColumn { .. }));
        assert_eq!(
            error.to_string(),
            "invalid key `unknown_column` in values_series[0]: not in table"
        );

        let result =
            executor.insert(&mut tx, &schema, &[row! { "v_int" => 1 }], &refs(&["unknown_column"])).await;
        assert!(matches!(result, Err(BulkOperationError::InvalidColumn { index: None, .. })));

        assert!(select(&mut tx, &schema, "id").await.is_empty());
    });
}

#[tokio::test]
async fn test_insert_bulk_spans_chunks() {
    with_table!("insert_bulk", |tx, schema, executor| {
        let count = BULK_CHUNK_SIZE + 10;
        let series: Vec<Row> =
            (0..count).map(|i| row! { "v_int" => i as i64, "v_text" => i.to_string() }).collect();

        let rows = executor
            .insert(&mut tx, &schema, &series, &refs(&["v_int", "v_text"]))
            .await
            .unwrap();

        let expected: HashSet<(String, String)> =
            (0..count).map(|i| (i.to_string(), i.to_string())).collect();
        let returned: HashSet<(String, String)> = rows
            .iter()
            .map(|row| {
                (row.get("v_int").unwrap().to_string(), row.get("v_text").unwrap().to_string())
            })
            .collect();

        assert_eq!(rows.len(), count);
        assert_eq!(returned, expected);
    });
}

#[tokio::test]
async fn test_insert_typed_values() {
    with_table!("insert_typed", |tx, schema, executor| {
        let series = vec![row! {
            "v_array" => vec!["A", "B", "it's"],
            "v_bool" => true,
            "v_date" => NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            "v_datetime" => NaiveDate::from_ymd_opt(2024, 5, 6).unwrap().and_hms_opt(7, 8, 9).unwrap(),
            "v_float" => 2.5,
            "v_json" => vec![1, 2],
            "v_jsonb" => serde_json::json!({"a": "b"}),
            "v_numeric" => Decimal::new(1, 1),
            "v_text" => "back\\slash",
        }];

        executor.insert(&mut tx, &schema, &series, &[]).await.unwrap();

        let stored = select(
            &mut tx,
            &schema,
            "v_array, v_bool, v_date, v_datetime, v_float, v_json, v_jsonb, v_numeric, v_text",
        )
        .await;
        let row = &stored[0];

        assert_eq!(row.get("v_array"), Some("{A,B,it's}"));
        assert_eq!(row.get("v_bool"), Some("t"));
        assert_eq!(row.get("v_date"), Some("2024-05-06"));
        assert_eq!(row.get("v_datetime"), Some("2024-05-06 07:08:09"));
        assert_eq!(row.try_get::<f64>("v_float"), Ok(Some(2.5)));
        assert_eq!(row.get("v_json"), Some("[1,2]"));
        assert_eq!(row.get("v_jsonb"), Some(r#"{"a": "b"}"#));
        assert_eq!(row.get("v_numeric"), Some("0.1"));
        assert_eq!(row.get("v_text"), Some("back\\slash"));
    });
}

#[tokio::test]
async fn test_adversarial_strings_are_stored_verbatim() {
    with_table!("insert_adversarial", |tx, schema, executor| {
        let texts = [
            "'; DROP TABLE t; --",
            "quote''s",
            "E'\\x41'",
            "\\'",
            "$$ dollar $$",
            "/* comment */ SELECT 1",
            "ünïcødé ✓",
            "",
        ];
        let series: Vec<Row> = texts.iter().map(|text| row! { "v_text" => *text }).collect();

        executor.insert(&mut tx, &schema, &series, &[]).await.unwrap();

        let stored: HashSet<String> = select(&mut tx, &schema, "v_text")
            .await
            .iter()
            .map(|row| row.get("v_text").unwrap_or_default().to_string())
            .collect();
        let expected: HashSet<String> = texts.iter().map(|text| text.to_string()).collect();
        assert_eq!(stored, expected);
    });
}

async fn insert_one(tx: &mut Transaction<'_>, schema: &TableSchema, executor: &BulkExecutor) -> i64 {
    let rows = executor
        .insert(tx, schema, &[row! { "v_text" => SqlValue::Null }], &refs(&["id"]))
        .await
        .unwrap();
    rows[0].try_get::<i64>("id").unwrap().unwrap()
}

#[tokio::test]
async fn test_update_scalar_fields() {
    with_table!("update_scalar", |tx, schema, executor| {
        let id = insert_one(&mut tx, &schema, &executor).await;

        let cleared = row! {
            "id" => id,
            "v_array" => None::<Vec<String>>,
            "v_bool" => None::<bool>,
            "v_date" => None::<NaiveDate>,
            "v_float" => None::<f64>,
            "v_int" => None::<i32>,
            "v_numeric" => None::<Decimal>,
            "v_text" => None::<String>,
        };
        executor.update(&mut tx, &schema, &[cleared.clone(), cleared], &[], None).await.unwrap();

        let stored = select(&mut tx, &schema, "v_array, v_bool, v_int, v_text").await;
        assert_eq!(stored[0].get("v_array"), None);
        assert_eq!(stored[0].get("v_text"), None);

        let filled = row! {
            "id" => id,
            "v_array" => vec!["A", "B", "C", "1", "2", "3"],
            "v_bool" => true,
            "v_date" => NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            "v_float" => 2.5,
            "v_int" => 1488,
            "v_numeric" => Decimal::new(1, 1),
            "v_text" => "xyz",
        };
        executor.update(&mut tx, &schema, &[filled.clone(), filled], &[], None).await.unwrap();

        let stored =
            select(&mut tx, &schema, "v_array, v_bool, v_date, v_float, v_int, v_numeric, v_text").await;
        let row = &stored[0];
        assert_eq!(row.get("v_array"), Some("{A,B,C,1,2,3}"));
        assert_eq!(row.get("v_bool"), Some("t"));
        assert_eq!(row.get("v_date"), Some("2024-01-02"));
        assert_eq!(row.try_get::<f64>("v_float"), Ok(Some(2.5)));
        assert_eq!(row.get("v_int"), Some("1488"));
        assert_eq!(row.get("v_numeric"), Some("0.1"));
        assert_eq!(row.get("v_text"), Some("xyz"));
    });
}

#[tokio::test]
async fn test_update_multiple_references() {
    with_table!("update_references", |tx, schema, executor| {
        let id = insert_one(&mut tx, &schema, &executor).await;

        let first = row! { "id" => id, "v_int" => 1, "v_text" => "xxx" };
        executor.update(&mut tx, &schema, &[first.clone(), first], &[], None).await.unwrap();

        let second = row! { "id" => id, "v_int" => 1, "v_text" => "yyy" };
        executor
            .update(&mut tx, &schema, &[second.clone(), second], &[], Some(refs(&["id", "v_int"]).as_slice()))
            .await
            .unwrap();

        let stored = select(&mut tx, &schema, "v_int, v_text").await;
        assert_eq!(stored[0].get("v_int"), Some("1"));
        assert_eq!(stored[0].get("v_text"), Some("yyy"));
    });
}

#[tokio::test]
async fn test_update_missing_reference_fails_before_writing() {
    with_table!("update_missing_reference", |tx, schema, executor| {
        let id = insert_one(&mut tx, &schema, &executor).await;

        let result = executor
            .update(
                &mut tx,
                &schema,
                &[row! { "id" => id, "v_text" => "changed" }],
                &[],
                Some(refs(&["v_int"]).as_slice()),
            )
            .await;
        assert!(matches!(result, Err(BulkOperationError::Configuration(_))));

        let stored = select(&mut tx, &schema, "v_text").await;
        assert_eq!(stored[0].get("v_text"), None);
    });
}

#[tokio::test]
async fn test_update_returning() {
    with_table!("update_returning", |tx, schema, executor| {
        let id = insert_one(&mut tx, &schema, &executor).await;

        let dataset = row! { "id" => id, "v_text" => ":zzz%" };
        let rows = executor
            .update(&mut tx, &schema, &[dataset.clone(), dataset], &refs(&["v_date", "v_text"]), None)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[0].get("v_text"), Some(":zzz%"));
        assert_eq!(rows[0].get("v_date"), None);
        assert!(rows[0].contains("v_date"));
    });
}

#[tokio::test]
async fn test_update_skips_unchanged_rows() {
    with_table!("update_guard", |tx, schema, executor| {
        let id = insert_one(&mut tx, &schema, &executor).await;
        let dataset = [row! { "id" => id, "v_int" => 7, "v_text" => "same" }];

        let first = executor.update(&mut tx, &schema, &dataset, &refs(&["id"]), None).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = executor.update(&mut tx, &schema, &dataset, &refs(&["id"]), None).await.unwrap();
        assert!(second.is_empty());

        // json is not comparable, so the row is written again
        let with_json = [row! { "id" => id, "v_json" => serde_json::json!([1]), "v_text" => "same" }];
        executor.update(&mut tx, &schema, &with_json, &[], None).await.unwrap();
        let again = executor.update(&mut tx, &schema, &with_json, &refs(&["id"]), None).await.unwrap();
        assert_eq!(again.len(), 1);
    });
}

const ARRAY_TABLE_DDL: &str = r#"
CREATE TYPE "{table}_mood" AS ENUM ('sad', 'ok', 'happy');
CREATE TABLE "{table}" (
    id serial PRIMARY KEY,
    v_dates date[],
    v_ints integer[],
    v_moods "{table}_mood"[],
    v_uuids uuid[]
);
"#;

#[tokio::test]
async fn test_insert_typed_arrays() {
    let Some(client) = client().await else {
        eprintln!("database is not reachable, skipping");
        return;
    };
    let mut conn = client.get().await.unwrap();
    let mut tx = conn.transaction().await.unwrap();
    let table = format!("pgbulk_arrays_{}", Uuid::new_v4().simple());
    tx.batch_execute(&ARRAY_TABLE_DDL.replace("{table}", &table)).await.unwrap();

    let executor = executor();
    let schema = TableSchema::introspect(&mut tx, executor.registry(), &table).await.unwrap();

    let series = vec![
        row! {
            "v_dates" => vec![
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            ],
            "v_ints" => vec![Vec::<i64>::new()],
            "v_moods" => vec!["happy", "sad"],
            "v_uuids" => vec![Uuid::nil()],
        },
        row! {
            "v_dates" => Vec::<NaiveDate>::new(),
            "v_ints" => vec![vec![1, 2], vec![3, 4]],
            "v_moods" => Vec::<String>::new(),
            "v_uuids" => SqlValue::Null,
        },
    ];
    executor.insert(&mut tx, &schema, &series, &[]).await.unwrap();

    let stored = select(&mut tx, &schema, "v_dates, v_ints, v_moods, v_uuids").await;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].get("v_dates"), Some("{2024-01-02,2024-01-03}"));
    assert_eq!(stored[0].get("v_ints"), Some("{}"));
    assert_eq!(stored[0].get("v_moods"), Some("{happy,sad}"));
    assert_eq!(stored[0].get("v_uuids"), Some("{00000000-0000-0000-0000-000000000000}"));
    assert_eq!(stored[1].get("v_dates"), Some("{}"));
    assert_eq!(stored[1].get("v_ints"), Some("{{1,2},{3,4}}"));
    assert_eq!(stored[1].get("v_moods"), Some("{}"));
    assert_eq!(stored[1].get("v_uuids"), None);

    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_data_access_error_carries_server_message() {
    with_table!("server_message", |tx, schema, executor| {
        let error = executor
            .insert(&mut tx, &schema, &[row! { "v_int" => "abc" }], &[])
            .await
            .unwrap_err();

        assert!(matches!(error, BulkOperationError::DataAccess(_)));
        let message = error.to_string();
        assert!(message.contains("22P02"), "{}", message);
        assert!(message.contains("invalid input syntax for type integer"), "{}", message);
    });
}
