//! End-to-end query tests through the library API, using SQLite and
//! document sources so no external servers are needed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use quiver::config::Config;
use quiver::output::Format;
use quiver::{Engine, QueryOptions, QueryOutcome, Source};

async fn seed_sqlite(path: &Path) {
    let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .unwrap()
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await.unwrap();
    sqlx::query("CREATE TABLE person (uid INTEGER, name TEXT, height REAL)")
        .execute(&pool)
        .await
        .unwrap();
    for (uid, name, height) in [
        (1i64, "ada", 1.7f64),
        (2, "grace", 1.6),
        (3, "alan", 1.8),
        (4, "edsger", 1.75),
    ] {
        sqlx::query("INSERT INTO person (uid, name, height) VALUES (?, ?, ?)")
            .bind(uid)
            .bind(name)
            .bind(height)
            .execute(&pool)
            .await
            .unwrap();
    }
    pool.close().await;
}

fn engine_with(sources: Vec<Source>) -> Engine {
    let mut config = Config::default();
    for src in sources {
        config.sources.add(src).unwrap();
    }
    Engine::new(&config)
}

fn src(handle: &str, location: &str, options: &[(&str, &str)]) -> Source {
    let opts: BTreeMap<String, String> = options
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Source::new(handle, location, opts).unwrap()
}

async fn run_to_file(
    engine: &Engine,
    query: &str,
    format: Format,
    out: &PathBuf,
    header: bool,
) -> quiver::Result<QueryOutcome> {
    let opts = QueryOptions {
        output: Some(out.clone()),
        format: Some(format),
        header: Some(header),
        ..Default::default()
    };
    engine
        .execute_query(&[query.to_string()], &opts, &CancellationToken::new())
        .await
}

#[tokio::test]
async fn sqlite_query_to_jsonl() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("people.sqlite");
    seed_sqlite(&db_path).await;

    let engine = engine_with(vec![src("@sl1", db_path.to_str().unwrap(), &[])]);
    let out = tmp.path().join("out.jsonl");
    run_to_file(&engine, "@sl1 | .person", Format::Jsonl, &out, false)
        .await
        .unwrap();
    engine.shutdown().await;

    let text = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["uid"], serde_json::json!(1));
    assert_eq!(first["name"], serde_json::json!("ada"));
}

#[tokio::test]
async fn row_range_and_projection() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("people.sqlite");
    seed_sqlite(&db_path).await;

    let engine = engine_with(vec![src("@sl1", db_path.to_str().unwrap(), &[])]);
    let out = tmp.path().join("out.csv");
    run_to_file(&engine, "@sl1 | .person | .name | .[1:3]", Format::Csv, &out, false)
        .await
        .unwrap();
    engine.shutdown().await;

    let text = fs::read_to_string(&out).unwrap();
    assert_eq!(text.lines().collect::<Vec<_>>(), ["grace", "alan"]);
}

#[tokio::test]
async fn count_aggregate() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("people.sqlite");
    seed_sqlite(&db_path).await;

    let engine = engine_with(vec![src("@sl1", db_path.to_str().unwrap(), &[])]);
    let out = tmp.path().join("out.csv");
    run_to_file(&engine, "@sl1 | .person | .count", Format::Csv, &out, false)
        .await
        .unwrap();
    engine.shutdown().await;

    assert_eq!(fs::read_to_string(&out).unwrap().trim(), "4");
}

#[tokio::test]
async fn csv_source_with_header_queries_like_a_table() {
    let tmp = TempDir::new().unwrap();
    let csv_path = tmp.path().join("data.csv");
    fs::write(&csv_path, "a,b,c\n1,hello,2.5\n2,world,3.5\n").unwrap();

    let engine = engine_with(vec![src(
        "@csv1",
        csv_path.to_str().unwrap(),
        &[("header", "true")],
    )]);
    let out = tmp.path().join("out.jsonl");
    run_to_file(&engine, "@csv1 | .data", Format::Jsonl, &out, false)
        .await
        .unwrap();
    engine.shutdown().await;

    let text = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    // Header names the columns; kinds come from the data rows.
    assert_eq!(first["a"], serde_json::json!(1));
    assert_eq!(first["b"], serde_json::json!("hello"));
    assert_eq!(first["c"], serde_json::json!(2.5));
}

#[tokio::test]
async fn headerless_csv_gets_alpha_columns() {
    let tmp = TempDir::new().unwrap();
    let csv_path = tmp.path().join("data.csv");
    fs::write(&csv_path, "1,x\n2,y\n").unwrap();

    let engine = engine_with(vec![src("@csv1", csv_path.to_str().unwrap(), &[])]);
    let out = tmp.path().join("out.csv");
    run_to_file(&engine, "@csv1 | .data", Format::Csv, &out, true)
        .await
        .unwrap();
    engine.shutdown().await;

    let text = fs::read_to_string(&out).unwrap();
    assert_eq!(text.lines().next().unwrap(), "A,B");
}

#[tokio::test]
async fn xlsx_sheet_becomes_scratch_table() {
    let tmp = TempDir::new().unwrap();
    let xlsx_path = tmp.path().join("book.xlsx");

    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Sheet1").unwrap();
    sheet.write_string(0, 0, "id").unwrap();
    sheet.write_string(0, 1, "title").unwrap();
    sheet.write_number(1, 0, 1.0).unwrap();
    sheet.write_string(1, 1, "dune").unwrap();
    sheet.write_number(2, 0, 2.0).unwrap();
    sheet.write_string(2, 1, "solaris").unwrap();
    workbook.save(&xlsx_path).unwrap();

    let engine = engine_with(vec![src(
        "@xl1",
        xlsx_path.to_str().unwrap(),
        &[("header", "true")],
    )]);
    let out = tmp.path().join("out.jsonl");
    run_to_file(&engine, "@xl1 | .Sheet1", Format::Jsonl, &out, false)
        .await
        .unwrap();
    engine.shutdown().await;

    let text = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["id"], serde_json::json!(1));
    assert_eq!(first["title"], serde_json::json!("dune"));
}

#[tokio::test]
async fn insert_copies_rows_between_sources() {
    let tmp = TempDir::new().unwrap();
    let from_path = tmp.path().join("from.sqlite");
    seed_sqlite(&from_path).await;
    let dest_path = tmp.path().join("dest.sqlite");

    let engine = engine_with(vec![
        src("@from", from_path.to_str().unwrap(), &[]),
        src("@dest", dest_path.to_str().unwrap(), &[]),
    ]);

    let opts = QueryOptions {
        insert: Some("@dest.people".to_string()),
        ..Default::default()
    };
    let outcome = engine
        .execute_query(
            &["@from | .person".to_string()],
            &opts,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    engine.shutdown().await;

    match outcome {
        QueryOutcome::Inserted { rows, target } => {
            assert_eq!(rows, 4);
            assert_eq!(target, "@dest.people");
        }
        other => panic!("expected insert outcome, got {other:?}"),
    }

    // The destination table was created and populated.
    let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", dest_path.display()))
        .unwrap();
    let pool = SqlitePool::connect_with(opts).await.unwrap();
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM people")
        .fetch_one(&pool)
        .await
        .unwrap();
    pool.close().await;
    assert_eq!(n, 4);
}

#[tokio::test]
async fn unknown_handle_and_table_fail_cleanly() {
    let tmp = TempDir::new().unwrap();
    let csv_path = tmp.path().join("data.csv");
    fs::write(&csv_path, "1,2\n").unwrap();

    let engine = engine_with(vec![src("@csv1", csv_path.to_str().unwrap(), &[])]);
    let cancel = CancellationToken::new();

    let err = engine
        .execute_query(
            &["@nope | .data".to_string()],
            &QueryOptions::default(),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, quiver::Error::UnknownHandle(_)));

    let err = engine
        .execute_query(
            &["@csv1 | .missing".to_string()],
            &QueryOptions::default(),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, quiver::Error::UnknownTable(_)));
    engine.shutdown().await;
}

#[tokio::test]
async fn bare_query_uses_active_source() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("people.sqlite");
    seed_sqlite(&db_path).await;

    let mut config = Config::default();
    config
        .sources
        .add(src("@sl1", db_path.to_str().unwrap(), &[]))
        .unwrap();
    config.sources.set_active("@sl1").unwrap();
    let engine = Engine::new(&config);

    let out = tmp.path().join("out.csv");
    let opts = QueryOptions {
        output: Some(out.clone()),
        format: Some(Format::Csv),
        header: Some(false),
        ..Default::default()
    };
    engine
        .execute_query(
            &[".person | .count".to_string()],
            &opts,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    engine.shutdown().await;

    assert_eq!(fs::read_to_string(&out).unwrap().trim(), "4");
}

#[tokio::test]
async fn cancellation_before_query_surfaces_cancelled() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("people.sqlite");
    seed_sqlite(&db_path).await;

    let engine = engine_with(vec![src("@sl1", db_path.to_str().unwrap(), &[])]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let out = tmp.path().join("out.jsonl");
    let opts = QueryOptions {
        output: Some(out),
        format: Some(Format::Jsonl),
        ..Default::default()
    };
    let err = engine
        .execute_query(&["@sl1 | .person".to_string()], &opts, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, quiver::Error::Cancelled));
    engine.shutdown().await;
}

#[tokio::test]
async fn table_output_has_header_names() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("people.sqlite");
    seed_sqlite(&db_path).await;

    let engine = engine_with(vec![src("@sl1", db_path.to_str().unwrap(), &[])]);
    let out = tmp.path().join("out.txt");
    run_to_file(&engine, "@sl1 | .person", Format::Table, &out, true)
        .await
        .unwrap();
    engine.shutdown().await;

    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("uid"));
    assert!(text.contains("name"));
    assert!(text.contains("ada"));
}
