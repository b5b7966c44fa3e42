//! Migration log and migrator against the memory store.

mod common;

use common::{init_tracing, library, library_schema, scratch_dir, with_field};
use jiff::Timestamp;
use tabula::{
    Client, DefaultValue, Error, Field, FindOptions, LogError, MemoryStore, MigrationLog, Migrator,
    PredicateNode, ScalarType, Store, StepKind, values,
};

fn at(ts: &str) -> Timestamp {
    ts.parse().unwrap()
}

#[tokio::test]
async fn test_generate_and_apply() {
    init_tracing();
    let dir = scratch_dir("migrations");
    let log = MigrationLog::new(&dir);
    let schema = library_schema();

    assert!(log.list().unwrap().is_empty());
    let file = log
        .generate_at("Init library", &schema, at("2026-01-18T20:36:59Z"))
        .unwrap()
        .unwrap();
    assert_eq!(file.version, "2026_01_18_203659");
    assert_eq!(file.name, "init_library");
    assert!(dir.join("m2026_01_18_203659_init_library.json").is_file());
    assert!(file.snapshot.equivalent(&schema));

    // nothing changed, nothing to write
    assert!(
        log.generate_at("again", &schema, at("2026-01-19T11:09:50Z"))
            .unwrap()
            .is_none()
    );
    assert_eq!(log.list().unwrap(), vec![file.clone()]);

    let store = MemoryStore::new();
    let migrator = Migrator::new(&store, &log);
    let status = migrator.status().await.unwrap();
    assert_eq!(status.len(), 1);
    assert!(!status[0].applied);

    assert_eq!(migrator.migrate().await.unwrap(), vec![file.version.clone()]);
    assert!(migrator.migrate().await.unwrap().is_empty());

    let status = migrator.status().await.unwrap();
    assert!(status[0].applied);
    assert!(status[0].applied_at.is_some());
    assert!(store.introspect().await.unwrap().equivalent(&schema));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_schema_evolution_keeps_data() {
    init_tracing();
    let dir = scratch_dir("evolution");
    let log = MigrationLog::new(&dir);
    let store = MemoryStore::new();
    let migrator = Migrator::new(&store, &log);

    log.generate_at("init", &library_schema(), at("2026-01-18T20:36:59Z"))
        .unwrap();
    migrator.migrate().await.unwrap();

    let client = Client::new(library_schema(), store.clone());
    client
        .create(
            "Book",
            values! { "title" => "Roughing It!", "publishedYear" => 1999, "pages" => 990 },
        )
        .await
        .unwrap();

    let evolved = with_field(
        &library(),
        "Book",
        Field::scalar("subtitle", ScalarType::Text).nullable(),
    )
    .resolve()
    .unwrap();

    let file = log
        .generate_at("add subtitle", &evolved, at("2026-01-19T11:09:50Z"))
        .unwrap()
        .unwrap();
    assert_eq!(file.steps.len(), 1);
    assert!(matches!(
        &file.steps[0].kind,
        StepKind::AddColumn { column, .. } if column.name == "subtitle"
    ));

    assert_eq!(migrator.migrate().await.unwrap(), vec![file.version]);

    let client = Client::new(evolved, store.clone());
    let books = client
        .find_many("Book", &PredicateNode::always(), FindOptions::new())
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].get("subtitle"), Some(&tabula::Value::Null));
    assert_eq!(books[0].get("pages"), Some(&tabula::Value::Int(990)));

    // versions must move forward
    let err = log
        .generate_at("late", &library_schema(), at("2026-01-01T00:00:00Z"))
        .unwrap_err();
    assert!(matches!(err, Error::Log(LogError::OutOfOrder { .. })));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_failed_migration_rolls_back() {
    init_tracing();
    let dir = scratch_dir("rollback");
    let log = MigrationLog::new(&dir);
    let store = MemoryStore::new();
    let migrator = Migrator::new(&store, &log);

    log.generate_at("init", &library_schema(), at("2026-01-18T20:36:59Z"))
        .unwrap();
    migrator.migrate().await.unwrap();
    let client = Client::new(library_schema(), store.clone());
    client
        .create(
            "Author",
            values! { "name" => "Mark Twain", "email" => "mark@example.com" },
        )
        .await
        .unwrap();

    // a required column without a default cannot be added to a populated table
    let next = with_field(&library(), "Author", Field::scalar("country", ScalarType::Text))
        .resolve()
        .unwrap();
    let file = log
        .generate_at("add country", &next, at("2026-01-19T11:09:50Z"))
        .unwrap()
        .unwrap();
    assert!(file.steps[0].requires_backfill);

    let err = migrator.migrate().await.unwrap_err();
    let Error::Migration { version, index, .. } = &err else {
        panic!("expected a migration error, got {err:?}");
    };
    assert_eq!(version, &file.version);
    assert_eq!(*index, 0);

    let status = migrator.status().await.unwrap();
    assert_eq!(
        status.iter().map(|s| s.applied).collect::<Vec<_>>(),
        [true, false]
    );
    let authors = store.rows("Author").await;
    assert_eq!(authors.len(), 1);
    assert!(!authors[0].contains_key("country"));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_default_does_not_backfill_existing_nulls() {
    init_tracing();
    let dir = scratch_dir("set-not-null");
    let log = MigrationLog::new(&dir);
    let store = MemoryStore::new();
    let migrator = Migrator::new(&store, &log);

    let optional = with_field(
        &library(),
        "Book",
        Field::scalar("subtitle", ScalarType::Text).nullable(),
    )
    .resolve()
    .unwrap();
    log.generate_at("init", &optional, at("2026-01-18T20:36:59Z"))
        .unwrap();
    migrator.migrate().await.unwrap();
    Client::new(optional, store.clone())
        .create(
            "Book",
            values! { "title" => "Orbital", "publishedYear" => 2025, "pages" => 464 },
        )
        .await
        .unwrap();

    let required = with_field(
        &library(),
        "Book",
        Field::scalar("subtitle", ScalarType::Text)
            .default(DefaultValue::Literal(tabula::Value::from("n/a"))),
    )
    .resolve()
    .unwrap();
    let file = log
        .generate_at("require subtitle", &required, at("2026-01-19T11:09:50Z"))
        .unwrap()
        .unwrap();
    assert_eq!(file.steps.len(), 1);
    assert!(matches!(file.steps[0].kind, StepKind::AlterColumn { .. }));
    assert!(file.steps[0].requires_backfill);

    let err = migrator.migrate().await.unwrap_err();
    assert!(matches!(err, Error::Migration { index: 0, .. }));
    let books = store.rows("Book").await;
    assert_eq!(books[0].get("subtitle"), Some(&tabula::Value::Null));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_log_rejects_foreign_files() {
    let dir = scratch_dir("foreign");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("README.md"), "not a migration").unwrap();
    let log = MigrationLog::new(&dir);
    assert!(log.list().unwrap().is_empty());

    std::fs::write(dir.join("notes.json"), "{}").unwrap();
    assert!(matches!(log.list(), Err(LogError::InvalidName(_))));

    std::fs::remove_dir_all(&dir).unwrap();
}
