//! Round trips against a real Postgres.
//!
//! Uses `POSTGRES_HOST` / `POSTGRES_PORT` when set, otherwise starts a
//! container through testcontainers (Docker must be running).
//!
//! Run with: cargo nextest run -p tabula --features test-postgres --test postgres

#![cfg(feature = "test-postgres")]

mod common;

use common::{init_tracing, library_schema, scratch_dir};
use tabula::{
    Client, Config, DataError, Filter, FindOptions, MigrationLog, Migrator, PgStore,
    PredicateNode, SortOrder, Store, StoreError, Value, values,
};
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;

/// A database URL, plus the container backing it when one was started.
async fn database() -> (String, Option<ContainerAsync<Postgres>>) {
    if let (Ok(host), Ok(port)) = (std::env::var("POSTGRES_HOST"), std::env::var("POSTGRES_PORT")) {
        return (format!("postgres://postgres:postgres@{host}:{port}/postgres"), None);
    }
    let container = Postgres::default().start().await.unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();
    (
        format!("postgres://postgres:postgres@{host}:{port}/postgres"),
        Some(container),
    )
}

/// Each test works in its own namespace.
async fn store(url: &str) -> PgStore {
    let namespace = format!("t_{}", uuid::Uuid::new_v4().simple());
    let config = Config {
        database_url: Some(format!("{url}?schema={namespace}")),
        pool_size: 4,
        ..Config::default()
    };
    PgStore::connect(&config).await.unwrap()
}

#[tokio::test]
async fn test_migrate_introspect_and_query() {
    init_tracing();
    let (url, _container) = database().await;
    let store = store(&url).await;
    let schema = library_schema();

    let dir = scratch_dir("pg-migrations");
    let log = MigrationLog::new(&dir);
    let file = log.generate("init", &schema).unwrap().unwrap();
    let migrator = Migrator::new(&store, &log);
    assert_eq!(migrator.migrate().await.unwrap(), vec![file.version.clone()]);
    assert!(migrator.status().await.unwrap()[0].applied);

    let introspected = store.introspect().await.unwrap();
    assert!(
        introspected.equivalent(&schema),
        "introspected schema differs:\n{introspected:#?}"
    );

    let client = Client::new(schema, store.clone());
    let twain = client
        .create(
            "Author",
            values! { "name" => "Mark Twain", "email" => "mark@example.com" },
        )
        .await
        .unwrap();
    assert_eq!(twain.get("id"), Some(&Value::BigInt(1)));

    for (title, year, pages) in [
        ("Roughing It!", 1999, 990),
        ("The Overstory", 2016, 320),
        ("50% off_sale", 2025, 464),
    ] {
        client
            .create(
                "Book",
                values! {
                    "title" => title,
                    "publishedYear" => year,
                    "pages" => pages,
                    "authorId" => twain.get("id").cloned().unwrap(),
                },
            )
            .await
            .unwrap();
    }

    let predicate = client
        .filter(
            "Book",
            &Filter::and([
                Filter::gt("publishedYear", 2000),
                Filter::gt("pages", 300),
            ]),
        )
        .unwrap();
    let found = client
        .find_many(
            "Book",
            &predicate,
            FindOptions::new().order_by("publishedYear", SortOrder::Desc),
        )
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let years: Vec<_> = found.iter().map(|r| r.get("publishedYear").cloned()).collect();
    assert_eq!(years, [Some(Value::Int(2025)), Some(Value::Int(2016))]);

    // LIKE wildcards in the needle match literally
    let sale = client
        .filter("Book", &Filter::contains("title", "% off_"))
        .unwrap();
    assert_eq!(client.count("Book", &sale).await.unwrap(), 1);
    let none = client
        .filter("Book", &Filter::contains("title", "%x"))
        .unwrap();
    assert_eq!(client.count("Book", &none).await.unwrap(), 0);

    let err = client
        .create(
            "Author",
            values! { "name" => "Samuel Clemens", "email" => "mark@example.com" },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_store_error(),
        Some(StoreError::ConstraintViolation { constraint, .. }) if constraint == "uq_Author_email"
    ));

    let err = client
        .update(
            "Book",
            &client.filter("Book", &Filter::eq("title", "Missing")).unwrap(),
            values! { "pages" => 1 },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_data_error(),
        Some(DataError::RecordNotFound { .. })
    ));

    let by_id = client
        .filter("Author", &Filter::eq("id", twain.get("id").cloned().unwrap()))
        .unwrap();
    client.delete("Author", &by_id).await.unwrap();
    assert_eq!(client.count("Book", &PredicateNode::always()).await.unwrap(), 0);

    std::fs::remove_dir_all(&dir).unwrap();
}
