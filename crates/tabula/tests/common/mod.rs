//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Once;

use tabula::{
    Client, DefaultValue, Field, MemoryStore, Operation, PhysicalSchema, ReferentialAction,
    Relation, ScalarType, Schema, Store, StoreTransaction, plan,
};

/// Install a test-writer subscriber once; `RUST_LOG` picks the level.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// `Author` 1-n `Book`, deleting an author deletes their books.
pub fn library() -> Schema {
    let mut schema = Schema::new();
    schema
        .define_model(
            "Author",
            vec![
                Field::scalar("id", ScalarType::BigInt)
                    .id()
                    .default(DefaultValue::Autoincrement),
                Field::scalar("name", ScalarType::Text),
                Field::scalar("email", ScalarType::Text).unique(),
                Field::relation("books", Relation::one_to_many("Book")),
            ],
            vec![],
        )
        .unwrap();
    schema
        .define_model(
            "Book",
            vec![
                Field::scalar("id", ScalarType::Int)
                    .id()
                    .default(DefaultValue::Autoincrement),
                Field::scalar("title", ScalarType::Text),
                Field::scalar("publishedYear", ScalarType::Int).map("published_year"),
                Field::scalar("pages", ScalarType::Int),
                Field::scalar("authorId", ScalarType::BigInt)
                    .map("author_id")
                    .nullable(),
                Field::relation(
                    "author",
                    Relation::one_to_many("Author")
                        .fields(["authorId"])
                        .references(["id"])
                        .on_delete(ReferentialAction::Cascade),
                ),
                Field::scalar("createdAt", ScalarType::Timestamp).default(DefaultValue::Now),
                Field::scalar("updatedAt", ScalarType::Timestamp).updated_at(),
            ],
            vec![],
        )
        .unwrap();
    schema
}

pub fn library_schema() -> PhysicalSchema {
    library().resolve().unwrap()
}

/// A memory store with the library tables created.
pub async fn migrated_store(schema: &PhysicalSchema) -> MemoryStore {
    let store = MemoryStore::new();
    let mut tx = store.begin().await.unwrap();
    for step in plan(None, schema).steps {
        tx.run(&Operation::Migrate(step)).await.unwrap();
    }
    tx.commit().await.unwrap();
    store
}

pub async fn library_client() -> Client<MemoryStore> {
    init_tracing();
    let schema = library_schema();
    let store = migrated_store(&schema).await;
    Client::new(schema, store)
}

/// A fresh, not yet existing directory under the system temp dir.
pub fn scratch_dir(name: &str) -> camino::Utf8PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "tabula-{name}-{}",
        uuid::Uuid::new_v4().simple()
    ));
    camino::Utf8PathBuf::from_path_buf(dir).unwrap()
}

/// `schema` with `field` appended to `model`.
pub fn with_field(schema: &Schema, model: &str, field: Field) -> Schema {
    let mut next = Schema::new();
    for existing in schema.models() {
        let mut existing = existing.clone();
        if existing.name == model {
            existing.fields.push(field.clone());
        }
        next.add_model(existing).unwrap();
    }
    next
}
