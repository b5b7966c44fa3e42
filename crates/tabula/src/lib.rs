//! Declarative Postgres ORM core.
//!
//! Models are described once through [`Schema`], resolved into a
//! [`PhysicalSchema`] and then used for two things:
//!
//! - **Migrations**: [`plan`] diffs the last persisted snapshot against the
//!   current schema; [`MigrationLog`] writes the plan to disk and
//!   [`Migrator`] applies pending migrations to a store.
//! - **Queries**: a [`Client`] validates [`Filter`]s and record values
//!   against the schema and executes CRUD calls against a [`Store`].
//!
//! ```ignore
//! let mut schema = Schema::new();
//! schema.define_model("Author", vec![
//!     Field::scalar("id", ScalarType::BigInt).id().default(DefaultValue::Autoincrement),
//!     Field::scalar("name", ScalarType::Text),
//! ], vec![])?;
//! let schema = schema.resolve()?;
//!
//! let client = Client::new(schema, MemoryStore::new());
//! let author = client.create("Author", values! { "name" => "Mark Twain" }).await?;
//! ```
//!
//! Two stores ship with the crate: [`PgStore`] on a `deadpool-postgres`
//! pool, and [`MemoryStore`] for tests and embedders that want a scratch
//! database.

pub mod config;
mod error;
mod executor;
pub mod filter;
pub mod migrations;
mod operation;
pub mod plan;
mod record;
pub mod store;

pub use config::{Config, CreateManyMode};
pub use error::{DataError, Error, QueryError, Result, StoreError};
pub use executor::{Client, ClientOptions, CreateManyResult, FindOptions, RecordCursor};
pub use filter::{CompareOp, Filter, PredicateNode};
pub use migrations::{LogError, MigrationFile, MigrationLog, MigrationStatus, Migrator};
pub use operation::{Operation, OrderTerm, Outcome, Row, SortOrder};
pub use plan::{MigrationPlan, MigrationStep, PlanError, StepKind, plan};
pub use record::{Record, Values};
pub use store::{AppliedMigration, MemoryStore, PgStore, Store, StoreTransaction};

pub use tabula_schema::{
    Attribute, Cardinality, Column, DefaultValue, Field, FieldKind, ForeignKey, Index, Model,
    ModelConstraint, PhysicalSchema, PrimaryKey, ReferentialAction, Relation, ScalarType, Schema,
    SchemaError, Table, UniqueConstraint, Value, ValueError,
};
