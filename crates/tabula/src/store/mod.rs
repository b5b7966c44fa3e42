//! The store seam: everything the executor and migrator need from a database.
//!
//! A [`Store`] hands out transactions; a [`StoreTransaction`] runs
//! [`Operation`]s and is either committed or rolled back. A transaction that
//! is dropped without being committed is rolled back.

use std::future::Future;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tabula_schema::PhysicalSchema;

use crate::error::StoreError;
use crate::operation::{Operation, Outcome};

mod memory;
pub use memory::{MemoryStore, MemoryTransaction};

mod postgres;
pub use postgres::{MIGRATIONS_TABLE, PgStore, PgTransaction};

mod traced;
pub use traced::{TracedObject, TracedPool};

/// A migration the store has recorded as applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub version: String,
    pub name: String,
    pub applied_at: Timestamp,
}

/// A relational store.
pub trait Store: Send + Sync {
    type Transaction: StoreTransaction;

    /// Start a transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, StoreError>> + Send;

    /// Read the schema the store currently holds.
    fn introspect(&self) -> impl Future<Output = Result<PhysicalSchema, StoreError>> + Send;

    /// Migrations recorded as applied, oldest first.
    fn applied_migrations(
        &self,
    ) -> impl Future<Output = Result<Vec<AppliedMigration>, StoreError>> + Send;
}

/// An open transaction on a [`Store`].
pub trait StoreTransaction: Send {
    /// Run one operation. After a failure the only meaningful next step is
    /// [`rollback`](Self::rollback).
    fn run(
        &mut self,
        op: &Operation,
    ) -> impl Future<Output = Result<Outcome, StoreError>> + Send;

    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn rollback(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
