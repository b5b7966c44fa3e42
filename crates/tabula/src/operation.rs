//! Backend-agnostic operation descriptors.
//!
//! The executor turns every CRUD call and migration step into one or more
//! [`Operation`]s, expressed in physical table and column names. A store
//! only has to know how to run these.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tabula_schema::Value;

use crate::filter::PredicateNode;
use crate::plan::MigrationStep;

/// A row as a store sees it: column name to value.
pub type Row = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// One ORDER BY term, on a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTerm {
    pub column: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Insert one row and return it as stored, generated values included.
    /// Columns missing from `row` take their default, or NULL.
    Insert { table: String, row: Row },

    /// Read matching rows. Nulls sort last ascending and first descending.
    Select {
        table: String,
        filter: PredicateNode,
        order_by: Vec<OrderTerm>,
        limit: Option<u64>,
        offset: Option<u64>,
        /// Lock the selected rows until the transaction ends.
        lock: bool,
    },

    /// Count matching rows; the count is reported as `affected`.
    Count {
        table: String,
        filter: PredicateNode,
    },

    /// Update matching rows and return them after the change.
    Update {
        table: String,
        filter: PredicateNode,
        assignments: Row,
    },

    /// Delete matching rows and return them as they were.
    Delete {
        table: String,
        filter: PredicateNode,
    },

    /// Apply one schema change.
    Migrate(MigrationStep),

    /// Mark a migration as applied.
    RecordMigration { version: String, name: String },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Insert { .. } => "insert",
            Operation::Select { .. } => "select",
            Operation::Count { .. } => "count",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
            Operation::Migrate(_) => "migrate",
            Operation::RecordMigration { .. } => "record_migration",
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            Operation::Insert { table, .. }
            | Operation::Select { table, .. }
            | Operation::Count { table, .. }
            | Operation::Update { table, .. }
            | Operation::Delete { table, .. } => Some(table),
            Operation::Migrate(step) => Some(step.kind.table()),
            Operation::RecordMigration { .. } => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Migrate(step) => write!(f, "migrate: {step}"),
            Operation::RecordMigration { version, .. } => write!(f, "record migration {version}"),
            other => write!(f, "{} {}", other.kind(), other.table().unwrap_or_default()),
        }
    }
}

/// What a store reports back for an operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Returned rows (inserted, selected, updated or deleted).
    pub rows: Vec<Row>,
    /// Rows affected, or the count for [`Operation::Count`].
    pub affected: u64,
}

impl Outcome {
    pub fn rows(rows: Vec<Row>) -> Self {
        Outcome {
            affected: rows.len() as u64,
            rows,
        }
    }

    pub fn affected(affected: u64) -> Self {
        Outcome {
            rows: Vec::new(),
            affected,
        }
    }
}
