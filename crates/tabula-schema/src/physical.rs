//! The resolved, physical form of a schema.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{DefaultValue, ReferentialAction, ScalarType};

/// A database column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Field this column stores.
    pub field: String,
    /// Column name
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ScalarType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    /// Set to the current time on every write. Not a database-level property.
    #[serde(default)]
    pub updated_at: bool,
}

impl Column {
    /// Whether an insert may omit this column.
    pub fn is_optional_on_insert(&self) -> bool {
        self.nullable || self.default.is_some() || self.updated_at
    }
}

/// A primary key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub name: String,
    pub columns: Vec<String>,
}

/// A unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: String,
    pub columns: Vec<String>,
}

/// A non-unique index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    /// Column(s) in this table
    pub columns: Vec<String>,
    /// Referenced table (physical name)
    pub references_table: String,
    /// Referenced column(s)
    pub references_columns: Vec<String>,
    #[serde(default)]
    pub on_delete: ReferentialAction,
}

/// A database table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Model this table was resolved from.
    pub model: String,
    /// Table name
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: PrimaryKey,
    #[serde(default)]
    pub uniques: Vec<UniqueConstraint>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    /// Relation fields of the model. They have no column.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<String>,
}

impl Table {
    /// Look up a column by column name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column by the field it stores.
    pub fn column_for_field(&self, field: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.field == field)
    }

    pub fn is_relation(&self, field: &str) -> bool {
        self.relations.iter().any(|r| r == field)
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.primary_key
            .columns
            .iter()
            .filter_map(|name| self.column(name))
    }

    /// Whether `columns` are exactly covered by the primary key or a unique constraint.
    pub fn is_unique_set(&self, columns: &[String]) -> bool {
        let same = |other: &[String]| {
            other.len() == columns.len() && columns.iter().all(|c| other.contains(c))
        };
        same(&self.primary_key.columns) || self.uniques.iter().any(|u| same(&u.columns))
    }
}

/// A complete resolved schema: tables keyed by model name, in declaration order.
///
/// Immutable once produced; editing the schema produces a new snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalSchema {
    pub tables: IndexMap<String, Table>,
}

impl PhysicalSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a table by model name.
    pub fn table(&self, model: &str) -> Option<&Table> {
        self.tables.get(model)
    }

    /// Get a table by physical name.
    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables.values().find(|t| t.name == name)
    }

    pub fn table_by_name_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.values_mut().find(|t| t.name == name)
    }

    /// Iterate over all tables.
    pub fn iter_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Structural equality as a database would see it.
    ///
    /// Ignores model and field names, `updated_at` markers and the order of
    /// tables, columns, constraints and indexes. Postgres only appends
    /// columns, so column position is not something a migration can restore.
    pub fn equivalent(&self, other: &PhysicalSchema) -> bool {
        if self.tables.len() != other.tables.len() {
            return false;
        }
        self.iter_tables().all(|table| {
            other
                .table_by_name(&table.name)
                .is_some_and(|theirs| tables_equivalent(table, theirs))
        })
    }
}

fn tables_equivalent(a: &Table, b: &Table) -> bool {
    let columns_match = a.columns.len() == b.columns.len()
        && a.columns.iter().all(|x| {
            b.column(&x.name).is_some_and(|y| {
                x.ty == y.ty && x.nullable == y.nullable && x.default == y.default
            })
        });

    columns_match
        && a.primary_key == b.primary_key
        && same_items(&a.uniques, &b.uniques)
        && same_items(&a.indexes, &b.indexes)
        && same_items(&a.foreign_keys, &b.foreign_keys)
}

fn same_items<T: PartialEq>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.contains(x))
}
