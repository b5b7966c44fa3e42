//! An in-process store.
//!
//! Holds the schema and the rows of every table behind one async mutex. A
//! transaction owns the lock and works on a private copy of the state, which
//! replaces the shared state on commit and is thrown away otherwise.
//!
//! Constraint enforcement mirrors Postgres: NOT NULL, primary keys and
//! unique constraints (NULLs never collide), foreign keys with their
//! `ON DELETE` action, identity sequences, and `now()` / `gen_random_uuid()`
//! column defaults.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use jiff::Timestamp;
use tabula_schema::{Column, DefaultValue, PhysicalSchema, ReferentialAction, Table, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{AppliedMigration, Store, StoreTransaction};
use crate::error::StoreError;
use crate::filter::{CompareOp, PredicateNode};
use crate::operation::{Operation, OrderTerm, Outcome, Row, SortOrder};
use crate::plan::{ApplyStep, MigrationStep, StepKind};

/// A transactional store that lives in memory.
///
/// Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows of a table, by physical name, in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        let state = self.state.lock().await;
        state
            .tables
            .get(table)
            .map(|data| data.rows.clone())
            .unwrap_or_default()
    }
}

impl Store for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTransaction { guard, working })
    }

    async fn introspect(&self) -> Result<PhysicalSchema, StoreError> {
        Ok(self.state.lock().await.schema.clone())
    }

    async fn applied_migrations(&self) -> Result<Vec<AppliedMigration>, StoreError> {
        Ok(self.state.lock().await.applied.clone())
    }
}

/// A transaction on a [`MemoryStore`]. Holds the store lock until it ends.
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl StoreTransaction for MemoryTransaction {
    async fn run(&mut self, op: &Operation) -> Result<Outcome, StoreError> {
        match op {
            Operation::Select { .. } | Operation::Count { .. } => self.working.read(op),
            _ => {
                // statements are atomic: work on a copy and keep it on success
                let mut next = self.working.clone();
                let outcome = next.write(op)?;
                self.working = next;
                Ok(outcome)
            }
        }
    }

    async fn commit(self) -> Result<(), StoreError> {
        let MemoryTransaction { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    schema: PhysicalSchema,
    /// Keyed by physical table name.
    tables: HashMap<String, TableData>,
    applied: Vec<AppliedMigration>,
}

#[derive(Debug, Clone, Default)]
struct TableData {
    rows: Vec<Row>,
    /// Last value handed out, per identity column.
    sequences: HashMap<String, i64>,
}

impl MemoryState {
    fn table(&self, name: &str) -> Result<&Table, StoreError> {
        self.schema
            .table_by_name(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }

    fn rows(&self, table: &str) -> &[Row] {
        self.tables
            .get(table)
            .map(|data| data.rows.as_slice())
            .unwrap_or_default()
    }

    fn data_mut(&mut self, table: &str) -> &mut TableData {
        self.tables.entry(table.to_string()).or_default()
    }

    fn read(&self, op: &Operation) -> Result<Outcome, StoreError> {
        match op {
            Operation::Select {
                table,
                filter,
                order_by,
                limit,
                offset,
                lock: _,
            } => {
                self.table(table)?;
                let mut rows: Vec<Row> = self
                    .rows(table)
                    .iter()
                    .filter(|row| matches(row, filter))
                    .cloned()
                    .collect();
                sort_rows(&mut rows, order_by);
                let offset = offset.unwrap_or(0) as usize;
                let limit = limit.map_or(usize::MAX, |n| n as usize);
                let rows = rows.into_iter().skip(offset).take(limit).collect();
                Ok(Outcome::rows(rows))
            }
            Operation::Count { table, filter } => {
                self.table(table)?;
                let count = self.rows(table).iter().filter(|row| matches(row, filter)).count();
                Ok(Outcome::affected(count as u64))
            }
            other => Err(StoreError::Backend(format!("`{}` is not a read", other.kind()))),
        }
    }

    fn write(&mut self, op: &Operation) -> Result<Outcome, StoreError> {
        match op {
            Operation::Select { .. } | Operation::Count { .. } => self.read(op),
            Operation::Insert { table, row } => self.insert(table, row),
            Operation::Update {
                table,
                filter,
                assignments,
            } => self.update(table, filter, assignments),
            Operation::Delete { table, filter } => self.delete(table, filter),
            Operation::Migrate(step) => self.migrate(step),
            Operation::RecordMigration { version, name } => {
                if self.applied.iter().any(|m| &m.version == version) {
                    return Err(StoreError::ConstraintViolation {
                        constraint: "_tabula_migrations_pkey".to_string(),
                        message: format!("migration {version} is already recorded"),
                    });
                }
                self.applied.push(AppliedMigration {
                    version: version.clone(),
                    name: name.clone(),
                    applied_at: Timestamp::now(),
                });
                Ok(Outcome::affected(1))
            }
        }
    }

    fn insert(&mut self, table_name: &str, row: &Row) -> Result<Outcome, StoreError> {
        let table = self.table(table_name)?.clone();
        check_columns(&table, row.keys())?;

        let mut stored = Row::new();
        for column in &table.columns {
            let value = match row.get(&column.name) {
                Some(value) => coerce(&table, column, value)?,
                None => self.generate(&table.name, column)?,
            };
            stored.insert(column.name.clone(), value);
        }

        self.data_mut(table_name).rows.push(stored.clone());
        self.check(table_name)?;
        Ok(Outcome::rows(vec![stored]))
    }

    fn update(
        &mut self,
        table_name: &str,
        filter: &PredicateNode,
        assignments: &Row,
    ) -> Result<Outcome, StoreError> {
        let table = self.table(table_name)?.clone();
        check_columns(&table, assignments.keys())?;

        let mut values = Row::new();
        for (name, value) in assignments {
            if let Some(column) = table.column(name) {
                values.insert(name.clone(), coerce(&table, column, value)?);
            }
        }

        let mut updated = Vec::new();
        for row in &mut self.data_mut(table_name).rows {
            if matches(row, filter) {
                for (name, value) in &values {
                    row.insert(name.clone(), value.clone());
                }
                updated.push(row.clone());
            }
        }

        self.check(table_name)?;
        Ok(Outcome::rows(updated))
    }

    fn delete(&mut self, table_name: &str, filter: &PredicateNode) -> Result<Outcome, StoreError> {
        self.table(table_name)?;
        let data = self.data_mut(table_name);
        let (deleted, kept): (Vec<Row>, Vec<Row>) =
            std::mem::take(&mut data.rows).into_iter().partition(|row| matches(row, filter));
        data.rows = kept;

        if !deleted.is_empty() {
            self.enforce_references(table_name)?;
        }
        Ok(Outcome::rows(deleted))
    }

    /// Apply the `ON DELETE` action of every foreign key that points at
    /// `target`, cascading as far as needed.
    fn enforce_references(&mut self, target: &str) -> Result<(), StoreError> {
        let referencing: Vec<(String, tabula_schema::ForeignKey)> = self
            .schema
            .iter_tables()
            .flat_map(|t| {
                t.foreign_keys
                    .iter()
                    .filter(|fk| fk.references_table == target)
                    .map(|fk| (t.name.clone(), fk.clone()))
            })
            .collect();

        for (child, fk) in referencing {
            let existing = key_set(self.rows(target), &fk.references_columns);
            let orphaned = |row: &Row| {
                key_of(row, &fk.columns).is_some_and(|key| !existing.contains(&key))
            };

            match fk.on_delete {
                ReferentialAction::NoAction | ReferentialAction::Restrict => {
                    if self.rows(&child).iter().any(orphaned) {
                        return Err(StoreError::ConstraintViolation {
                            constraint: fk.name.clone(),
                            message: format!(
                                "rows of `{target}` are still referenced from `{child}`"
                            ),
                        });
                    }
                }
                ReferentialAction::Cascade => {
                    let data = self.data_mut(&child);
                    let before = data.rows.len();
                    data.rows.retain(|row| !orphaned(row));
                    if data.rows.len() != before {
                        self.enforce_references(&child)?;
                    }
                }
                ReferentialAction::SetNull => {
                    for row in &mut self.data_mut(&child).rows {
                        if orphaned(row) {
                            for column in &fk.columns {
                                row.insert(column.clone(), Value::Null);
                            }
                        }
                    }
                    self.check(&child)?;
                }
            }
        }
        Ok(())
    }

    fn migrate(&mut self, step: &MigrationStep) -> Result<Outcome, StoreError> {
        self.schema
            .apply_step(step)
            .map_err(|err| StoreError::Backend(err.to_string()))?;

        match &step.kind {
            StepKind::AddTable { table } => {
                self.tables.insert(table.name.clone(), TableData::default());
            }
            StepKind::DropTable { table } => {
                self.tables.remove(table);
            }
            StepKind::AddColumn { table, column } => {
                let count = self.rows(table).len();
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(self.generate(table, column)?);
                }
                for (row, value) in self.data_mut(table).rows.iter_mut().zip(values) {
                    row.insert(column.name.clone(), value);
                }
            }
            StepKind::DropColumn { table, column } => {
                for row in &mut self.data_mut(table).rows {
                    row.shift_remove(column);
                }
            }
            StepKind::AlterColumn { table, to, .. } => {
                let def = self.table(table)?.clone();
                for row in &mut self.data_mut(table).rows {
                    let value = row.get(&to.name).cloned().unwrap_or(Value::Null);
                    let value = value.coerce_to(to.ty).map_err(|err| {
                        StoreError::Backend(format!(
                            "cannot convert `{}.{}`: {err}",
                            def.name, to.name
                        ))
                    })?;
                    row.insert(to.name.clone(), value);
                }
            }
            StepKind::AddConstraint { .. } | StepKind::DropConstraint { .. } => {}
        }

        if !matches!(step.kind, StepKind::DropTable { .. }) {
            self.check(step.kind.table())?;
        }
        Ok(Outcome::affected(0))
    }

    /// Value for a column the row leaves out.
    fn generate(&mut self, table: &str, column: &Column) -> Result<Value, StoreError> {
        let value = match &column.default {
            None => Value::Null,
            Some(DefaultValue::Autoincrement) => {
                let next = {
                    let seq = self
                        .data_mut(table)
                        .sequences
                        .entry(column.name.clone())
                        .or_insert(0);
                    *seq += 1;
                    *seq
                };
                Value::BigInt(next).coerce_to(column.ty).map_err(|_| {
                    StoreError::Backend(format!(
                        "sequence for `{table}.{}` is exhausted",
                        column.name
                    ))
                })?
            }
            Some(DefaultValue::Now) => generated(Value::Timestamp(Timestamp::now()), column),
            Some(DefaultValue::GeneratedUuid) => generated(Value::Uuid(Uuid::new_v4()), column),
            Some(DefaultValue::Literal(value)) => generated(value.clone(), column),
        };
        Ok(value)
    }

    /// Check the constraints of `table_name` and of every table referencing it.
    fn check(&self, table_name: &str) -> Result<(), StoreError> {
        let table = self.table(table_name)?;
        self.check_table(table)?;
        for other in self.schema.iter_tables() {
            if other.name != table.name
                && other
                    .foreign_keys
                    .iter()
                    .any(|fk| fk.references_table == table.name)
            {
                self.check_table(other)?;
            }
        }
        Ok(())
    }

    fn check_table(&self, table: &Table) -> Result<(), StoreError> {
        let rows = self.rows(&table.name);

        for column in table.columns.iter().filter(|c| !c.nullable) {
            if rows
                .iter()
                .any(|row| row.get(&column.name).is_none_or(Value::is_null))
            {
                return Err(StoreError::ConstraintViolation {
                    constraint: format!("{} NOT NULL", column.name),
                    message: format!(
                        "null value in column \"{}\" of relation \"{}\"",
                        column.name, table.name
                    ),
                });
            }
        }

        let unique_sets = std::iter::once((&table.primary_key.name, &table.primary_key.columns))
            .filter(|(_, columns)| !columns.is_empty())
            .chain(table.uniques.iter().map(|u| (&u.name, &u.columns)));
        for (name, columns) in unique_sets {
            let mut seen = HashSet::new();
            for key in rows.iter().filter_map(|row| key_of(row, columns)) {
                if !seen.insert(key.clone()) {
                    return Err(StoreError::ConstraintViolation {
                        constraint: name.clone(),
                        message: format!("duplicate key value ({key}) in \"{}\"", table.name),
                    });
                }
            }
        }

        for fk in &table.foreign_keys {
            let existing = key_set(self.rows(&fk.references_table), &fk.references_columns);
            if let Some(key) = rows
                .iter()
                .filter_map(|row| key_of(row, &fk.columns))
                .find(|key| !existing.contains(key))
            {
                return Err(StoreError::ConstraintViolation {
                    constraint: fk.name.clone(),
                    message: format!(
                        "key ({key}) is not present in table \"{}\"",
                        fk.references_table
                    ),
                });
            }
        }

        Ok(())
    }
}

fn check_columns<'a>(
    table: &Table,
    mut names: impl Iterator<Item = &'a String>,
) -> Result<(), StoreError> {
    match names.find(|name| table.column(name).is_none()) {
        Some(name) => Err(StoreError::UnknownColumn {
            table: table.name.clone(),
            column: name.clone(),
        }),
        None => Ok(()),
    }
}

fn coerce(table: &Table, column: &Column, value: &Value) -> Result<Value, StoreError> {
    value.coerce_to(column.ty).map_err(|err| {
        StoreError::Backend(format!(
            "invalid input for `{}.{}`: {err}",
            table.name, column.name
        ))
    })
}

/// A generated default, converted to the column type when it differs.
fn generated(value: Value, column: &Column) -> Value {
    match value.coerce_to(column.ty) {
        Ok(value) => value,
        Err(_) => Value::Text(match value {
            Value::Text(s) => s,
            other => other.to_string(),
        }),
    }
}

/// Comparable key of the given columns, `None` when any of them is NULL.
fn key_of(row: &Row, columns: &[String]) -> Option<String> {
    let mut parts = Vec::with_capacity(columns.len());
    for column in columns {
        match row.get(column) {
            None | Some(Value::Null) => return None,
            Some(value) => parts.push(key_part(value)),
        }
    }
    Some(parts.join(", "))
}

/// Integers of both widths share a key so foreign keys match across them.
fn key_part(value: &Value) -> String {
    match value.as_i64() {
        Some(n) => n.to_string(),
        None => value.to_string(),
    }
}

fn key_set(rows: &[Row], columns: &[String]) -> HashSet<String> {
    rows.iter().filter_map(|row| key_of(row, columns)).collect()
}

fn matches(row: &Row, predicate: &PredicateNode) -> bool {
    eval(row, predicate) == Some(true)
}

/// Three-valued evaluation: `None` is SQL's UNKNOWN.
fn eval(row: &Row, node: &PredicateNode) -> Option<bool> {
    match node {
        PredicateNode::Comparison(cmp) => {
            let actual = row.get(&cmp.column).unwrap_or(&Value::Null);
            compare(actual, cmp.op, &cmp.value)
        }
        PredicateNode::And(children) => {
            let mut result = Some(true);
            for child in children {
                match eval(row, child) {
                    Some(false) => return Some(false),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        PredicateNode::Or(children) => {
            let mut result = Some(false);
            for child in children {
                match eval(row, child) {
                    Some(true) => return Some(true),
                    None => result = None,
                    Some(false) => {}
                }
            }
            result
        }
        PredicateNode::Not(inner) => eval(row, inner).map(|b| !b),
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> Option<bool> {
    match (op, expected) {
        (CompareOp::Eq, Value::Null) => return Some(actual.is_null()),
        (CompareOp::Ne, Value::Null) => return Some(!actual.is_null()),
        _ => {}
    }
    if actual.is_null() {
        return None;
    }

    match op {
        CompareOp::Eq => Some(same(actual, expected)),
        CompareOp::Ne => Some(!same(actual, expected)),
        CompareOp::Lt => actual.compare(expected).map(Ordering::is_lt),
        CompareOp::Lte => actual.compare(expected).map(Ordering::is_le),
        CompareOp::Gt => actual.compare(expected).map(Ordering::is_gt),
        CompareOp::Gte => actual.compare(expected).map(Ordering::is_ge),
        CompareOp::Contains => match (actual, expected) {
            (Value::Text(a), Value::Text(b)) => Some(a.contains(b.as_str())),
            _ => None,
        },
        CompareOp::StartsWith => match (actual, expected) {
            (Value::Text(a), Value::Text(b)) => Some(a.starts_with(b.as_str())),
            _ => None,
        },
    }
}

fn same(a: &Value, b: &Value) -> bool {
    a.compare(b).map_or_else(|| a == b, Ordering::is_eq)
}

/// Postgres ordering: NULLs sort as larger than every value, so they come
/// last ascending and first descending.
fn sort_rows(rows: &mut [Row], order_by: &[OrderTerm]) {
    rows.sort_by(|a, b| {
        for term in order_by {
            let x = a.get(&term.column).unwrap_or(&Value::Null);
            let y = b.get(&term.column).unwrap_or(&Value::Null);
            let ord = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => x.compare(y).unwrap_or(Ordering::Equal),
            };
            let ord = match term.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Comparison;
    use crate::plan::plan;
    use tabula_schema::{Field, Relation, ScalarType, Schema};

    fn schema() -> PhysicalSchema {
        let mut schema = Schema::new();
        schema
            .define_model(
                "Author",
                vec![
                    Field::scalar("id", ScalarType::Int)
                        .id()
                        .default(DefaultValue::Autoincrement),
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
                    Field::scalar("authorId", ScalarType::Int).nullable(),
                    Field::relation(
                        "author",
                        Relation::one_to_many("Author")
                            .fields(["authorId"])
                            .references(["id"])
                            .on_delete(ReferentialAction::Cascade),
                    ),
                ],
                vec![],
            )
            .unwrap();
        schema.resolve().unwrap()
    }

    async fn migrated() -> MemoryStore {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        for step in plan(None, &schema()).steps {
            tx.run(&Operation::Migrate(step)).await.unwrap();
        }
        tx.commit().await.unwrap();
        store
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn eq(column: &str, value: impl Into<Value>) -> PredicateNode {
        PredicateNode::Comparison(Comparison {
            field: column.to_string(),
            column: column.to_string(),
            op: CompareOp::Eq,
            value: value.into(),
        })
    }

    fn insert(table: &str, pairs: &[(&str, Value)]) -> Operation {
        Operation::Insert {
            table: table.to_string(),
            row: row(pairs),
        }
    }

    #[tokio::test]
    async fn insert_generates_identity_values() {
        let store = migrated().await;
        let mut tx = store.begin().await.unwrap();
        let first = tx
            .run(&insert("Author", &[("email", "a@x".into())]))
            .await
            .unwrap();
        let second = tx
            .run(&insert("Author", &[("email", "b@x".into())]))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first.rows[0]["id"], Value::Int(1));
        assert_eq!(second.rows[0]["id"], Value::Int(2));
        assert_eq!(store.rows("Author").await.len(), 2);
    }

    #[tokio::test]
    async fn unique_violation_leaves_transaction_usable() {
        let store = migrated().await;
        let mut tx = store.begin().await.unwrap();
        tx.run(&insert("Author", &[("email", "a@x".into())]))
            .await
            .unwrap();
        let err = tx
            .run(&insert("Author", &[("email", "a@x".into())]))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, StoreError::ConstraintViolation { constraint, .. } if constraint == "uq_Author_email"),
            "{err}"
        );
        tx.commit().await.unwrap();
        assert_eq!(store.rows("Author").await.len(), 1);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = migrated().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.run(&insert("Author", &[("email", "a@x".into())]))
                .await
                .unwrap();
        }
        assert!(store.rows("Author").await.is_empty());
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced_and_cascade() {
        let store = migrated().await;
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .run(&insert("Book", &[("title", "Orphan".into()), ("authorId", Value::Int(9))]))
            .await
            .unwrap_err();
        assert!(err.is_constraint_violation());

        tx.run(&insert("Author", &[("email", "a@x".into())]))
            .await
            .unwrap();
        tx.run(&insert("Book", &[("title", "One".into()), ("authorId", Value::Int(1))]))
            .await
            .unwrap();
        tx.run(&insert("Book", &[("title", "Loose".into())]))
            .await
            .unwrap();

        let deleted = tx
            .run(&Operation::Delete {
                table: "Author".to_string(),
                filter: eq("id", 1),
            })
            .await
            .unwrap();
        assert_eq!(deleted.affected, 1);
        tx.commit().await.unwrap();

        let books = store.rows("Book").await;
        assert_eq!(books.len(), 1);
        assert_eq!(books[0]["title"], Value::from("Loose"));
    }

    #[tokio::test]
    async fn select_sorts_nulls_like_postgres() {
        let store = migrated().await;
        let mut tx = store.begin().await.unwrap();
        tx.run(&insert("Author", &[("email", "a@x".into())]))
            .await
            .unwrap();
        for (title, author) in [("b", Value::Int(1)), ("a", Value::Null), ("c", Value::Int(1))] {
            tx.run(&insert("Book", &[("title", title.into()), ("authorId", author)]))
                .await
                .unwrap();
        }

        let select = |order| Operation::Select {
            table: "Book".to_string(),
            filter: PredicateNode::always(),
            order_by: vec![
                OrderTerm {
                    column: "authorId".to_string(),
                    order,
                },
                OrderTerm {
                    column: "title".to_string(),
                    order: SortOrder::Asc,
                },
            ],
            limit: None,
            offset: None,
            lock: false,
        };
        let titles = |outcome: Outcome| -> Vec<Value> {
            outcome.rows.into_iter().map(|r| r["title"].clone()).collect()
        };

        let asc = tx.run(&select(SortOrder::Asc)).await.unwrap();
        assert_eq!(titles(asc), vec!["b".into(), "c".into(), Value::from("a")]);
        let desc = tx.run(&select(SortOrder::Desc)).await.unwrap();
        assert_eq!(titles(desc), vec![Value::from("a"), "b".into(), "c".into()]);
    }

    #[test]
    fn comparisons_with_null_are_unknown() {
        let r = row(&[("authorId", Value::Null)]);
        let gt = PredicateNode::Comparison(Comparison {
            field: "authorId".to_string(),
            column: "authorId".to_string(),
            op: CompareOp::Gt,
            value: Value::Int(1),
        });
        assert_eq!(eval(&r, &gt), None);
        assert_eq!(eval(&r, &PredicateNode::Not(Box::new(gt.clone()))), None);
        assert!(matches(&r, &eq("authorId", Value::Null)));
        assert!(matches(&r, &PredicateNode::always()));
        assert!(!matches(&r, &PredicateNode::never()));
    }

    #[tokio::test]
    async fn adding_required_column_to_populated_table_fails() {
        let store = migrated().await;
        let mut tx = store.begin().await.unwrap();
        tx.run(&insert("Author", &[("email", "a@x".into())]))
            .await
            .unwrap();
        let step = MigrationStep {
            rank: 0,
            kind: StepKind::AddColumn {
                table: "Author".to_string(),
                column: Column {
                    field: "name".to_string(),
                    name: "name".to_string(),
                    ty: ScalarType::Text,
                    nullable: false,
                    default: None,
                    updated_at: false,
                },
            },
            destructive: false,
            requires_backfill: true,
        };
        let err = tx.run(&Operation::Migrate(step)).await.unwrap_err();
        assert!(err.is_constraint_violation(), "{err}");
    }
}
