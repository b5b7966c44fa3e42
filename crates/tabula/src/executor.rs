//! The client handle: CRUD intents in model terms, executed against a store.
//!
//! A [`Client`] validates record values against the resolved schema, fills
//! in write-time defaults, turns each call into [`Operation`]s in physical
//! names and maps the rows that come back into [`Record`]s.

use std::collections::VecDeque;
use std::sync::Arc;

use jiff::Timestamp;
use tabula_schema::{Column, DefaultValue, PhysicalSchema, Table, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{Config, CreateManyMode};
use crate::error::{DataError, Error, QueryError, Result, StoreError};
use crate::filter::{self, Filter, PredicateNode};
use crate::operation::{Operation, OrderTerm, Outcome, Row, SortOrder};
use crate::record::{Record, Values};
use crate::store::{Store, StoreTransaction};

/// Tuning for a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub create_many: CreateManyMode,
    /// Records fetched per round trip by a [`RecordCursor`].
    pub page_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            create_many: CreateManyMode::Transactional,
            page_size: 100,
        }
    }
}

impl From<&Config> for ClientOptions {
    fn from(config: &Config) -> Self {
        Self {
            create_many: config.create_many,
            page_size: config.page_size.max(1),
        }
    }
}

/// Ordering and paging for reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Model fields to order by, most significant first.
    pub order_by: Vec<(String, SortOrder)>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push((field.into(), order));
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(n);
        self
    }
}

/// What `create_many` wrote, and which items failed (best-effort mode only).
#[derive(Debug, Default)]
pub struct CreateManyResult {
    pub created: Vec<Record>,
    /// Failed items by input position.
    pub errors: Vec<(usize, Error)>,
}

/// Explicit handle on a resolved schema and a store.
#[derive(Debug, Clone)]
pub struct Client<S> {
    schema: Arc<PhysicalSchema>,
    store: S,
    options: ClientOptions,
}

impl<S: Store> Client<S> {
    pub fn new(schema: PhysicalSchema, store: S) -> Self {
        Self {
            schema: Arc::new(schema),
            store,
            options: ClientOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn schema(&self) -> &PhysicalSchema {
        &self.schema
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> ClientOptions {
        self.options
    }

    /// Validate a filter against `model` and build its predicate.
    pub fn filter(&self, model: &str, filter: &Filter) -> Result<PredicateNode> {
        Ok(filter::build(&self.schema, model, filter)?)
    }

    fn table(&self, model: &str) -> Result<&Table> {
        self.schema
            .table(model)
            .ok_or_else(|| QueryError::UnknownModel(model.to_string()).into())
    }

    /// The table of `model`, once `predicate` is known to apply to it.
    fn target(&self, model: &str, predicate: &PredicateNode) -> Result<&Table> {
        let table = self.table(model)?;
        predicate.check(table)?;
        Ok(table)
    }

    /// Insert one record and return it as stored, generated keys included.
    pub async fn create(&self, model: &str, values: Values) -> Result<Record> {
        let table = self.table(model)?;
        let row = insert_row(table, &values)?;
        let outcome = self
            .run_one(Operation::Insert {
                table: table.name.clone(),
                row,
            })
            .await?;
        let record = first_record(table, outcome)?;
        debug!(model, "created record");
        Ok(record)
    }

    /// Insert several records.
    ///
    /// In [`CreateManyMode::Transactional`] (the default) every item is
    /// validated before anything is written and all inserts share one
    /// transaction: the first failure rolls everything back and is returned
    /// as [`Error::CreateMany`]. In [`CreateManyMode::BestEffort`] each item
    /// is created on its own and failures are collected.
    pub async fn create_many(
        &self,
        model: &str,
        items: impl IntoIterator<Item = Values>,
    ) -> Result<CreateManyResult> {
        let items: Vec<Values> = items.into_iter().collect();
        match self.options.create_many {
            CreateManyMode::Transactional => self.create_many_atomic(model, items).await,
            CreateManyMode::BestEffort => {
                let mut result = CreateManyResult::default();
                for (index, values) in items.into_iter().enumerate() {
                    match self.create(model, values).await {
                        Ok(record) => result.created.push(record),
                        Err(err) => {
                            debug!(model, index, error = %err, "create_many item failed");
                            result.errors.push((index, err));
                        }
                    }
                }
                debug!(
                    model,
                    created = result.created.len(),
                    failed = result.errors.len(),
                    "created records"
                );
                Ok(result)
            }
        }
    }

    async fn create_many_atomic(&self, model: &str, items: Vec<Values>) -> Result<CreateManyResult> {
        let table = self.table(model)?;
        let rows = items
            .iter()
            .enumerate()
            .map(|(index, values)| {
                insert_row(table, values).map_err(|err| Error::CreateMany {
                    index,
                    source: Box::new(err.into()),
                })
            })
            .collect::<Result<Vec<Row>>>()?;

        let mut tx = self.store.begin().await?;
        let mut created = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            let op = Operation::Insert {
                table: table.name.clone(),
                row,
            };
            let inserted = match tx.run(&op).await {
                Ok(outcome) => first_record(table, outcome),
                Err(err) => Err(err.into()),
            };
            match inserted {
                Ok(record) => created.push(record),
                Err(err) => {
                    rollback(tx).await;
                    return Err(Error::CreateMany {
                        index,
                        source: Box::new(err),
                    });
                }
            }
        }
        tx.commit().await?;

        debug!(model, created = created.len(), "created records");
        Ok(CreateManyResult {
            created,
            errors: Vec::new(),
        })
    }

    /// Lazily read matching records.
    ///
    /// Ordering is checked up front; rows are fetched a page at a time as
    /// the cursor advances. The primary key is always the last sort key, so
    /// the order is total. Each page is read in its own transaction, so rows
    /// written between pages can shift across a page boundary and be skipped
    /// or seen twice.
    pub fn find_many(
        &self,
        model: &str,
        predicate: &PredicateNode,
        options: FindOptions,
    ) -> Result<RecordCursor<'_, S>> {
        let table = self.target(model, predicate)?;
        let order_by = order_terms(table, &options.order_by)?;
        Ok(RecordCursor {
            client: self,
            table,
            filter: predicate.clone(),
            order_by,
            offset: options.skip.unwrap_or(0),
            remaining: options.take,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    /// The first matching record in the given order, if any.
    pub async fn find_first(
        &self,
        model: &str,
        predicate: &PredicateNode,
        options: FindOptions,
    ) -> Result<Option<Record>> {
        let mut cursor = self.find_many(model, predicate, options.take(1))?;
        cursor.next().await
    }

    pub async fn count(&self, model: &str, predicate: &PredicateNode) -> Result<u64> {
        let table = self.target(model, predicate)?;
        let outcome = self
            .run_one(Operation::Count {
                table: table.name.clone(),
                filter: predicate.clone(),
            })
            .await?;
        Ok(outcome.affected)
    }

    /// Update the single record matching `predicate`.
    ///
    /// Fails with [`DataError::RecordNotFound`] or
    /// [`DataError::AmbiguousTarget`] without writing anything.
    pub async fn update(
        &self,
        model: &str,
        predicate: &PredicateNode,
        values: Values,
    ) -> Result<Record> {
        let table = self.target(model, predicate)?;
        let assignments = update_row(table, &values)?;

        let mut tx = self.store.begin().await?;
        let result: Result<Record> = async {
            let (current, key) = lock_single(&mut tx, table, predicate).await?;
            if assignments.is_empty() {
                return Ok(current);
            }
            let outcome = tx
                .run(&Operation::Update {
                    table: table.name.clone(),
                    filter: key,
                    assignments,
                })
                .await?;
            first_record(table, outcome)
        }
        .await;
        let record = finish(tx, result).await?;

        debug!(model, "updated record");
        Ok(record)
    }

    /// Delete the single record matching `predicate` and return it.
    pub async fn delete(&self, model: &str, predicate: &PredicateNode) -> Result<Record> {
        let table = self.target(model, predicate)?;

        let mut tx = self.store.begin().await?;
        let result: Result<Record> = async {
            let (_, key) = lock_single(&mut tx, table, predicate).await?;
            let outcome = tx
                .run(&Operation::Delete {
                    table: table.name.clone(),
                    filter: key,
                })
                .await?;
            first_record(table, outcome)
        }
        .await;
        let record = finish(tx, result).await?;

        debug!(model, "deleted record");
        Ok(record)
    }

    /// Update every matching record; returns how many there were.
    pub async fn update_many(
        &self,
        model: &str,
        predicate: &PredicateNode,
        values: Values,
    ) -> Result<u64> {
        let table = self.target(model, predicate)?;
        let assignments = update_row(table, &values)?;
        if assignments.is_empty() {
            return self.count(model, predicate).await;
        }
        let outcome = self
            .run_one(Operation::Update {
                table: table.name.clone(),
                filter: predicate.clone(),
                assignments,
            })
            .await?;
        debug!(model, count = outcome.affected, "updated records");
        Ok(outcome.affected)
    }

    /// Delete every matching record; returns how many there were.
    pub async fn delete_many(&self, model: &str, predicate: &PredicateNode) -> Result<u64> {
        let table = self.target(model, predicate)?;
        let outcome = self
            .run_one(Operation::Delete {
                table: table.name.clone(),
                filter: predicate.clone(),
            })
            .await?;
        debug!(model, count = outcome.affected, "deleted records");
        Ok(outcome.affected)
    }

    /// Run one operation in its own transaction.
    async fn run_one(&self, op: Operation) -> Result<Outcome> {
        let mut tx = self.store.begin().await?;
        let result = tx.run(&op).await.map_err(Error::from);
        finish(tx, result).await
    }
}

/// Commit on success, roll back on failure.
async fn finish<T, X: StoreTransaction>(tx: X, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            rollback(tx).await;
            Err(err)
        }
    }
}

async fn rollback<X: StoreTransaction>(tx: X) {
    if let Err(err) = tx.rollback().await {
        warn!(error = %err, "rollback failed");
    }
}

/// Lock the one row matching `predicate`; returns it and a predicate on its key.
async fn lock_single<X: StoreTransaction>(
    tx: &mut X,
    table: &Table,
    predicate: &PredicateNode,
) -> Result<(Record, PredicateNode)> {
    let outcome = tx
        .run(&Operation::Select {
            table: table.name.clone(),
            filter: predicate.clone(),
            order_by: Vec::new(),
            limit: Some(2),
            offset: None,
            lock: true,
        })
        .await?;

    let mut rows = outcome.rows;
    if rows.len() != 1 {
        if rows.is_empty() {
            return Err(DataError::RecordNotFound {
                model: table.model.clone(),
            }
            .into());
        }
        let matched = tx
            .run(&Operation::Count {
                table: table.name.clone(),
                filter: predicate.clone(),
            })
            .await?
            .affected;
        return Err(DataError::AmbiguousTarget {
            model: table.model.clone(),
            matched: matched as usize,
        }
        .into());
    }

    let record = Record::from_row(table, rows.remove(0));
    let key = record.key(table);
    let key = if key.is_empty() {
        predicate.clone()
    } else {
        PredicateNode::key(table, key)
    };
    Ok((record, key))
}

fn first_record(table: &Table, outcome: Outcome) -> Result<Record> {
    let row = outcome.rows.into_iter().next().ok_or_else(|| {
        StoreError::Backend(format!("no row returned for `{}`", table.name))
    })?;
    Ok(Record::from_row(table, row))
}

/// Build the insert row for `values`, filling write-time defaults.
///
/// Autoincrement and literal defaults are left to the store.
fn insert_row(table: &Table, values: &Values) -> Result<Row, DataError> {
    check_fields(table, values)?;
    let now = Timestamp::now();

    let mut row = Row::new();
    for column in &table.columns {
        let value = match values.get(&column.field) {
            Some(value) => assigned(table, column, value)?,
            None if column.updated_at => generated(Value::Timestamp(now), column),
            None => match &column.default {
                Some(DefaultValue::Now) => generated(Value::Timestamp(now), column),
                Some(DefaultValue::GeneratedUuid) => generated(Value::Uuid(Uuid::new_v4()), column),
                Some(DefaultValue::Autoincrement | DefaultValue::Literal(_)) => continue,
                None if column.nullable => continue,
                None => {
                    return Err(DataError::MissingField {
                        model: table.model.clone(),
                        field: column.field.clone(),
                    });
                }
            },
        };
        row.insert(column.name.clone(), value);
    }
    Ok(row)
}

/// Build the assignments for `values`; `@updatedAt` columns are refreshed
/// unless set explicitly. No values means no assignments at all.
fn update_row(table: &Table, values: &Values) -> Result<Row, DataError> {
    check_fields(table, values)?;
    if values.is_empty() {
        return Ok(Row::new());
    }
    let now = Timestamp::now();

    let mut row = Row::new();
    for column in &table.columns {
        match values.get(&column.field) {
            Some(value) => {
                row.insert(column.name.clone(), assigned(table, column, value)?);
            }
            None if column.updated_at => {
                row.insert(column.name.clone(), generated(Value::Timestamp(now), column));
            }
            None => {}
        }
    }
    Ok(row)
}

fn check_fields(table: &Table, values: &Values) -> Result<(), DataError> {
    match values
        .keys()
        .find(|field| table.column_for_field(field).is_none())
    {
        Some(field) => Err(DataError::UnknownField {
            model: table.model.clone(),
            field: field.clone(),
        }),
        None => Ok(()),
    }
}

fn assigned(table: &Table, column: &Column, value: &Value) -> Result<Value, DataError> {
    let invalid = |reason: String| DataError::InvalidValue {
        model: table.model.clone(),
        field: column.field.clone(),
        reason,
    };
    if value.is_null() && !column.nullable {
        return Err(invalid("field is not nullable".to_string()));
    }
    value.coerce_to(column.ty).map_err(|err| invalid(err.to_string()))
}

fn generated(value: Value, column: &Column) -> Value {
    match value.coerce_to(column.ty) {
        Ok(value) => value,
        Err(_) => Value::Text(value.to_string()),
    }
}

/// Resolve field ordering to columns and append the primary key.
fn order_terms(table: &Table, order_by: &[(String, SortOrder)]) -> Result<Vec<OrderTerm>> {
    let mut terms: Vec<OrderTerm> = Vec::with_capacity(order_by.len() + 1);
    for (field, order) in order_by {
        let column = table.column_for_field(field).ok_or_else(|| {
            if table.is_relation(field) {
                QueryError::TypeMismatch {
                    model: table.model.clone(),
                    field: field.clone(),
                    reason: "cannot order by a relation field".to_string(),
                }
            } else {
                QueryError::FieldNotFound {
                    model: table.model.clone(),
                    field: field.clone(),
                }
            }
        })?;
        if !column.ty.is_orderable() {
            return Err(QueryError::TypeMismatch {
                model: table.model.clone(),
                field: field.clone(),
                reason: format!("cannot order by a {} field", column.ty),
            }
            .into());
        }
        if !terms.iter().any(|t| t.column == column.name) {
            terms.push(OrderTerm {
                column: column.name.clone(),
                order: *order,
            });
        }
    }

    for column in &table.primary_key.columns {
        if !terms.iter().any(|t| &t.column == column) {
            terms.push(OrderTerm {
                column: column.clone(),
                order: SortOrder::Asc,
            });
        }
    }
    Ok(terms)
}

/// A lazy, read-only sequence of records.
///
/// Each page is read in its own short transaction; nothing is held open
/// between calls to [`next`](Self::next), so a cursor can be dropped at any
/// point.
pub struct RecordCursor<'c, S> {
    client: &'c Client<S>,
    table: &'c Table,
    filter: PredicateNode,
    order_by: Vec<OrderTerm>,
    offset: u64,
    remaining: Option<u64>,
    buffer: VecDeque<Record>,
    exhausted: bool,
}

impl<S: Store> RecordCursor<'_, S> {
    pub async fn next(&mut self) -> Result<Option<Record>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        Ok(self.buffer.pop_front())
    }

    /// Drain the cursor.
    pub async fn try_collect(mut self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let page = self.client.options.page_size.max(1) as u64;
        let limit = self.remaining.map_or(page, |r| r.min(page));
        if limit == 0 {
            self.exhausted = true;
            return Ok(());
        }

        let outcome = self
            .client
            .run_one(Operation::Select {
                table: self.table.name.clone(),
                filter: self.filter.clone(),
                order_by: self.order_by.clone(),
                limit: Some(limit),
                offset: (self.offset > 0).then_some(self.offset),
                lock: false,
            })
            .await?;

        let fetched = outcome.rows.len() as u64;
        debug!(model = %self.table.model, offset = self.offset, fetched, "fetched page");
        self.offset += fetched;
        if let Some(remaining) = &mut self.remaining {
            *remaining -= fetched.min(*remaining);
        }
        if fetched < limit {
            self.exhausted = true;
        }
        self.buffer.extend(
            outcome
                .rows
                .into_iter()
                .map(|row| Record::from_row(self.table, row)),
        );
        Ok(())
    }
}
