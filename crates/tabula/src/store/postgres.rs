//! PostgreSQL store.
//!
//! Operations are lowered to the `tabula-sql` AST, rendered with numbered
//! parameters and sent through a [`TracedPool`]. Every transaction pins the
//! `search_path` to the configured namespace, so statements use bare table
//! names.

use std::error::Error as StdError;

use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use jiff::Timestamp;
use postgres_types::{FromSql, IsNull, ToSql, Type, to_sql_checked};
use rust_decimal::Decimal;
use tabula_schema::{
    Column, DefaultValue, ForeignKey, Index, PhysicalSchema, PrimaryKey, ReferentialAction,
    ScalarType, Table, UniqueConstraint, Value,
};
use tabula_sql::{
    BinOp, ColumnRef, DeleteStmt, Expr, FromClause, InsertStmt, OrderBy, ParamName, Returning,
    SelectColumn, SelectStmt, Stmt, UpdateStmt, escape_like, quote_ident,
};
use tokio_postgres::NoTls;

use super::traced::{TracedObject, TracedPool};
use super::{AppliedMigration, Store, StoreTransaction};
use crate::config::Config;
use crate::error::StoreError;
use crate::filter::{CompareOp, PredicateNode};
use crate::operation::{Operation, OrderTerm, Outcome, Row, SortOrder};
use crate::plan::step_statements;

/// Bookkeeping table for applied migrations, inside the store's namespace.
pub const MIGRATIONS_TABLE: &str = "_tabula_migrations";

/// A store backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: TracedPool,
    schema: String,
}

impl PgStore {
    /// Wrap an existing pool. Tables live in the `schema` namespace.
    pub fn new(pool: deadpool_postgres::Pool, schema: impl Into<String>) -> Self {
        Self {
            pool: TracedPool::new(pool),
            schema: schema.into(),
        }
    }

    /// Build a pool from configuration and make sure the namespace and the
    /// migration bookkeeping table exist.
    pub async fn connect(config: &Config) -> crate::Result<Self> {
        let (pg_config, schema) = config.connection()?;
        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(config.pool_size)
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let store = Self::new(pool, schema);
        store.prepare().await?;
        tracing::debug!(schema = %store.schema, "connected to postgres");
        Ok(store)
    }

    /// Create the namespace and the bookkeeping table if they are missing.
    pub async fn prepare(&self) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        let schema = quote_ident(&self.schema);
        let table = quote_ident(MIGRATIONS_TABLE);
        let sql = format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};\n\
             CREATE TABLE IF NOT EXISTS {schema}.{table} (\n    \
                 \"version\" TEXT PRIMARY KEY,\n    \
                 \"name\" TEXT NOT NULL,\n    \
                 \"applied_at\" TIMESTAMPTZ NOT NULL DEFAULT NOW()\n\
             )"
        );
        conn.batch_execute(&sql)
            .await
            .map_err(StoreError::from_postgres)
    }

    pub fn pool(&self) -> &TracedPool {
        &self.pool
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }
}

impl Store for PgStore {
    type Transaction = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction, StoreError> {
        let conn = self.pool.get().await?;
        let sql = format!(
            "BEGIN; SET LOCAL search_path TO {}",
            quote_ident(&self.schema)
        );
        if let Err(err) = conn.batch_execute(&sql).await {
            conn.detach();
            return Err(StoreError::from_postgres(err));
        }
        Ok(PgTransaction { conn: Some(conn) })
    }

    async fn introspect(&self) -> Result<PhysicalSchema, StoreError> {
        let conn = self.pool.get().await?;
        introspect::schema(&conn, &self.schema).await
    }

    async fn applied_migrations(&self) -> Result<Vec<AppliedMigration>, StoreError> {
        let conn = self.pool.get().await?;
        let sql = format!(
            "SELECT \"version\", \"name\", \"applied_at\" FROM {}.{} ORDER BY \"version\"",
            quote_ident(&self.schema),
            quote_ident(MIGRATIONS_TABLE)
        );
        let rows = conn
            .query(&sql, &[])
            .await
            .map_err(StoreError::from_postgres)?;
        rows.iter()
            .map(|row| -> Result<AppliedMigration, tokio_postgres::Error> {
                Ok(AppliedMigration {
                    version: row.try_get(0)?,
                    name: row.try_get(1)?,
                    applied_at: row.try_get(2)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from_postgres)
    }
}

/// An open Postgres transaction on a pooled connection.
///
/// Dropping it without [`commit`](StoreTransaction::commit) or
/// [`rollback`](StoreTransaction::rollback) closes the connection instead of
/// returning it to the pool; the server then aborts the transaction.
pub struct PgTransaction {
    conn: Option<TracedObject>,
}

impl PgTransaction {
    fn conn(&self) -> Result<&TracedObject, StoreError> {
        self.conn
            .as_ref()
            .ok_or_else(|| StoreError::Backend("transaction already finished".to_string()))
    }

    async fn finish(&mut self, sql: &str) -> Result<(), StoreError> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| StoreError::Backend("transaction already finished".to_string()))?;
        match conn.batch_execute(sql).await {
            Ok(()) => Ok(()),
            Err(err) => {
                conn.detach();
                Err(StoreError::from_postgres(err))
            }
        }
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::debug!("transaction dropped before it ended, closing its connection");
            conn.detach();
        }
    }
}

impl StoreTransaction for PgTransaction {
    async fn run(&mut self, op: &Operation) -> Result<Outcome, StoreError> {
        let conn = self.conn()?;

        if let Operation::Migrate(step) = op {
            for stmt in step_statements(&step.kind) {
                let rendered = tabula_sql::render(&stmt);
                conn.execute(&rendered.sql, &[])
                    .await
                    .map_err(StoreError::from_postgres)?;
            }
            return Ok(Outcome::default());
        }

        let Some((stmt, binder)) = lower(op) else {
            return Ok(Outcome::default());
        };
        let rendered = tabula_sql::render(&stmt);
        let params = binder.params(&rendered.params)?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();

        if let Operation::RecordMigration { .. } = op {
            let affected = conn
                .execute(&rendered.sql, &refs)
                .await
                .map_err(StoreError::from_postgres)?;
            return Ok(Outcome::affected(affected));
        }

        let rows = conn
            .query(&rendered.sql, &refs)
            .await
            .map_err(StoreError::from_postgres)?;

        if let Operation::Count { .. } = op {
            let count: i64 = match rows.first() {
                Some(row) => row.try_get(0).map_err(StoreError::from_postgres)?,
                None => 0,
            };
            return Ok(Outcome::affected(count as u64));
        }

        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Outcome::rows(rows))
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.finish("COMMIT").await
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.finish("ROLLBACK").await
    }
}

/// Values bound to a statement, named `p1`, `p2`, ... in binding order.
#[derive(Debug, Default)]
struct Binder {
    values: Vec<Value>,
}

impl Binder {
    fn bind(&mut self, value: &Value) -> Expr {
        self.values.push(value.clone());
        Expr::Param(format!("p{}", self.values.len()))
    }

    /// Bound values in placeholder order.
    fn params(&self, names: &[ParamName]) -> Result<Vec<SqlParam<'_>>, StoreError> {
        names
            .iter()
            .map(|name| {
                name.strip_prefix('p')
                    .and_then(|n| n.parse::<usize>().ok())
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| self.values.get(i))
                    .map(SqlParam)
                    .ok_or_else(|| StoreError::Backend(format!("unbound parameter `{name}`")))
            })
            .collect()
    }
}

/// Lower a data operation to one statement. Migration steps are lowered by
/// [`step_statements`] instead.
fn lower(op: &Operation) -> Option<(Stmt, Binder)> {
    let mut binder = Binder::default();
    let stmt = match op {
        Operation::Insert { table, row } => {
            let values = row.values().map(|v| binder.bind(v)).collect();
            let mut insert = InsertStmt::new(table.clone())
                .columns(row.keys().cloned())
                .returning(Returning::All);
            if !row.is_empty() {
                insert = insert.row(values);
            }
            Stmt::Insert(insert)
        }
        Operation::Select {
            table,
            filter,
            order_by,
            limit,
            offset,
            lock,
        } => {
            let mut select = SelectStmt::new().from(FromClause::table(table.clone()));
            if let Some(where_) = where_clause(filter, &mut binder) {
                select = select.where_(where_);
            }
            for term in order_by {
                select = select.order_by(order(term));
            }
            if let Some(limit) = limit {
                select = select.limit(Expr::Int(*limit as i64));
            }
            if let Some(offset) = offset {
                select = select.offset(Expr::Int(*offset as i64));
            }
            if *lock {
                select = select.for_update();
            }
            Stmt::Select(select)
        }
        Operation::Count { table, filter } => {
            let mut select = SelectStmt::new()
                .column(SelectColumn::aliased(
                    Expr::FnCall {
                        name: "COUNT".into(),
                        args: vec![Expr::Raw("*".into())],
                    },
                    "count".into(),
                ))
                .from(FromClause::table(table.clone()));
            if let Some(where_) = where_clause(filter, &mut binder) {
                select = select.where_(where_);
            }
            Stmt::Select(select)
        }
        Operation::Update {
            table,
            filter,
            assignments,
        } if assignments.is_empty() => {
            let mut select = SelectStmt::new().from(FromClause::table(table.clone()));
            if let Some(where_) = where_clause(filter, &mut binder) {
                select = select.where_(where_);
            }
            Stmt::Select(select)
        }
        Operation::Update {
            table,
            filter,
            assignments,
        } => {
            let mut update = UpdateStmt::new(table.clone()).returning(Returning::All);
            for (column, value) in assignments {
                let value = binder.bind(value);
                update = update.set(column.clone(), value);
            }
            if let Some(where_) = where_clause(filter, &mut binder) {
                update = update.where_(where_);
            }
            Stmt::Update(update)
        }
        Operation::Delete { table, filter } => {
            let mut delete = DeleteStmt::new(table.clone()).returning(Returning::All);
            if let Some(where_) = where_clause(filter, &mut binder) {
                delete = delete.where_(where_);
            }
            Stmt::Delete(delete)
        }
        Operation::RecordMigration { version, name } => {
            let values = vec![
                binder.bind(&Value::Text(version.clone())),
                binder.bind(&Value::Text(name.clone())),
            ];
            Stmt::Insert(
                InsertStmt::new(MIGRATIONS_TABLE.to_string())
                    .columns(["version".to_string(), "name".to_string()])
                    .row(values),
            )
        }
        Operation::Migrate(_) => return None,
    };
    Some((stmt, binder))
}

fn where_clause(filter: &PredicateNode, binder: &mut Binder) -> Option<Expr> {
    (!filter.is_always()).then(|| predicate_expr(filter, binder))
}

fn predicate_expr(node: &PredicateNode, binder: &mut Binder) -> Expr {
    match node {
        PredicateNode::Comparison(cmp) => {
            let column = Expr::Column(ColumnRef::new(cmp.column.clone()));
            match (cmp.op, &cmp.value) {
                (CompareOp::Eq, Value::Null) => column.is_null(),
                (CompareOp::Ne, Value::Null) => column.is_not_null(),
                (CompareOp::Eq, value) => column.eq(binder.bind(value)),
                (CompareOp::Ne, value) => column.ne(binder.bind(value)),
                (CompareOp::Lt, value) => column.compare(BinOp::Lt, binder.bind(value)),
                (CompareOp::Lte, value) => column.compare(BinOp::Le, binder.bind(value)),
                (CompareOp::Gt, value) => column.compare(BinOp::Gt, binder.bind(value)),
                (CompareOp::Gte, value) => column.compare(BinOp::Ge, binder.bind(value)),
                (CompareOp::Contains, value) => {
                    let pattern = format!("%{}%", escape_like(&like_text(value)));
                    column.like(binder.bind(&Value::Text(pattern)))
                }
                (CompareOp::StartsWith, value) => {
                    let pattern = format!("{}%", escape_like(&like_text(value)));
                    column.like(binder.bind(&Value::Text(pattern)))
                }
            }
        }
        PredicateNode::And(children) => {
            Expr::all(children.iter().map(|c| predicate_expr(c, binder)))
        }
        PredicateNode::Or(children) => Expr::any(children.iter().map(|c| predicate_expr(c, binder))),
        PredicateNode::Not(inner) => predicate_expr(inner, binder).not(),
    }
}

fn like_text(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

fn order(term: &OrderTerm) -> OrderBy {
    let column = Expr::Column(ColumnRef::new(term.column.clone()));
    match term.order {
        SortOrder::Asc => OrderBy::asc(column),
        SortOrder::Desc => OrderBy::desc(column),
    }
}

/// A [`Value`] bound as a statement parameter, encoded for the type the
/// server expects.
#[derive(Debug)]
struct SqlParam<'a>(&'a Value);

impl ToSql for SqlParam<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(n) => int_to_sql(i64::from(*n), ty, out),
            Value::BigInt(n) => int_to_sql(*n, ty, out),
            Value::Float(f) if ty.name() == "float4" => (*f as f32).to_sql(ty, out),
            Value::Float(f) => f.to_sql(ty, out),
            Value::Decimal(d) => d.to_sql(ty, out),
            Value::Text(s) => s.to_sql(ty, out),
            Value::Bytes(b) => b.to_sql(ty, out),
            Value::Timestamp(t) => t.to_sql(ty, out),
            Value::Json(j) => j.to_sql(ty, out),
            Value::Uuid(u) => u.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn int_to_sql(
    n: i64,
    ty: &Type,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
    match ty.name() {
        "int2" => i16::try_from(n)?.to_sql(ty, out),
        "int4" => i32::try_from(n)?.to_sql(ty, out),
        "float8" => (n as f64).to_sql(ty, out),
        "numeric" => Decimal::from(n).to_sql(ty, out),
        _ => n.to_sql(ty, out),
    }
}

fn decode_row(row: &tokio_postgres::Row) -> Result<Row, StoreError> {
    let mut out = Row::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode(row, idx, column.type_()).map_err(|message| StoreError::Decode {
            column: column.name().to_string(),
            message,
        })?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<Value, String> {
    fn get<'a, T: FromSql<'a>>(
        row: &'a tokio_postgres::Row,
        idx: usize,
        wrap: impl FnOnce(T) -> Value,
    ) -> Result<Value, String> {
        let value: Option<T> = row.try_get(idx).map_err(|e| e.to_string())?;
        Ok(value.map_or(Value::Null, wrap))
    }

    match ty.name() {
        "bool" => get(row, idx, Value::Bool),
        "int2" => get(row, idx, |n: i16| Value::Int(i32::from(n))),
        "int4" => get(row, idx, Value::Int),
        "int8" => get(row, idx, Value::BigInt),
        "float4" => get(row, idx, |f: f32| Value::Float(f64::from(f))),
        "float8" => get(row, idx, Value::Float),
        "numeric" => get(row, idx, Value::Decimal),
        "text" | "varchar" | "bpchar" | "name" => get(row, idx, Value::Text),
        "bytea" => get(row, idx, Value::Bytes),
        "timestamptz" => get(row, idx, Value::Timestamp),
        "json" | "jsonb" => get(row, idx, Value::Json),
        "uuid" => get(row, idx, Value::Uuid),
        other => Err(format!("unsupported column type `{other}`")),
    }
}

mod introspect {
    //! Read the physical schema back from the catalogs.

    use super::*;

    const COLUMNS: &str = r#"
SELECT c.table_name::text,
       c.column_name::text,
       c.data_type::text,
       c.is_nullable = 'YES',
       c.column_default::text,
       c.is_identity = 'YES'
FROM information_schema.columns c
JOIN information_schema.tables t
  ON t.table_schema = c.table_schema AND t.table_name = c.table_name
WHERE c.table_schema::text = $1
  AND t.table_type = 'BASE TABLE'
  AND c.table_name <> '_tabula_migrations'
ORDER BY c.table_name, c.ordinal_position"#;

    const CONSTRAINTS: &str = r#"
SELECT rel.relname::text,
       con.conname::text,
       con.contype::text,
       ARRAY(SELECT a.attname::text
             FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
             ORDER BY k.ord),
       frel.relname::text,
       ARRAY(SELECT a.attname::text
             FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
             ORDER BY k.ord),
       con.confdeltype::text
FROM pg_constraint con
JOIN pg_class rel ON rel.oid = con.conrelid
JOIN pg_namespace ns ON ns.oid = rel.relnamespace
LEFT JOIN pg_class frel ON frel.oid = con.confrelid
WHERE ns.nspname = $1
  AND con.contype IN ('p', 'u', 'f')
  AND rel.relname <> '_tabula_migrations'
ORDER BY rel.relname, con.conname"#;

    const INDEXES: &str = r#"
SELECT t.relname::text,
       i.relname::text,
       ARRAY(SELECT a.attname::text
             FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_attribute a ON a.attrelid = ix.indrelid AND a.attnum = k.attnum
             ORDER BY k.ord)
FROM pg_index ix
JOIN pg_class i ON i.oid = ix.indexrelid
JOIN pg_class t ON t.oid = ix.indrelid
JOIN pg_namespace ns ON ns.oid = t.relnamespace
WHERE ns.nspname = $1
  AND NOT ix.indisprimary
  AND NOT EXISTS (
      SELECT 1 FROM pg_constraint c
      WHERE c.conindid = ix.indexrelid AND c.contype IN ('p', 'u', 'x'))
ORDER BY t.relname, i.relname"#;

    pub(super) async fn schema(
        conn: &TracedObject,
        namespace: &str,
    ) -> Result<PhysicalSchema, StoreError> {
        let mut schema = PhysicalSchema::new();

        for row in conn
            .query(COLUMNS, &[&namespace])
            .await
            .map_err(StoreError::from_postgres)?
        {
            let table_name: String = row.try_get(0).map_err(StoreError::from_postgres)?;
            let column_name: String = row.try_get(1).map_err(StoreError::from_postgres)?;
            let data_type: String = row.try_get(2).map_err(StoreError::from_postgres)?;
            let nullable: bool = row.try_get(3).map_err(StoreError::from_postgres)?;
            let raw_default: Option<String> = row.try_get(4).map_err(StoreError::from_postgres)?;
            let identity: bool = row.try_get(5).map_err(StoreError::from_postgres)?;

            let ty = ScalarType::from_information_schema(&data_type).ok_or_else(|| {
                StoreError::Decode {
                    column: format!("{table_name}.{column_name}"),
                    message: format!("unsupported column type `{data_type}`"),
                }
            })?;
            let default = if identity {
                Some(DefaultValue::Autoincrement)
            } else {
                raw_default.as_deref().and_then(|raw| parse_default(raw, ty))
            };

            table_entry(&mut schema, &table_name).columns.push(Column {
                field: column_name.clone(),
                name: column_name,
                ty,
                nullable,
                default,
                updated_at: false,
            });
        }

        for row in conn
            .query(CONSTRAINTS, &[&namespace])
            .await
            .map_err(StoreError::from_postgres)?
        {
            let table_name: String = row.try_get(0).map_err(StoreError::from_postgres)?;
            let name: String = row.try_get(1).map_err(StoreError::from_postgres)?;
            let kind: String = row.try_get(2).map_err(StoreError::from_postgres)?;
            let columns: Vec<String> = row.try_get(3).map_err(StoreError::from_postgres)?;
            let references_table: Option<String> =
                row.try_get(4).map_err(StoreError::from_postgres)?;
            let references_columns: Vec<String> =
                row.try_get(5).map_err(StoreError::from_postgres)?;
            let on_delete: String = row.try_get(6).map_err(StoreError::from_postgres)?;

            let table = table_entry(&mut schema, &table_name);
            match kind.as_str() {
                "p" => table.primary_key = PrimaryKey { name, columns },
                "u" => table.uniques.push(UniqueConstraint { name, columns }),
                "f" => table.foreign_keys.push(ForeignKey {
                    name,
                    columns,
                    references_table: references_table.unwrap_or_default(),
                    references_columns,
                    on_delete: match on_delete.as_str() {
                        "r" => ReferentialAction::Restrict,
                        "c" => ReferentialAction::Cascade,
                        "n" => ReferentialAction::SetNull,
                        _ => ReferentialAction::NoAction,
                    },
                }),
                _ => {}
            }
        }

        for row in conn
            .query(INDEXES, &[&namespace])
            .await
            .map_err(StoreError::from_postgres)?
        {
            let table_name: String = row.try_get(0).map_err(StoreError::from_postgres)?;
            let name: String = row.try_get(1).map_err(StoreError::from_postgres)?;
            let columns: Vec<String> = row.try_get(2).map_err(StoreError::from_postgres)?;
            if table_name == MIGRATIONS_TABLE {
                continue;
            }
            table_entry(&mut schema, &table_name)
                .indexes
                .push(Index { name, columns });
        }

        Ok(schema)
    }

    fn table_entry<'a>(schema: &'a mut PhysicalSchema, name: &str) -> &'a mut Table {
        schema
            .tables
            .entry(name.to_string())
            .or_insert_with(|| Table {
                model: name.to_string(),
                name: name.to_string(),
                columns: Vec::new(),
                primary_key: PrimaryKey {
                    name: String::new(),
                    columns: Vec::new(),
                },
                uniques: Vec::new(),
                indexes: Vec::new(),
                foreign_keys: Vec::new(),
                relations: Vec::new(),
            })
    }

    /// Parse `information_schema.columns.column_default` back into a default.
    pub(super) fn parse_default(raw: &str, ty: ScalarType) -> Option<DefaultValue> {
        let raw = raw.trim();
        let lower = raw.to_ascii_lowercase();

        if lower.starts_with("nextval(") {
            return Some(DefaultValue::Autoincrement);
        }
        if lower == "now()" || lower == "current_timestamp" || lower.starts_with("now()::") {
            return Some(DefaultValue::Now);
        }
        if lower.contains("gen_random_uuid()") {
            return Some(DefaultValue::GeneratedUuid);
        }
        if lower.starts_with("null") {
            return Some(DefaultValue::Literal(Value::Null));
        }

        let text = match unquote(raw) {
            Some(text) => text,
            None => raw.split("::").next().unwrap_or(raw).trim().to_string(),
        };
        parse_literal(&text, ty).map(DefaultValue::Literal)
    }

    /// The contents of a leading `'...'` literal, with `''` unescaped.
    fn unquote(raw: &str) -> Option<String> {
        let mut chars = raw.strip_prefix('\'')?.chars().peekable();
        let mut text = String::new();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    text.push('\'');
                } else {
                    return Some(text);
                }
            } else {
                text.push(c);
            }
        }
        None
    }

    fn parse_literal(text: &str, ty: ScalarType) -> Option<Value> {
        Some(match ty {
            ScalarType::Text => Value::Text(text.to_string()),
            ScalarType::Int => Value::Int(text.parse().ok()?),
            ScalarType::BigInt => Value::BigInt(text.parse().ok()?),
            ScalarType::Float => Value::Float(text.parse().ok()?),
            ScalarType::Decimal => Value::Decimal(text.parse().ok()?),
            ScalarType::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => return None,
            },
            ScalarType::Timestamp => Value::Timestamp(parse_timestamp(text)?),
            ScalarType::Bytes => Value::Bytes(parse_hex(text.strip_prefix("\\x")?)?),
            ScalarType::Json => Value::Json(serde_json::from_str(text).ok()?),
            ScalarType::Uuid => Value::Uuid(text.parse().ok()?),
        })
    }

    /// Postgres prints `2024-01-02 03:04:05+00`; normalize the offset so
    /// it parses as RFC 3339.
    fn parse_timestamp(text: &str) -> Option<Timestamp> {
        if let Ok(ts) = text.parse() {
            return Some(ts);
        }
        let text = text.replacen(' ', "T", 1);
        let (head, offset) = text.rsplit_once(['+', '-'])?;
        let sign = &text[head.len()..=head.len()];
        let offset = if offset.contains(':') {
            offset.to_string()
        } else {
            format!("{offset}:00")
        };
        format!("{head}{sign}{offset}").parse().ok()
    }

    fn parse_hex(hex: &str) -> Option<Vec<u8>> {
        if hex.len() % 2 != 0 {
            return None;
        }
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
            .collect()
    }
}
