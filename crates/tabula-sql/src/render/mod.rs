//! Render SQL AST to string.

use std::cell::RefCell;
use std::fmt;

use indexmap::IndexMap;

use crate::expr::{ColumnRef, Expr};
use crate::stmt::*;
use crate::{Ident, ParamName, RenderedSql, escape_string};

/// Mutable parameter tracking state.
struct ParamState {
    /// Named parameters mapped to their assigned positional index.
    params: IndexMap<ParamName, usize>,
    /// Next parameter index to assign (starts at 1 for `$1`).
    next_param_idx: usize,
}

impl ParamState {
    fn new() -> Self {
        Self {
            params: IndexMap::new(),
            next_param_idx: 1,
        }
    }

    /// Get or create a parameter index.
    fn get_or_insert(&mut self, name: &ParamName) -> usize {
        *self.params.entry(name.clone()).or_insert_with(|| {
            let idx = self.next_param_idx;
            self.next_param_idx += 1;
            idx
        })
    }
}

/// Rendering context that tracks parameter assignment.
///
/// Uses interior mutability (`RefCell`) so that `Render::render` can take `&self`,
/// enabling the `Fmt` wrapper to implement `Display`.
pub struct RenderContext {
    params: RefCell<ParamState>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self {
            params: RefCell::new(ParamState::new()),
        }
    }

    fn param_idx(&self, name: &ParamName) -> usize {
        self.params.borrow_mut().get_or_insert(name)
    }

    fn into_params(self) -> Vec<ParamName> {
        self.params.into_inner().params.into_keys().collect()
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrapper for rendering a `Render` type via `Display`.
///
/// Allows using `write!(f, "{}", Fmt(ctx, &expr))` in format strings.
pub struct Fmt<'a, T: Render>(&'a RenderContext, &'a T);

impl<T: Render> fmt::Display for Fmt<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.1.render(self.0, f)
    }
}

/// Comma-separated list of quoted identifiers.
struct IdentList<'a>(&'a [String]);

impl fmt::Display for IdentList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, name) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", Ident(name.as_str()))?;
        }
        Ok(())
    }
}

// ============================================================================
// Render implementations
// ============================================================================

/// Trait for types that can be rendered to SQL.
pub trait Render {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl Render for Expr {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Param(name) => {
                let idx = ctx.param_idx(name);
                write!(f, "${idx}")
            }
            Expr::Column(col) => col.render(ctx, f),
            Expr::String(s) => {
                let escaped = escape_string(s);
                write!(f, "{escaped}")
            }
            Expr::Int(n) => write!(f, "{n}"),
            Expr::Float(n) => write!(f, "{n:?}"),
            Expr::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Expr::Null => write!(f, "NULL"),
            Expr::Now => write!(f, "NOW()"),
            Expr::BinOp { left, op, right } => {
                let left = Fmt(ctx, left.as_ref());
                let right = Fmt(ctx, right.as_ref());
                let op = op.as_str();
                write!(f, "{left} {op} {right}")
            }
            Expr::Not(expr) => {
                let expr = Fmt(ctx, expr.as_ref());
                write!(f, "NOT {expr}")
            }
            Expr::Nested(expr) => {
                let expr = Fmt(ctx, expr.as_ref());
                write!(f, "({expr})")
            }
            Expr::IsNull { expr, negated } => {
                let expr = Fmt(ctx, expr.as_ref());
                let suffix = if *negated { " IS NOT NULL" } else { " IS NULL" };
                write!(f, "{expr}{suffix}")
            }
            Expr::Like { expr, pattern } => {
                let expr = Fmt(ctx, expr.as_ref());
                let pattern = Fmt(ctx, pattern.as_ref());
                write!(f, "{expr} LIKE {pattern} ESCAPE '\\'")
            }
            Expr::FnCall { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", Fmt(ctx, arg))?;
                }
                write!(f, ")")
            }
            Expr::Raw(s) => write!(f, "{s}"),
        }
    }
}

impl Render for ColumnRef {
    fn render(&self, _ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column = Ident(self.column.as_str());
        write!(f, "{column}")
    }
}

impl Render for SelectStmt {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT")?;

        // Columns
        if self.columns.is_empty() {
            write!(f, " *")?;
        } else {
            for (i, col) in self.columns.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, " {}", Fmt(ctx, col))?;
            }
        }

        // FROM
        if let Some(from) = &self.from {
            let table = Ident(from.table.as_str());
            write!(f, "\nFROM {table}")?;
        }

        // WHERE
        if let Some(where_) = &self.where_ {
            let where_ = Fmt(ctx, where_);
            write!(f, "\nWHERE {where_}")?;
        }

        // ORDER BY
        if !self.order_by.is_empty() {
            write!(f, "\nORDER BY ")?;
            for (i, order) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                let expr = Fmt(ctx, &order.expr);
                let dir = if order.desc { " DESC" } else { " ASC" };
                write!(f, "{expr}{dir}")?;
            }
        }

        // LIMIT
        if let Some(limit) = &self.limit {
            let limit = Fmt(ctx, limit);
            write!(f, "\nLIMIT {limit}")?;
        }

        // OFFSET
        if let Some(offset) = &self.offset {
            let offset = Fmt(ctx, offset);
            write!(f, "\nOFFSET {offset}")?;
        }

        if self.for_update {
            write!(f, "\nFOR UPDATE")?;
        }

        Ok(())
    }
}

impl Render for SelectColumn {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectColumn::Expr { expr, alias } => {
                let expr = Fmt(ctx, expr);
                write!(f, "{expr}")?;
                if let Some(alias) = alias {
                    let alias = Ident(alias.as_str());
                    write!(f, " AS {alias}")?;
                }
                Ok(())
            }
        }
    }
}

impl Render for Returning {
    fn render(&self, _ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Returning::Nothing => Ok(()),
            Returning::All => write!(f, "\nRETURNING *"),
        }
    }
}

impl Render for InsertStmt {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = Ident(self.table.as_str());
        write!(f, "INSERT INTO {table}")?;

        if self.columns.is_empty() {
            write!(f, "\nDEFAULT VALUES")?;
        } else {
            write!(f, " ({})", IdentList(&self.columns))?;

            write!(f, "\nVALUES ")?;
            for (r, row) in self.rows.iter().enumerate() {
                if r > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "(")?;
                for (i, val) in row.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", Fmt(ctx, val))?;
                }
                write!(f, ")")?;
            }
        }

        self.returning.render(ctx, f)
    }
}

impl Render for UpdateStmt {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = Ident(self.table.as_str());
        write!(f, "UPDATE {table}")?;

        // SET
        write!(f, "\nSET ")?;
        for (i, assign) in self.assignments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let col = Ident(assign.column.as_str());
            let val = Fmt(ctx, &assign.value);
            write!(f, "{col} = {val}")?;
        }

        // WHERE
        if let Some(where_) = &self.where_ {
            let where_ = Fmt(ctx, where_);
            write!(f, "\nWHERE {where_}")?;
        }

        self.returning.render(ctx, f)
    }
}

impl Render for DeleteStmt {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = Ident(self.table.as_str());
        write!(f, "DELETE FROM {table}")?;

        // WHERE
        if let Some(where_) = &self.where_ {
            let where_ = Fmt(ctx, where_);
            write!(f, "\nWHERE {where_}")?;
        }

        self.returning.render(ctx, f)
    }
}

// ============================================================================
// DDL
// ============================================================================

impl Render for ColumnDef {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = Ident(self.name.as_str());
        write!(f, "{name} {}", self.sql_type)?;
        if self.identity {
            write!(f, " GENERATED BY DEFAULT AS IDENTITY")?;
        }
        if self.not_null {
            write!(f, " NOT NULL")?;
        }
        if let Some(default) = &self.default {
            write!(f, " DEFAULT {}", Fmt(ctx, default))?;
        }
        Ok(())
    }
}

impl Render for TableConstraint {
    fn render(&self, _ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableConstraint::PrimaryKey { name, columns } => {
                let name = Ident(name.as_str());
                write!(f, "CONSTRAINT {name} PRIMARY KEY ({})", IdentList(columns))
            }
            TableConstraint::Unique { name, columns } => {
                let name = Ident(name.as_str());
                write!(f, "CONSTRAINT {name} UNIQUE ({})", IdentList(columns))
            }
            TableConstraint::ForeignKey {
                name,
                columns,
                references_table,
                references_columns,
                on_delete,
            } => {
                let name = Ident(name.as_str());
                let target = Ident(references_table.as_str());
                write!(
                    f,
                    "CONSTRAINT {name} FOREIGN KEY ({}) REFERENCES {target} ({})",
                    IdentList(columns),
                    IdentList(references_columns)
                )?;
                if *on_delete != ForeignKeyAction::NoAction {
                    write!(f, " ON DELETE {}", on_delete.as_str())?;
                }
                Ok(())
            }
        }
    }
}

impl Render for CreateTableStmt {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = Ident(self.table.as_str());
        write!(f, "CREATE TABLE {table} (")?;
        let mut first = true;
        for col in &self.columns {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            write!(f, "\n    {}", Fmt(ctx, col))?;
        }
        for constraint in &self.constraints {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            write!(f, "\n    {}", Fmt(ctx, constraint))?;
        }
        write!(f, "\n)")
    }
}

impl Render for DropTableStmt {
    fn render(&self, _ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = Ident(self.table.as_str());
        if self.if_exists {
            write!(f, "DROP TABLE IF EXISTS {table}")
        } else {
            write!(f, "DROP TABLE {table}")
        }
    }
}

impl Render for AlterTableStmt {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = Ident(self.table.as_str());
        write!(f, "ALTER TABLE {table} ")?;
        match &self.action {
            AlterAction::AddColumn(col) => write!(f, "ADD COLUMN {}", Fmt(ctx, col)),
            AlterAction::DropColumn(col) => write!(f, "DROP COLUMN {}", Ident(col.as_str())),
            AlterAction::AlterColumnType { column, sql_type } => {
                let column = Ident(column.as_str());
                write!(
                    f,
                    "ALTER COLUMN {column} TYPE {sql_type} USING {column}::{sql_type}"
                )
            }
            AlterAction::SetNotNull(col) => {
                write!(f, "ALTER COLUMN {} SET NOT NULL", Ident(col.as_str()))
            }
            AlterAction::DropNotNull(col) => {
                write!(f, "ALTER COLUMN {} DROP NOT NULL", Ident(col.as_str()))
            }
            AlterAction::SetDefault { column, default } => {
                let column = Ident(column.as_str());
                write!(f, "ALTER COLUMN {column} SET DEFAULT {}", Fmt(ctx, default))
            }
            AlterAction::DropDefault(col) => {
                write!(f, "ALTER COLUMN {} DROP DEFAULT", Ident(col.as_str()))
            }
            AlterAction::AddIdentity(col) => write!(
                f,
                "ALTER COLUMN {} ADD GENERATED BY DEFAULT AS IDENTITY",
                Ident(col.as_str())
            ),
            AlterAction::DropIdentity(col) => write!(
                f,
                "ALTER COLUMN {} DROP IDENTITY IF EXISTS",
                Ident(col.as_str())
            ),
            AlterAction::AddConstraint(constraint) => {
                write!(f, "ADD {}", Fmt(ctx, constraint))
            }
            AlterAction::DropConstraint(name) => {
                write!(f, "DROP CONSTRAINT {}", Ident(name.as_str()))
            }
        }
    }
}

impl Render for CreateIndexStmt {
    fn render(&self, _ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unique = if self.unique { "UNIQUE " } else { "" };
        let name = Ident(self.name.as_str());
        let table = Ident(self.table.as_str());
        write!(
            f,
            "CREATE {unique}INDEX {name} ON {table} ({})",
            IdentList(&self.columns)
        )
    }
}

impl Render for DropIndexStmt {
    fn render(&self, _ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DROP INDEX {}", Ident(self.name.as_str()))
    }
}

impl Render for Stmt {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Select(s) => s.render(ctx, f),
            Stmt::Insert(s) => s.render(ctx, f),
            Stmt::Update(s) => s.render(ctx, f),
            Stmt::Delete(s) => s.render(ctx, f),
            Stmt::CreateTable(s) => s.render(ctx, f),
            Stmt::DropTable(s) => s.render(ctx, f),
            Stmt::AlterTable(s) => s.render(ctx, f),
            Stmt::CreateIndex(s) => s.render(ctx, f),
            Stmt::DropIndex(s) => s.render(ctx, f),
        }
    }
}

// ============================================================================
// Convenience methods
// ============================================================================

/// Render a statement to SQL.
pub fn render(stmt: &impl Render) -> RenderedSql {
    let ctx = RenderContext::new();
    let sql = format!("{}", Fmt(&ctx, stmt));
    RenderedSql {
        sql,
        params: ctx.into_params(),
    }
}

#[cfg(test)]
mod tests;
