//! SQL statements.

use crate::expr::Expr;
use crate::{ColumnName, TableName};

/// A SQL statement.
#[derive(Debug, Clone)]
pub enum Stmt {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    CreateTable(CreateTableStmt),
    DropTable(DropTableStmt),
    AlterTable(AlterTableStmt),
    CreateIndex(CreateIndexStmt),
    DropIndex(DropIndexStmt),
}

/// A SELECT statement.
#[derive(Debug, Clone, Default)]
pub struct SelectStmt {
    pub columns: Vec<SelectColumn>,
    pub from: Option<FromClause>,
    pub where_: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    /// Lock selected rows (`FOR UPDATE`).
    pub for_update: bool,
}

/// A column in a SELECT clause.
#[derive(Debug, Clone)]
pub enum SelectColumn {
    /// A simple column reference
    Expr {
        expr: Expr,
        alias: Option<ColumnName>,
    },
}

impl SelectColumn {
    pub fn expr(expr: Expr) -> Self {
        SelectColumn::Expr { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: ColumnName) -> Self {
        SelectColumn::Expr {
            expr,
            alias: Some(alias),
        }
    }
}

/// A FROM clause.
#[derive(Debug, Clone)]
pub struct FromClause {
    pub table: TableName,
}

impl FromClause {
    pub fn table(name: TableName) -> Self {
        Self { table: name }
    }
}

/// ORDER BY clause.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub expr: Expr,
    pub desc: bool,
}

impl OrderBy {
    pub fn asc(expr: Expr) -> Self {
        Self { expr, desc: false }
    }

    pub fn desc(expr: Expr) -> Self {
        Self { expr, desc: true }
    }
}

// ============================================================================
// INSERT statement
// ============================================================================

/// An INSERT statement, possibly with several rows.
///
/// A statement without columns renders as `DEFAULT VALUES`.
#[derive(Debug, Clone)]
pub struct InsertStmt {
    pub table: TableName,
    pub columns: Vec<ColumnName>,
    pub rows: Vec<Vec<Expr>>,
    pub returning: Returning,
}

/// RETURNING clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Returning {
    /// No RETURNING clause
    #[default]
    Nothing,
    /// RETURNING *
    All,
}

/// An assignment in UPDATE SET.
#[derive(Debug, Clone)]
pub struct UpdateAssignment {
    pub column: ColumnName,
    pub value: Expr,
}

impl UpdateAssignment {
    pub fn new(column: ColumnName, value: Expr) -> Self {
        Self { column, value }
    }
}

// ============================================================================
// UPDATE statement
// ============================================================================

/// An UPDATE statement.
#[derive(Debug, Clone)]
pub struct UpdateStmt {
    pub table: TableName,
    pub assignments: Vec<UpdateAssignment>,
    pub where_: Option<Expr>,
    pub returning: Returning,
}

// ============================================================================
// DELETE statement
// ============================================================================

/// A DELETE statement.
#[derive(Debug, Clone)]
pub struct DeleteStmt {
    pub table: TableName,
    pub where_: Option<Expr>,
    pub returning: Returning,
}

// ============================================================================
// DDL statements
// ============================================================================

/// A column definition inside CREATE TABLE or ALTER TABLE ADD COLUMN.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: ColumnName,
    /// Rendered type, e.g. `BIGINT` or `TIMESTAMPTZ`.
    pub sql_type: String,
    pub not_null: bool,
    /// `GENERATED BY DEFAULT AS IDENTITY`
    pub identity: bool,
    pub default: Option<Expr>,
}

impl ColumnDef {
    pub fn new(name: impl Into<ColumnName>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            identity: false,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn default(mut self, expr: Expr) -> Self {
        self.default = Some(expr);
        self
    }
}

/// A named table constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraint {
    PrimaryKey {
        name: String,
        columns: Vec<ColumnName>,
    },
    Unique {
        name: String,
        columns: Vec<ColumnName>,
    },
    ForeignKey {
        name: String,
        columns: Vec<ColumnName>,
        references_table: TableName,
        references_columns: Vec<ColumnName>,
        on_delete: ForeignKeyAction,
    },
}

/// ON DELETE behavior of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
}

impl ForeignKeyAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Restrict => "RESTRICT",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
        }
    }
}

/// CREATE TABLE
///
/// Foreign keys are not part of this statement; they are added separately
/// so table creation order doesn't matter.
#[derive(Debug, Clone)]
pub struct CreateTableStmt {
    pub table: TableName,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<TableConstraint>,
}

/// DROP TABLE
#[derive(Debug, Clone)]
pub struct DropTableStmt {
    pub table: TableName,
    pub if_exists: bool,
}

/// ALTER TABLE with a single action.
#[derive(Debug, Clone)]
pub struct AlterTableStmt {
    pub table: TableName,
    pub action: AlterAction,
}

/// One ALTER TABLE action.
#[derive(Debug, Clone)]
pub enum AlterAction {
    AddColumn(ColumnDef),
    DropColumn(ColumnName),
    AlterColumnType {
        column: ColumnName,
        sql_type: String,
    },
    SetNotNull(ColumnName),
    DropNotNull(ColumnName),
    SetDefault {
        column: ColumnName,
        default: Expr,
    },
    DropDefault(ColumnName),
    AddIdentity(ColumnName),
    DropIdentity(ColumnName),
    AddConstraint(TableConstraint),
    DropConstraint(String),
}

/// CREATE [UNIQUE] INDEX
#[derive(Debug, Clone)]
pub struct CreateIndexStmt {
    pub name: String,
    pub table: TableName,
    pub columns: Vec<ColumnName>,
    pub unique: bool,
}

/// DROP INDEX
#[derive(Debug, Clone)]
pub struct DropIndexStmt {
    pub name: String,
}

// ============================================================================
// Builder-style constructors
// ============================================================================

impl SelectStmt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, col: SelectColumn) -> Self {
        self.columns.push(col);
        self
    }

    pub fn columns(mut self, cols: impl IntoIterator<Item = SelectColumn>) -> Self {
        self.columns.extend(cols);
        self
    }

    pub fn from(mut self, from: FromClause) -> Self {
        self.from = Some(from);
        self
    }

    pub fn where_(mut self, expr: Expr) -> Self {
        self.where_ = Some(expr);
        self
    }

    pub fn and_where(mut self, expr: Expr) -> Self {
        self.where_ = Some(match self.where_ {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, expr: Expr) -> Self {
        self.limit = Some(expr);
        self
    }

    pub fn offset(mut self, expr: Expr) -> Self {
        self.offset = Some(expr);
        self
    }

    pub fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }
}

impl InsertStmt {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            columns: Vec::new(),
            rows: Vec::new(),
            returning: Returning::Nothing,
        }
    }

    pub fn columns(mut self, cols: impl IntoIterator<Item = ColumnName>) -> Self {
        self.columns.extend(cols);
        self
    }

    pub fn row(mut self, values: Vec<Expr>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn returning(mut self, returning: Returning) -> Self {
        self.returning = returning;
        self
    }
}

impl UpdateStmt {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            assignments: Vec::new(),
            where_: None,
            returning: Returning::Nothing,
        }
    }

    pub fn set(mut self, column: ColumnName, value: Expr) -> Self {
        self.assignments.push(UpdateAssignment::new(column, value));
        self
    }

    pub fn where_(mut self, expr: Expr) -> Self {
        self.where_ = Some(expr);
        self
    }

    pub fn returning(mut self, returning: Returning) -> Self {
        self.returning = returning;
        self
    }
}

impl DeleteStmt {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_: None,
            returning: Returning::Nothing,
        }
    }

    pub fn where_(mut self, expr: Expr) -> Self {
        self.where_ = Some(expr);
        self
    }

    pub fn returning(mut self, returning: Returning) -> Self {
        self.returning = returning;
        self
    }
}

impl AlterTableStmt {
    pub fn new(table: impl Into<TableName>, action: AlterAction) -> Self {
        Self {
            table: table.into(),
            action,
        }
    }
}
