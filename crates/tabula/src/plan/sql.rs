//! Lowering migration steps to Postgres DDL.

use tabula_schema::{Column, DefaultValue, ReferentialAction, ScalarType, Value};
use tabula_sql::{
    AlterAction, AlterTableStmt, ColumnDef, CreateIndexStmt, CreateTableStmt, DropIndexStmt,
    DropTableStmt, Expr, ForeignKeyAction, Stmt, TableConstraint, escape_string,
};

use super::{Constraint, StepKind};

/// The statements that carry out one step, in execution order.
pub fn step_statements(kind: &StepKind) -> Vec<Stmt> {
    match kind {
        StepKind::AddTable { table } => {
            let mut constraints = Vec::new();
            if !table.primary_key.columns.is_empty() {
                constraints.push(TableConstraint::PrimaryKey {
                    name: table.primary_key.name.clone(),
                    columns: table.primary_key.columns.clone(),
                });
            }
            vec![Stmt::CreateTable(CreateTableStmt {
                table: table.name.clone(),
                columns: table.columns.iter().map(column_def).collect(),
                constraints,
            })]
        }
        StepKind::DropTable { table } => vec![Stmt::DropTable(DropTableStmt {
            table: table.clone(),
            if_exists: false,
        })],
        StepKind::AddColumn { table, column } => {
            vec![alter(table, AlterAction::AddColumn(column_def(column)))]
        }
        StepKind::DropColumn { table, column } => {
            vec![alter(table, AlterAction::DropColumn(column.clone()))]
        }
        StepKind::AlterColumn { table, from, to } => alter_column(table, from, to),
        StepKind::AddConstraint { table, constraint } => vec![match constraint {
            Constraint::PrimaryKey(pk) => alter(
                table,
                AlterAction::AddConstraint(TableConstraint::PrimaryKey {
                    name: pk.name.clone(),
                    columns: pk.columns.clone(),
                }),
            ),
            Constraint::Unique(u) => alter(
                table,
                AlterAction::AddConstraint(TableConstraint::Unique {
                    name: u.name.clone(),
                    columns: u.columns.clone(),
                }),
            ),
            Constraint::Index(i) => Stmt::CreateIndex(CreateIndexStmt {
                name: i.name.clone(),
                table: table.clone(),
                columns: i.columns.clone(),
                unique: false,
            }),
            Constraint::ForeignKey(fk) => alter(
                table,
                AlterAction::AddConstraint(TableConstraint::ForeignKey {
                    name: fk.name.clone(),
                    columns: fk.columns.clone(),
                    references_table: fk.references_table.clone(),
                    references_columns: fk.references_columns.clone(),
                    on_delete: fk_action(fk.on_delete),
                }),
            ),
        }],
        StepKind::DropConstraint { table, constraint } => vec![match constraint {
            Constraint::Index(i) => Stmt::DropIndex(DropIndexStmt {
                name: i.name.clone(),
            }),
            other => alter(table, AlterAction::DropConstraint(other.name().to_string())),
        }],
    }
}

fn alter(table: &str, action: AlterAction) -> Stmt {
    Stmt::AlterTable(AlterTableStmt::new(table, action))
}

fn fk_action(action: ReferentialAction) -> ForeignKeyAction {
    match action {
        ReferentialAction::NoAction => ForeignKeyAction::NoAction,
        ReferentialAction::Restrict => ForeignKeyAction::Restrict,
        ReferentialAction::Cascade => ForeignKeyAction::Cascade,
        ReferentialAction::SetNull => ForeignKeyAction::SetNull,
    }
}

fn column_def(column: &Column) -> ColumnDef {
    let mut def = ColumnDef::new(column.name.clone(), column.ty.sql_type());
    if !column.nullable {
        def = def.not_null();
    }
    match &column.default {
        Some(DefaultValue::Autoincrement) => def = def.identity(),
        Some(other) => {
            if let Some(expr) = default_expr(other, column.ty) {
                def = def.default(expr);
            }
        }
        None => {}
    }
    def
}

/// The SQL expression for a column default.
///
/// `None` for `autoincrement()`, which is an identity column rather than a
/// default expression.
pub fn default_expr(default: &DefaultValue, ty: ScalarType) -> Option<Expr> {
    match default {
        DefaultValue::Autoincrement => None,
        DefaultValue::Now => Some(Expr::Now),
        DefaultValue::GeneratedUuid if ty == ScalarType::Text => {
            Some(Expr::Raw("gen_random_uuid()::text".to_string()))
        }
        DefaultValue::GeneratedUuid => Some(Expr::FnCall {
            name: "gen_random_uuid".to_string(),
            args: Vec::new(),
        }),
        DefaultValue::Literal(value) => Some(literal(value)),
    }
}

fn literal(value: &Value) -> Expr {
    let cast = |text: String, ty: &str| Expr::Raw(format!("{}::{ty}", escape_string(&text)));
    match value {
        Value::Null => Expr::Null,
        Value::Bool(b) => Expr::Bool(*b),
        Value::Int(n) => Expr::Int(i64::from(*n)),
        Value::BigInt(n) => Expr::Int(*n),
        Value::Float(f) => Expr::Float(*f),
        Value::Decimal(d) => Expr::Raw(d.to_string()),
        Value::Text(s) => Expr::String(s.clone()),
        Value::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            cast(format!("\\x{hex}"), "bytea")
        }
        Value::Timestamp(t) => cast(t.to_string(), "timestamptz"),
        Value::Json(j) => cast(j.to_string(), "jsonb"),
        Value::Uuid(u) => cast(u.to_string(), "uuid"),
    }
}

/// Statements for a column change: drop the old default or identity, change
/// the type, fix nullability, then install the new default or identity.
fn alter_column(table: &str, from: &Column, to: &Column) -> Vec<Stmt> {
    let column = to.name.clone();
    let mut actions = Vec::new();
    let default_changed = from.default != to.default;

    if default_changed {
        match from.default {
            Some(DefaultValue::Autoincrement) => {
                actions.push(AlterAction::DropIdentity(column.clone()))
            }
            Some(_) => actions.push(AlterAction::DropDefault(column.clone())),
            None => {}
        }
    }

    if from.ty != to.ty {
        actions.push(AlterAction::AlterColumnType {
            column: column.clone(),
            sql_type: to.ty.sql_type().to_string(),
        });
    }

    if from.nullable != to.nullable {
        actions.push(if to.nullable {
            AlterAction::DropNotNull(column.clone())
        } else {
            AlterAction::SetNotNull(column.clone())
        });
    }

    if default_changed {
        match &to.default {
            Some(DefaultValue::Autoincrement) => {
                actions.push(AlterAction::AddIdentity(column.clone()))
            }
            Some(default) => {
                if let Some(expr) = default_expr(default, to.ty) {
                    actions.push(AlterAction::SetDefault {
                        column: column.clone(),
                        default: expr,
                    });
                }
            }
            None => {}
        }
    }

    actions.into_iter().map(|action| alter(table, action)).collect()
}
